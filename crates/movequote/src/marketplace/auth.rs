use axum::http::{header, HeaderMap};
use serde::{Deserialize, Serialize};

use super::domain::{CompanyId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Role {
    Admin,
    Partner { company_id: CompanyId },
}

/// Authenticated caller as reported by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user_id: UserId,
    pub role: Role,
}

impl Session {
    pub fn is_admin(&self) -> bool {
        matches!(self.role, Role::Admin)
    }
}

/// Hosted identity provider.
pub trait IdentityProvider: Send + Sync {
    fn resolve(&self, token: &str) -> Result<Option<Session>, AuthError>;
    /// Issues a one-time sign-in token for the company's portal user.
    fn issue_sign_in(&self, company: &CompanyId) -> Result<String, AuthError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthError {
    #[error("authentication required")]
    MissingCredentials,
    #[error("session is invalid or expired")]
    InvalidSession,
    #[error("admin access required")]
    AdminRequired,
    #[error("partner access required")]
    PartnerRequired,
    #[error("company account is not active")]
    CompanyNotApproved,
    #[error("identity provider unavailable: {0}")]
    Provider(String),
}

pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub fn authenticate(
    identity: &dyn IdentityProvider,
    headers: &HeaderMap,
) -> Result<Session, AuthError> {
    let token = bearer_token(headers).ok_or(AuthError::MissingCredentials)?;
    identity.resolve(token)?.ok_or(AuthError::InvalidSession)
}

pub fn require_admin(session: &Session) -> Result<UserId, AuthError> {
    if session.is_admin() {
        Ok(session.user_id.clone())
    } else {
        Err(AuthError::AdminRequired)
    }
}

pub fn require_partner(session: &Session) -> Result<CompanyId, AuthError> {
    match &session.role {
        Role::Partner { company_id } => Ok(company_id.clone()),
        Role::Admin => Err(AuthError::PartnerRequired),
    }
}
