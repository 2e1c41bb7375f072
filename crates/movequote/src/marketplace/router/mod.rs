//! HTTP surface of the marketplace.
//!
//! Every response is an envelope: `{"success": true, ...}` on success and
//! `{"success": false, "error": "..."}` otherwise. Storage and provider failures are
//! logged and answered with a generic message.

mod admin;
mod portal;
mod public;

use std::fmt;
use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::error;

use super::auth::AuthError;
use super::billing::BillingError;
use super::cms::CmsError;
use super::leads::IntakeError;
use super::ledger::LedgerError;
use super::lifecycle::LifecycleError;
use super::partners::RegistrationError;
use super::portal::PortalError;
use super::pricing::PricingError;
use super::repository::RepositoryError;
use super::reveal::RevealError;
use super::validation::ValidationErrors;
use super::Marketplace;

const GENERIC_FAILURE: &str = "something went wrong, please try again";

/// Router builder exposing the public site, partner portal and admin endpoints.
pub fn marketplace_router(marketplace: Arc<Marketplace>) -> Router {
    Router::new()
        .merge(public::routes())
        .merge(portal::routes())
        .merge(admin::routes())
        .with_state(marketplace)
}

/// Failure half of the response envelope.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
    fields: Option<ValidationErrors>,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            fields: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    fn invalid(errors: ValidationErrors) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: errors.to_string(),
            fields: Some(errors),
        }
    }

    fn internal(err: &dyn fmt::Display) -> Self {
        error!(error = %err, "marketplace request failed");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE)
    }

    fn from_ledger(err: LedgerError) -> Self {
        match err {
            LedgerError::Contended => Self::new(StatusCode::CONFLICT, err.to_string()),
            LedgerError::InsufficientBalance { .. } => {
                Self::new(StatusCode::PAYMENT_REQUIRED, err.to_string())
            }
            LedgerError::DeltaOutOfRange { .. } | LedgerError::BalanceOutOfRange => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string())
            }
            other => Self::internal(&other),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "success": false,
            "error": self.message,
        });
        if let Some(fields) = self.fields {
            body["fields"] = json!(fields);
        }
        (self.status, Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, value.body_text())
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::MissingCredentials | AuthError::InvalidSession => {
                Self::new(StatusCode::UNAUTHORIZED, value.to_string())
            }
            AuthError::AdminRequired | AuthError::PartnerRequired | AuthError::CompanyNotApproved => {
                Self::new(StatusCode::FORBIDDEN, value.to_string())
            }
            AuthError::Provider(_) => Self::internal(&value),
        }
    }
}

impl From<RepositoryError> for ApiError {
    fn from(value: RepositoryError) -> Self {
        Self::internal(&value)
    }
}

impl From<LedgerError> for ApiError {
    fn from(value: LedgerError) -> Self {
        Self::from_ledger(value)
    }
}

impl From<IntakeError> for ApiError {
    fn from(value: IntakeError) -> Self {
        match value {
            IntakeError::Invalid(errors) => Self::invalid(errors),
            IntakeError::Storage(err) => Self::internal(&err),
        }
    }
}

impl From<RegistrationError> for ApiError {
    fn from(value: RegistrationError) -> Self {
        match value {
            RegistrationError::Invalid(errors) => Self::invalid(errors),
            RegistrationError::DuplicateEmail => Self::new(StatusCode::CONFLICT, value.to_string()),
            RegistrationError::NotFound => Self::new(StatusCode::NOT_FOUND, value.to_string()),
            RegistrationError::Storage(err) => Self::internal(&err),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(value: LifecycleError) -> Self {
        match value {
            LifecycleError::NotFound => Self::new(StatusCode::NOT_FOUND, value.to_string()),
            LifecycleError::InvalidTransition { .. } => {
                Self::new(StatusCode::CONFLICT, value.to_string())
            }
            LifecycleError::Storage(err) => Self::internal(&err),
        }
    }
}

impl From<RevealError> for ApiError {
    fn from(value: RevealError) -> Self {
        match value {
            RevealError::AssignmentNotFound | RevealError::LeadNotFound => {
                Self::new(StatusCode::NOT_FOUND, value.to_string())
            }
            RevealError::NotAssignedToCompany => Self::new(StatusCode::FORBIDDEN, value.to_string()),
            RevealError::AlreadyRevealed | RevealError::AlreadyRefunded | RevealError::NotRevealed => {
                Self::new(StatusCode::CONFLICT, value.to_string())
            }
            RevealError::InsufficientBalance { .. } => {
                Self::new(StatusCode::PAYMENT_REQUIRED, value.to_string())
            }
            RevealError::Ledger(err) => Self::from_ledger(err),
            RevealError::Pricing(err) => Self::internal(&err),
            RevealError::Storage(err) => Self::internal(&err),
        }
    }
}

impl From<PortalError> for ApiError {
    fn from(value: PortalError) -> Self {
        match value {
            PortalError::AssignmentNotFound => Self::new(StatusCode::NOT_FOUND, value.to_string()),
            PortalError::NotAssignedToCompany => Self::new(StatusCode::FORBIDDEN, value.to_string()),
            PortalError::NotRevealed => Self::new(StatusCode::CONFLICT, value.to_string()),
            PortalError::InvalidStatus(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, value.to_string())
            }
            PortalError::Storage(err) => Self::internal(&err),
        }
    }
}

impl From<PricingError> for ApiError {
    fn from(value: PricingError) -> Self {
        match value {
            PricingError::InvalidRule(_) => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, value.to_string())
            }
            PricingError::NotFound => Self::new(StatusCode::NOT_FOUND, value.to_string()),
            PricingError::Storage(err) => Self::internal(&err),
        }
    }
}

impl From<CmsError> for ApiError {
    fn from(value: CmsError) -> Self {
        match value {
            CmsError::InvalidSlug | CmsError::MissingTitle | CmsError::BlogFieldsOnNonBlog => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, value.to_string())
            }
            CmsError::DuplicateSlug => Self::new(StatusCode::CONFLICT, value.to_string()),
            CmsError::NotFound => Self::new(StatusCode::NOT_FOUND, value.to_string()),
            CmsError::Storage(err) => Self::internal(&err),
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(value: BillingError) -> Self {
        match value {
            BillingError::PackNotFound | BillingError::CompanyNotFound => {
                Self::new(StatusCode::NOT_FOUND, value.to_string())
            }
            BillingError::PackInactive => Self::new(StatusCode::CONFLICT, value.to_string()),
            BillingError::ZeroAdjustment => {
                Self::new(StatusCode::UNPROCESSABLE_ENTITY, value.to_string())
            }
            BillingError::InsufficientBalance { .. } => {
                Self::new(StatusCode::PAYMENT_REQUIRED, value.to_string())
            }
            BillingError::Payment(err) => {
                error!(error = %err, "checkout provider failed");
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    "payment provider unavailable, please try again",
                )
            }
            BillingError::Ledger(err) => Self::from_ledger(err),
            BillingError::Storage(err) => Self::internal(&err),
        }
    }
}

/// Success half of the envelope; `body` fields are merged next to `success`.
pub(crate) fn success(status: StatusCode, body: Value) -> Response {
    let mut payload = json!({ "success": true });
    if let (Value::Object(target), Value::Object(extra)) = (&mut payload, body) {
        target.extend(extra);
    }
    (status, Json(payload)).into_response()
}

/// Unwraps a JSON body, answering malformed payloads inside the envelope.
pub(crate) fn payload<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value).map_err(ApiError::from)
}
