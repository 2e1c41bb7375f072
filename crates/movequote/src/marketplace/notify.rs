use serde::{Deserialize, Serialize};

use super::domain::CompanyId;

/// Outbound partner notices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "template", rename_all = "snake_case")]
pub enum NotificationKind {
    CompanyApproved { sign_in_link: String },
    CompanyRejected,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub company_id: CompanyId,
    pub to: String,
    pub company_name: String,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn subject(&self) -> String {
        match &self.kind {
            NotificationKind::CompanyApproved { .. } => {
                format!("{} is approved on MoveQuote", self.company_name)
            }
            NotificationKind::CompanyRejected => {
                format!("Update on the {} application", self.company_name)
            }
        }
    }
}

/// Transactional e-mail boundary.
pub trait Notifier: Send + Sync {
    fn send(&self, notification: Notification) -> Result<(), NotifyError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NotifyError {
    #[error("notification transport unavailable: {0}")]
    Transport(String),
}

pub fn sign_in_link(base_url: &str, token: &str) -> String {
    format!("{}/auth/magic/{}", base_url.trim_end_matches('/'), token)
}
