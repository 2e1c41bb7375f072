//! Admin review of partner companies.
//!
//! A status change is the primary mutation and is the only step that can fail the
//! call. Welcome credits, the notification e-mail and the audit entry are secondary:
//! their failures are logged and reported back as advisory fields.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use super::audit::{AuditLogger, AuditRecord};
use super::auth::IdentityProvider;
use super::domain::{Company, CompanyId, CompanyStatus, Credits, UserId};
use super::ledger::{CreditLedger, LedgerEntryRequest, LedgerError, LedgerReason, LedgerReference};
use super::notify::{sign_in_link, Notification, NotificationKind, Notifier};
use super::repository::{CompanyRepository, RepositoryError};

/// What happened to the one-time welcome grant during an approval.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WelcomeCreditOutcome {
    NotApplicable,
    Granted { credits: Credits, balance_after: Credits },
    AlreadyGranted,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    pub company: Company,
    pub previous: CompanyStatus,
    pub welcome_credits: WelcomeCreditOutcome,
    pub email_sent: bool,
    pub email_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("company not found")]
    NotFound,
    #[error("cannot move a company from {from} to {to}")]
    InvalidTransition {
        from: CompanyStatus,
        to: CompanyStatus,
    },
    #[error(transparent)]
    Storage(RepositoryError),
}

impl From<RepositoryError> for LifecycleError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => LifecycleError::NotFound,
            other => LifecycleError::Storage(other),
        }
    }
}

pub struct CompanyLifecycle {
    companies: Arc<dyn CompanyRepository>,
    ledger: Arc<CreditLedger>,
    audit: AuditLogger,
    identity: Arc<dyn IdentityProvider>,
    notifier: Arc<dyn Notifier>,
    welcome_credits: Credits,
    base_url: String,
}

impl CompanyLifecycle {
    pub fn new(
        companies: Arc<dyn CompanyRepository>,
        ledger: Arc<CreditLedger>,
        audit: AuditLogger,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn Notifier>,
        welcome_credits: Credits,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            companies,
            ledger,
            audit,
            identity,
            notifier,
            welcome_credits,
            base_url: base_url.into(),
        }
    }

    pub fn set_status(
        &self,
        actor: &UserId,
        company_id: &CompanyId,
        next: CompanyStatus,
        now: DateTime<Utc>,
    ) -> Result<StatusChange, LifecycleError> {
        let mut company = self
            .companies
            .fetch(company_id)?
            .ok_or(LifecycleError::NotFound)?;
        let previous = company.status;
        if !previous.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                from: previous,
                to: next,
            });
        }

        company.status = next;
        self.companies.update(company.clone())?;
        info!(company = %company.id, from = %previous, to = %next, "company status changed");

        self.audit.record(
            AuditRecord::new(actor, "company.status_changed", "company", company.id.as_str())
                .before(json!({ "status": previous }))
                .after(json!({ "status": next })),
            now,
        );

        let welcome_credits = if next == CompanyStatus::Approved {
            self.grant_welcome_credits(&company.id, now)
        } else {
            WelcomeCreditOutcome::NotApplicable
        };

        let notice = match next {
            CompanyStatus::Approved => Some(self.approval_notice(&company)),
            CompanyStatus::Rejected => Some(Ok(
                self.notification(&company, NotificationKind::CompanyRejected)
            )),
            _ => None,
        };
        let (email_sent, email_error) = match notice.map(|notice| self.deliver(notice)) {
            None => (false, None),
            Some(Ok(())) => (true, None),
            Some(Err(error)) => {
                warn!(company = %company.id, %error, "status notification not sent");
                (false, Some(error))
            }
        };

        Ok(StatusChange {
            company,
            previous,
            welcome_credits,
            email_sent,
            email_error,
        })
    }

    fn notification(&self, company: &Company, kind: NotificationKind) -> Notification {
        Notification {
            company_id: company.id.clone(),
            to: company.contact_email.clone(),
            company_name: company.name.clone(),
            kind,
        }
    }

    fn deliver(&self, notice: Result<Notification, String>) -> Result<(), String> {
        self.notifier.send(notice?).map_err(|err| err.to_string())
    }

    fn approval_notice(&self, company: &Company) -> Result<Notification, String> {
        let token = self
            .identity
            .issue_sign_in(&company.id)
            .map_err(|err| err.to_string())?;
        Ok(self.notification(
            company,
            NotificationKind::CompanyApproved {
                sign_in_link: sign_in_link(&self.base_url, &token),
            },
        ))
    }

    /// Grants the welcome credits at most once per company, keyed by company id.
    fn grant_welcome_credits(
        &self,
        company: &CompanyId,
        now: DateTime<Utc>,
    ) -> WelcomeCreditOutcome {
        if self.welcome_credits <= 0 {
            return WelcomeCreditOutcome::NotApplicable;
        }
        let reference = LedgerReference::welcome_credits(company);
        match self
            .ledger
            .find_reference(company, LedgerReason::Adjustment, &reference)
        {
            Ok(Some(_)) => return WelcomeCreditOutcome::AlreadyGranted,
            Ok(None) => {}
            Err(err) => {
                warn!(company = %company, error = %err, "welcome credit lookup failed");
                return WelcomeCreditOutcome::Failed {
                    error: err.to_string(),
                };
            }
        }

        let request =
            LedgerEntryRequest::new(company.clone(), self.welcome_credits, LedgerReason::Adjustment)
                .with_reference(reference)
                .with_description("Welcome credits");
        match self.ledger.apply_entry(request, now) {
            Ok(row) => {
                info!(company = %company, credits = row.delta, "welcome credits granted");
                WelcomeCreditOutcome::Granted {
                    credits: row.delta,
                    balance_after: row.balance_after,
                }
            }
            Err(LedgerError::DuplicateReference) => WelcomeCreditOutcome::AlreadyGranted,
            Err(err) => {
                warn!(company = %company, error = %err, "welcome credits not granted");
                WelcomeCreditOutcome::Failed {
                    error: err.to_string(),
                }
            }
        }
    }
}
