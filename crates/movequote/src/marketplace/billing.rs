//! Credit pack checkout, purchase crediting, and admin adjustments.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::audit::{AuditLogger, AuditRecord};
use super::domain::{CompanyId, CreditPack, CreditPackId, Credits, UserId};
use super::ledger::{
    CreditLedger, LedgerEntryRequest, LedgerError, LedgerReason, LedgerReference, LedgerRow,
};
use super::repository::{CompanyRepository, CreditPackCatalog, RepositoryError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutSession {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub company_id: CompanyId,
    pub pack: CreditPack,
    pub success_url: String,
    pub cancel_url: String,
}

/// Hosted checkout provider.
pub trait PaymentGateway: Send + Sync {
    fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, PaymentError>;
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("payment provider error: {0}")]
    Provider(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PurchaseOutcome {
    Credited { row: LedgerRow },
    /// The session was already credited; nothing new was written.
    AlreadyApplied,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BillingError {
    #[error("credit pack not found")]
    PackNotFound,
    #[error("credit pack is not on sale")]
    PackInactive,
    #[error("company not found")]
    CompanyNotFound,
    #[error("adjustment must change the balance")]
    ZeroAdjustment,
    #[error("adjustment would leave {balance} credits short of {requested}")]
    InsufficientBalance { balance: Credits, requested: Credits },
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Ledger(LedgerError),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

impl From<LedgerError> for BillingError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::ZeroDelta => BillingError::ZeroAdjustment,
            LedgerError::InsufficientBalance { balance, requested } => {
                BillingError::InsufficientBalance { balance, requested }
            }
            other => BillingError::Ledger(other),
        }
    }
}

pub struct BillingService {
    packs: Arc<dyn CreditPackCatalog>,
    companies: Arc<dyn CompanyRepository>,
    ledger: Arc<CreditLedger>,
    gateway: Arc<dyn PaymentGateway>,
    audit: AuditLogger,
    base_url: String,
}

impl BillingService {
    pub fn new(
        packs: Arc<dyn CreditPackCatalog>,
        companies: Arc<dyn CompanyRepository>,
        ledger: Arc<CreditLedger>,
        gateway: Arc<dyn PaymentGateway>,
        audit: AuditLogger,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            packs,
            companies,
            ledger,
            gateway,
            audit,
            base_url: base_url.into(),
        }
    }

    /// Packs currently on sale, smallest first.
    pub fn active_packs(&self) -> Result<Vec<CreditPack>, BillingError> {
        Ok(self
            .packs
            .list()?
            .into_iter()
            .filter(|pack| pack.active)
            .collect())
    }

    pub fn start_checkout(
        &self,
        company: &CompanyId,
        pack_id: &CreditPackId,
    ) -> Result<CheckoutSession, BillingError> {
        let pack = self.packs.fetch(pack_id)?.ok_or(BillingError::PackNotFound)?;
        if !pack.active {
            return Err(BillingError::PackInactive);
        }
        let base = self.base_url.trim_end_matches('/');
        let request = CheckoutRequest {
            company_id: company.clone(),
            pack,
            success_url: format!("{base}/portal/billing?status=success"),
            cancel_url: format!("{base}/portal/billing?status=cancelled"),
        };
        let session = self.gateway.create_checkout(&request)?;
        info!(company = %company, pack = %pack_id, session = %session.id, "checkout started");
        Ok(session)
    }

    /// Credits a paid checkout session once; replays are acknowledged without a new row.
    pub fn complete_purchase(
        &self,
        session_id: &str,
        company: &CompanyId,
        pack_id: &CreditPackId,
        now: DateTime<Utc>,
    ) -> Result<PurchaseOutcome, BillingError> {
        let pack = self.packs.fetch(pack_id)?.ok_or(BillingError::PackNotFound)?;
        if self.companies.fetch(company)?.is_none() {
            return Err(BillingError::CompanyNotFound);
        }
        let reference = LedgerReference::checkout_session(session_id);
        if self
            .ledger
            .find_reference(company, LedgerReason::Purchase, &reference)?
            .is_some()
        {
            return Ok(PurchaseOutcome::AlreadyApplied);
        }

        let request = LedgerEntryRequest::new(company.clone(), pack.credits, LedgerReason::Purchase)
            .with_reference(reference)
            .with_description(format!("Purchased {}", pack.name));
        match self.ledger.apply_entry(request, now) {
            Ok(row) => {
                info!(
                    company = %company,
                    credits = row.delta,
                    balance = row.balance_after,
                    "credit pack purchased"
                );
                Ok(PurchaseOutcome::Credited { row })
            }
            Err(LedgerError::DuplicateReference) => Ok(PurchaseOutcome::AlreadyApplied),
            Err(err) => Err(err.into()),
        }
    }

    /// Manual credit or debit by an admin.
    pub fn adjust_credits(
        &self,
        actor: &UserId,
        company: &CompanyId,
        delta: Credits,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<LedgerRow, BillingError> {
        if self.companies.fetch(company)?.is_none() {
            return Err(BillingError::CompanyNotFound);
        }
        let description = description
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .unwrap_or_else(|| "Manual adjustment".to_string());
        let request = LedgerEntryRequest::new(company.clone(), delta, LedgerReason::Adjustment)
            .with_description(description);
        let row = self.ledger.apply_entry(request, now)?;

        info!(company = %company, delta, balance = row.balance_after, "credits adjusted");
        self.audit.record(
            AuditRecord::new(actor, "credits.adjusted", "company", company.as_str())
                .before(json!({ "balance": row.balance_after.saturating_sub(row.delta) }))
                .after(json!({
                    "balance": row.balance_after,
                    "delta": row.delta,
                    "description": row.description,
                })),
            now,
        );
        Ok(row)
    }
}
