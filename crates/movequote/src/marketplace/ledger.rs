//! Append-only credit ledger.
//!
//! Every balance change is a new [`LedgerRow`] carrying the signed `delta` and the
//! running `balance_after`; the newest row's `balance_after` is the company's balance.
//! Rows are never edited or removed.
//!
//! Writes go through [`LedgerStore::append`], which only commits when the balance the
//! entry was computed from is still current. A lost race re-reads and tries again, up to
//! [`CreditLedger::MAX_APPEND_ATTEMPTS`] times.

use std::io::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::domain::{AssignmentId, CompanyId, Credits, LeadAssignment, LedgerEntryId};
use super::repository::{AssignmentChange, LedgerStore, RepositoryError};

/// Why a balance changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerReason {
    Purchase,
    Reveal,
    Refund,
    Adjustment,
}

impl LedgerReason {
    pub fn label(&self) -> &'static str {
        match self {
            LedgerReason::Purchase => "purchase",
            LedgerReason::Reveal => "reveal",
            LedgerReason::Refund => "refund",
            LedgerReason::Adjustment => "adjustment",
        }
    }
}

/// Pointer from a ledger row back to whatever caused it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerReference {
    pub reference_type: String,
    pub reference_id: String,
}

impl LedgerReference {
    pub const ASSIGNMENT: &'static str = "lead_assignment";
    pub const WELCOME_CREDITS: &'static str = "welcome_credits";
    pub const CHECKOUT_SESSION: &'static str = "checkout_session";

    pub fn new(reference_type: impl Into<String>, reference_id: impl Into<String>) -> Self {
        Self {
            reference_type: reference_type.into(),
            reference_id: reference_id.into(),
        }
    }

    pub fn assignment(id: &AssignmentId) -> Self {
        Self::new(Self::ASSIGNMENT, id.as_str())
    }

    pub fn welcome_credits(company: &CompanyId) -> Self {
        Self::new(Self::WELCOME_CREDITS, company.as_str())
    }

    pub fn checkout_session(session_id: &str) -> Self {
        Self::new(Self::CHECKOUT_SESSION, session_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub id: LedgerEntryId,
    pub company_id: CompanyId,
    pub delta: Credits,
    pub balance_after: Credits,
    pub reason: LedgerReason,
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub reference: Option<LedgerReference>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Caller's request for a balance change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntryRequest {
    pub company_id: CompanyId,
    pub delta: Credits,
    pub reason: LedgerReason,
    pub reference: Option<LedgerReference>,
    pub description: Option<String>,
}

impl LedgerEntryRequest {
    pub fn new(company_id: CompanyId, delta: Credits, reason: LedgerReason) -> Self {
        Self {
            company_id,
            delta,
            reason,
            reference: None,
            description: None,
        }
    }

    pub fn with_reference(mut self, reference: LedgerReference) -> Self {
        self.reference = Some(reference);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// A validated row, pinned to the balance it was computed from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingEntry {
    pub company_id: CompanyId,
    pub delta: Credits,
    pub previous_balance: Credits,
    pub balance_after: Credits,
    pub reason: LedgerReason,
    pub reference: Option<LedgerReference>,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl PendingEntry {
    pub fn into_row(self) -> LedgerRow {
        LedgerRow {
            id: LedgerEntryId::generate(),
            company_id: self.company_id,
            delta: self.delta,
            balance_after: self.balance_after,
            reason: self.reason,
            reference: self.reference,
            description: self.description,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger entries must change the balance")]
    ZeroDelta,
    #[error("a single entry may move at most {limit} credits")]
    DeltaOutOfRange { limit: Credits },
    #[error("entry would take the balance outside the supported range")]
    BalanceOutOfRange,
    #[error("insufficient credit balance: {balance} available, {requested} required")]
    InsufficientBalance { balance: Credits, requested: Credits },
    #[error("a ledger entry for this reference already exists")]
    DuplicateReference,
    #[error("balance kept changing while the entry was being written")]
    Contended,
    #[error("linked record rejected the change: {0}")]
    LinkedPrecondition(String),
    #[error("linked record not found")]
    LinkedNotFound,
    #[error("unable to write statement: {0}")]
    Statement(String),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

/// One line of the downloadable credit statement.
#[derive(Debug, Serialize)]
struct StatementLine<'a> {
    date: String,
    reason: &'static str,
    delta: Credits,
    balance_after: Credits,
    reference_type: &'a str,
    reference_id: &'a str,
    description: &'a str,
}

/// Balance accounting over a [`LedgerStore`].
pub struct CreditLedger {
    store: Arc<dyn LedgerStore>,
}

impl CreditLedger {
    pub const MAX_APPEND_ATTEMPTS: usize = 3;
    /// Largest credit or debit one row may carry.
    pub const MAX_ENTRY_CREDITS: Credits = 1_000_000;

    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Current balance; zero before the first row.
    pub fn balance(&self, company: &CompanyId) -> Result<Credits, LedgerError> {
        let latest = self.store.latest(company)?;
        Ok(latest.map(|row| row.balance_after).unwrap_or(0))
    }

    pub fn history(&self, company: &CompanyId) -> Result<Vec<LedgerRow>, LedgerError> {
        Ok(self.store.history(company)?)
    }

    pub fn find_reference(
        &self,
        company: &CompanyId,
        reason: LedgerReason,
        reference: &LedgerReference,
    ) -> Result<Option<LedgerRow>, LedgerError> {
        Ok(self.store.find_reference(company, reason, reference)?)
    }

    /// Reads the current balance and validates the request against it.
    pub fn prepare(
        &self,
        request: &LedgerEntryRequest,
        now: DateTime<Utc>,
    ) -> Result<PendingEntry, LedgerError> {
        if request.delta == 0 {
            return Err(LedgerError::ZeroDelta);
        }
        if request.delta.unsigned_abs() > Self::MAX_ENTRY_CREDITS.unsigned_abs() {
            return Err(LedgerError::DeltaOutOfRange {
                limit: Self::MAX_ENTRY_CREDITS,
            });
        }

        let previous_balance = self.balance(&request.company_id)?;
        let balance_after = previous_balance
            .checked_add(request.delta)
            .ok_or(LedgerError::BalanceOutOfRange)?;
        if balance_after < 0 {
            return Err(LedgerError::InsufficientBalance {
                balance: previous_balance,
                requested: -request.delta,
            });
        }

        Ok(PendingEntry {
            company_id: request.company_id.clone(),
            delta: request.delta,
            previous_balance,
            balance_after,
            reason: request.reason,
            reference: request.reference.clone(),
            description: request.description.clone(),
            created_at: now,
        })
    }

    /// Appends a row for `request`. A refused debit writes nothing.
    pub fn apply_entry(
        &self,
        request: LedgerEntryRequest,
        now: DateTime<Utc>,
    ) -> Result<LedgerRow, LedgerError> {
        self.with_retry(&request, now, |entry| self.store.append(entry))
    }

    /// Appends a row and applies `change` to its assignment atomically.
    pub fn apply_linked(
        &self,
        request: LedgerEntryRequest,
        change: AssignmentChange,
        now: DateTime<Utc>,
    ) -> Result<(LedgerRow, LeadAssignment), LedgerError> {
        self.with_retry(&request, now, |entry| {
            self.store.append_linked(entry, change.clone())
        })
    }

    fn with_retry<T>(
        &self,
        request: &LedgerEntryRequest,
        now: DateTime<Utc>,
        mut write: impl FnMut(PendingEntry) -> Result<T, RepositoryError>,
    ) -> Result<T, LedgerError> {
        for attempt in 1..=Self::MAX_APPEND_ATTEMPTS {
            let entry = self.prepare(request, now)?;
            match write(entry) {
                Ok(written) => return Ok(written),
                Err(RepositoryError::StaleBalance { expected, actual }) => {
                    debug!(
                        company = %request.company_id,
                        attempt,
                        expected,
                        actual,
                        "ledger balance moved underneath entry; retrying"
                    );
                }
                Err(RepositoryError::DuplicateReference) => {
                    return Err(LedgerError::DuplicateReference)
                }
                Err(RepositoryError::PreconditionFailed(reason)) => {
                    return Err(LedgerError::LinkedPrecondition(reason))
                }
                Err(RepositoryError::NotFound) => return Err(LedgerError::LinkedNotFound),
                Err(other) => return Err(LedgerError::Storage(other)),
            }
        }
        Err(LedgerError::Contended)
    }

    /// Writes the company's ledger, oldest first, as CSV.
    pub fn write_statement<W: Write>(
        &self,
        company: &CompanyId,
        writer: W,
    ) -> Result<(), LedgerError> {
        let rows = self.history(company)?;
        let mut wtr = csv::Writer::from_writer(writer);
        for row in &rows {
            let (reference_type, reference_id) = match &row.reference {
                Some(reference) => (
                    reference.reference_type.as_str(),
                    reference.reference_id.as_str(),
                ),
                None => ("", ""),
            };
            wtr.serialize(StatementLine {
                date: row.created_at.to_rfc3339(),
                reason: row.reason.label(),
                delta: row.delta,
                balance_after: row.balance_after,
                reference_type,
                reference_id,
                description: row.description.as_deref().unwrap_or(""),
            })
            .map_err(|err| LedgerError::Statement(err.to_string()))?;
        }
        wtr.flush()
            .map_err(|err| LedgerError::Statement(err.to_string()))?;
        Ok(())
    }
}
