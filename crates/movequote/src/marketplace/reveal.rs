//! Paid reveal of homeowner contact details, and its admin refund.
//!
//! The debit and the assignment update are committed together through
//! [`CreditLedger::apply_linked`]; a company is never charged without the grant or
//! granted without the charge.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::info;

use super::audit::{AuditLogger, AuditRecord};
use super::domain::{
    AssignmentId, AssignmentStatus, CompanyId, Credits, Lead, LeadAssignment, LeadContactDetails,
    UserId,
};
use super::ledger::{CreditLedger, LedgerEntryRequest, LedgerError, LedgerReason, LedgerReference};
use super::pricing::{PricingError, PricingService};
use super::repository::{AssignmentChange, AssignmentRepository, LeadRepository, RepositoryError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevealedLead {
    pub assignment: LeadAssignment,
    pub lead: Lead,
    pub contact: LeadContactDetails,
    pub price: Credits,
    pub balance_after: Credits,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefundOutcome {
    pub assignment: LeadAssignment,
    pub refunded: Credits,
    pub balance_after: Credits,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevealError {
    #[error("assignment not found")]
    AssignmentNotFound,
    #[error("assignment belongs to another company")]
    NotAssignedToCompany,
    #[error("lead has already been revealed")]
    AlreadyRevealed,
    #[error("lead was never revealed")]
    NotRevealed,
    #[error("reveal has already been refunded")]
    AlreadyRefunded,
    #[error("insufficient credits: {balance} available, {price} required")]
    InsufficientBalance { balance: Credits, price: Credits },
    #[error("lead not found")]
    LeadNotFound,
    #[error(transparent)]
    Pricing(#[from] PricingError),
    #[error(transparent)]
    Ledger(LedgerError),
    #[error(transparent)]
    Storage(#[from] RepositoryError),
}

pub struct RevealService {
    assignments: Arc<dyn AssignmentRepository>,
    leads: Arc<dyn LeadRepository>,
    ledger: Arc<CreditLedger>,
    pricing: Arc<PricingService>,
    audit: AuditLogger,
}

impl RevealService {
    pub fn new(
        assignments: Arc<dyn AssignmentRepository>,
        leads: Arc<dyn LeadRepository>,
        ledger: Arc<CreditLedger>,
        pricing: Arc<PricingService>,
        audit: AuditLogger,
    ) -> Self {
        Self {
            assignments,
            leads,
            ledger,
            pricing,
            audit,
        }
    }

    fn owned_assignment(
        &self,
        company: &CompanyId,
        assignment_id: &AssignmentId,
    ) -> Result<LeadAssignment, RevealError> {
        let assignment = self
            .assignments
            .fetch(assignment_id)?
            .ok_or(RevealError::AssignmentNotFound)?;
        if &assignment.company_id != company {
            return Err(RevealError::NotAssignedToCompany);
        }
        Ok(assignment)
    }

    /// Charges the current price and returns the homeowner's contact details.
    pub fn reveal_lead(
        &self,
        company: &CompanyId,
        assignment_id: &AssignmentId,
        now: DateTime<Utc>,
    ) -> Result<RevealedLead, RevealError> {
        let assignment = self.owned_assignment(company, assignment_id)?;
        if assignment.is_revealed() {
            return Err(RevealError::AlreadyRevealed);
        }

        let lead = self
            .leads
            .fetch(&assignment.lead_id)?
            .ok_or(RevealError::LeadNotFound)?;
        let contact = self
            .leads
            .contact_details(&assignment.lead_id)?
            .ok_or(RevealError::LeadNotFound)?;
        let price = self.pricing.quote(&lead, now)?;

        let request = LedgerEntryRequest::new(company.clone(), -price, LedgerReason::Reveal)
            .with_reference(LedgerReference::assignment(assignment_id))
            .with_description(format!("Lead reveal {}", lead.id));
        let change = AssignmentChange::Reveal {
            assignment_id: assignment_id.clone(),
            revealed_at: now,
            price,
        };
        let (row, assignment) = self
            .ledger
            .apply_linked(request, change, now)
            .map_err(|err| match err {
                LedgerError::InsufficientBalance { balance, .. } => {
                    RevealError::InsufficientBalance { balance, price }
                }
                LedgerError::DuplicateReference | LedgerError::LinkedPrecondition(_) => {
                    RevealError::AlreadyRevealed
                }
                LedgerError::LinkedNotFound => RevealError::AssignmentNotFound,
                other => RevealError::Ledger(other),
            })?;

        info!(
            company = %company,
            assignment = %assignment.id,
            price,
            balance = row.balance_after,
            "lead revealed"
        );

        Ok(RevealedLead {
            assignment,
            lead,
            contact,
            price,
            balance_after: row.balance_after,
        })
    }

    /// Credits back exactly `price_at_reveal` and returns the assignment to `assigned`.
    pub fn refund_reveal(
        &self,
        actor: &UserId,
        assignment_id: &AssignmentId,
        now: DateTime<Utc>,
    ) -> Result<RefundOutcome, RevealError> {
        let before = self
            .assignments
            .fetch(assignment_id)?
            .ok_or(RevealError::AssignmentNotFound)?;
        let price = match (before.revealed_at, before.price_at_reveal) {
            (Some(_), Some(price)) => price,
            _ => return Err(RevealError::NotRevealed),
        };
        if before.status == AssignmentStatus::Assigned {
            return Err(RevealError::AlreadyRefunded);
        }

        let request =
            LedgerEntryRequest::new(before.company_id.clone(), price, LedgerReason::Refund)
                .with_reference(LedgerReference::assignment(assignment_id))
                .with_description(format!("Refund of lead reveal {}", before.lead_id));
        let change = AssignmentChange::Refund {
            assignment_id: assignment_id.clone(),
        };
        let (row, assignment) = self
            .ledger
            .apply_linked(request, change, now)
            .map_err(|err| match err {
                LedgerError::DuplicateReference => RevealError::AlreadyRefunded,
                LedgerError::LinkedPrecondition(_) => RevealError::NotRevealed,
                LedgerError::LinkedNotFound => RevealError::AssignmentNotFound,
                other => RevealError::Ledger(other),
            })?;

        info!(
            company = %assignment.company_id,
            assignment = %assignment.id,
            refunded = price,
            balance = row.balance_after,
            "reveal refunded"
        );
        self.audit.record(
            AuditRecord::new(
                actor,
                "assignment.refunded",
                "lead_assignment",
                assignment_id.as_str(),
            )
            .before(json!(before))
            .after(json!({
                "assignment": assignment,
                "refunded": price,
                "balance_after": row.balance_after,
            })),
            now,
        );

        Ok(RefundOutcome {
            assignment,
            refunded: price,
            balance_after: row.balance_after,
        })
    }
}
