use chrono::{DateTime, Utc};

use super::audit::AuditEntry;
use super::cms::CmsContent;
use super::domain::{
    AssignmentId, AssignmentStatus, CmsContentId, Company, CompanyId, CreditPack, CreditPackId,
    Credits, Lead, LeadAssignment, LeadContactDetails, LeadId, PricingRuleId,
};
use super::ledger::{LedgerReason, LedgerReference, LedgerRow, PendingEntry};
use super::pricing::PricingRule;

/// Error enumeration for repository failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("balance changed since it was read (expected {expected}, found {actual})")]
    StaleBalance { expected: Credits, actual: Credits },
    #[error("a ledger row already exists for this reference")]
    DuplicateReference,
    #[error("precondition failed: {0}")]
    PreconditionFailed(String),
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Partner companies. Contact e-mail is unique.
pub trait CompanyRepository: Send + Sync {
    fn insert(&self, company: Company) -> Result<Company, RepositoryError>;
    fn update(&self, company: Company) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError>;
    /// Oldest registration first.
    fn list(&self) -> Result<Vec<Company>, RepositoryError>;
}

/// Leads and their access-gated contact details, written together.
pub trait LeadRepository: Send + Sync {
    fn insert(&self, lead: Lead, contact: LeadContactDetails) -> Result<Lead, RepositoryError>;
    fn fetch(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError>;
    fn contact_details(&self, id: &LeadId) -> Result<Option<LeadContactDetails>, RepositoryError>;
}

pub trait AssignmentRepository: Send + Sync {
    fn insert(&self, assignment: LeadAssignment) -> Result<LeadAssignment, RepositoryError>;
    /// Sets a partner progress status on an assignment `company` owns. The assignment
    /// must still grant contact details when the write happens, so a refund that lands
    /// first wins: `PreconditionFailed`.
    fn advance(
        &self,
        id: &AssignmentId,
        company: &CompanyId,
        status: AssignmentStatus,
    ) -> Result<LeadAssignment, RepositoryError>;
    fn fetch(&self, id: &AssignmentId) -> Result<Option<LeadAssignment>, RepositoryError>;
    /// Newest first.
    fn for_company(&self, company: &CompanyId) -> Result<Vec<LeadAssignment>, RepositoryError>;
    fn for_lead(&self, lead: &LeadId) -> Result<Vec<LeadAssignment>, RepositoryError>;
}

/// Assignment mutation committed together with a ledger row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentChange {
    /// Requires `revealed_at` to be unset.
    Reveal {
        assignment_id: AssignmentId,
        revealed_at: DateTime<Utc>,
        price: Credits,
    },
    /// Requires a recorded reveal; keeps `revealed_at` and `price_at_reveal`.
    Refund { assignment_id: AssignmentId },
}

impl AssignmentChange {
    pub fn assignment_id(&self) -> &AssignmentId {
        match self {
            AssignmentChange::Reveal { assignment_id, .. } => assignment_id,
            AssignmentChange::Refund { assignment_id } => assignment_id,
        }
    }
}

/// Append-only credit ledger.
///
/// `append` is a compare-and-swap on the company's current balance: the row is written
/// only when `entry.previous_balance` still matches, otherwise `StaleBalance`. A second
/// row with the same `(reason, reference)` for a company is refused with
/// `DuplicateReference`.
pub trait LedgerStore: Send + Sync {
    fn latest(&self, company: &CompanyId) -> Result<Option<LedgerRow>, RepositoryError>;
    /// Oldest first.
    fn history(&self, company: &CompanyId) -> Result<Vec<LedgerRow>, RepositoryError>;
    fn find_reference(
        &self,
        company: &CompanyId,
        reason: LedgerReason,
        reference: &LedgerReference,
    ) -> Result<Option<LedgerRow>, RepositoryError>;
    fn append(&self, entry: PendingEntry) -> Result<LedgerRow, RepositoryError>;
    /// Same guarantees as `append`, plus the assignment change, in one unit. Neither is
    /// written if either check fails.
    fn append_linked(
        &self,
        entry: PendingEntry,
        change: AssignmentChange,
    ) -> Result<(LedgerRow, LeadAssignment), RepositoryError>;
}

pub trait AuditSink: Send + Sync {
    fn append(&self, entry: AuditEntry) -> Result<(), RepositoryError>;
    /// Newest first.
    fn recent(&self, limit: usize) -> Result<Vec<AuditEntry>, RepositoryError>;
}

/// Pricing rules. At most one is active; only `activate` changes the flag.
pub trait PricingRuleRepository: Send + Sync {
    /// Stored inactive regardless of the incoming flag.
    fn insert(&self, rule: PricingRule) -> Result<PricingRule, RepositoryError>;
    /// Keeps the stored `is_active` flag.
    fn update(&self, rule: PricingRule) -> Result<PricingRule, RepositoryError>;
    fn fetch(&self, id: &PricingRuleId) -> Result<Option<PricingRule>, RepositoryError>;
    fn list(&self) -> Result<Vec<PricingRule>, RepositoryError>;
    fn active(&self) -> Result<Option<PricingRule>, RepositoryError>;
    /// Deactivates every other rule and activates `id` as a single operation.
    fn activate(&self, id: &PricingRuleId) -> Result<PricingRule, RepositoryError>;
}

/// CMS rows. Slugs are unique.
pub trait CmsRepository: Send + Sync {
    fn insert(&self, content: CmsContent) -> Result<CmsContent, RepositoryError>;
    fn update(&self, content: CmsContent) -> Result<CmsContent, RepositoryError>;
    fn fetch(&self, id: &CmsContentId) -> Result<Option<CmsContent>, RepositoryError>;
    fn by_slug(&self, slug: &str) -> Result<Option<CmsContent>, RepositoryError>;
    fn list(&self) -> Result<Vec<CmsContent>, RepositoryError>;
}

pub trait CreditPackCatalog: Send + Sync {
    fn upsert(&self, pack: CreditPack) -> Result<CreditPack, RepositoryError>;
    fn fetch(&self, id: &CreditPackId) -> Result<Option<CreditPack>, RepositoryError>;
    fn list(&self) -> Result<Vec<CreditPack>, RepositoryError>;
}
