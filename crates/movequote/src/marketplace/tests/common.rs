use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use axum::response::Response;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde_json::Value;

use crate::marketplace::audit::AuditEntry;
use crate::marketplace::auth::{AuthError, IdentityProvider, Role, Session};
use crate::marketplace::billing::{CheckoutRequest, CheckoutSession, PaymentError, PaymentGateway};
use crate::marketplace::domain::{
    AssignmentId, AssignmentStatus, Company, CompanyId, CompanyStatus, LeadAssignment, LeadId,
    PropertySize, ServiceFlags, ServiceKind, UserId,
};
use crate::marketplace::leads::{ContactSubmission, LeadReceipt, LeadSubmission};
use crate::marketplace::ledger::{LedgerReason, LedgerReference, LedgerRow, PendingEntry};
use crate::marketplace::notify::{Notification, Notifier, NotifyError};
use crate::marketplace::partners::PartnerRegistration;
use crate::marketplace::pricing::{PricingRule, PricingRuleDraft};
use crate::marketplace::repository::{
    AssignmentChange, AssignmentRepository, AuditSink, LedgerStore, RepositoryError,
};
use crate::marketplace::{
    Collaborators, Marketplace, MarketplaceSettings, MarketplaceStores, MemoryStore,
};

pub(super) const ADMIN_TOKEN: &str = "admin-token";
pub(super) const WEBHOOK_SECRET: &str = "whsec_test";

pub(super) fn now() -> DateTime<Utc> {
    Utc::now()
}

pub(super) fn admin() -> UserId {
    UserId::from("admin-1")
}

/// Identity double: fixed bearer tokens mapped to sessions.
pub(super) struct StaticIdentity {
    sessions: Mutex<HashMap<String, Session>>,
    issued: Mutex<Vec<CompanyId>>,
}

impl StaticIdentity {
    pub(super) fn new() -> Self {
        let mut sessions = HashMap::new();
        sessions.insert(
            ADMIN_TOKEN.to_string(),
            Session {
                user_id: admin(),
                role: Role::Admin,
            },
        );
        Self {
            sessions: Mutex::new(sessions),
            issued: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn partner_token(&self, company: &CompanyId) -> String {
        let token = format!("partner-{company}");
        self.sessions.lock().insert(
            token.clone(),
            Session {
                user_id: UserId(format!("user-{company}")),
                role: Role::Partner {
                    company_id: company.clone(),
                },
            },
        );
        token
    }

    pub(super) fn issued(&self) -> Vec<CompanyId> {
        self.issued.lock().clone()
    }
}

impl IdentityProvider for StaticIdentity {
    fn resolve(&self, token: &str) -> Result<Option<Session>, AuthError> {
        Ok(self.sessions.lock().get(token).cloned())
    }

    fn issue_sign_in(&self, company: &CompanyId) -> Result<String, AuthError> {
        self.issued.lock().push(company.clone());
        Ok(format!("magic-{company}"))
    }
}

#[derive(Default)]
pub(super) struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    fail: bool,
}

impl RecordingNotifier {
    pub(super) fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub(super) fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        if self.fail {
            return Err(NotifyError::Transport("smtp relay refused".to_string()));
        }
        self.sent.lock().push(notification);
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct FakeGateway {
    sessions: AtomicUsize,
}

impl PaymentGateway for FakeGateway {
    fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, PaymentError> {
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("cs_test_{n}");
        Ok(CheckoutSession {
            url: format!("https://checkout.test/{id}?pack={}", request.pack.id),
            id,
        })
    }
}

/// Audit sink whose writes always fail.
pub(super) struct FailingAudit;

impl AuditSink for FailingAudit {
    fn append(&self, _entry: AuditEntry) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("audit table offline".to_string()))
    }

    fn recent(&self, _limit: usize) -> Result<Vec<AuditEntry>, RepositoryError> {
        Err(RepositoryError::Unavailable("audit table offline".to_string()))
    }
}

/// Ledger store that is unreachable.
pub(super) struct UnavailableLedger;

impl LedgerStore for UnavailableLedger {
    fn latest(&self, _company: &CompanyId) -> Result<Option<LedgerRow>, RepositoryError> {
        Err(RepositoryError::Unavailable("ledger offline".to_string()))
    }

    fn history(&self, _company: &CompanyId) -> Result<Vec<LedgerRow>, RepositoryError> {
        Err(RepositoryError::Unavailable("ledger offline".to_string()))
    }

    fn find_reference(
        &self,
        _company: &CompanyId,
        _reason: LedgerReason,
        _reference: &LedgerReference,
    ) -> Result<Option<LedgerRow>, RepositoryError> {
        Err(RepositoryError::Unavailable("ledger offline".to_string()))
    }

    fn append(&self, _entry: PendingEntry) -> Result<LedgerRow, RepositoryError> {
        Err(RepositoryError::Unavailable("ledger offline".to_string()))
    }

    fn append_linked(
        &self,
        _entry: PendingEntry,
        _change: AssignmentChange,
    ) -> Result<(LedgerRow, LeadAssignment), RepositoryError> {
        Err(RepositoryError::Unavailable("ledger offline".to_string()))
    }
}

/// Ledger that loses the compare-and-swap race a fixed number of times before
/// delegating to a real store.
pub(super) struct ContendedLedger {
    inner: Arc<MemoryStore>,
    losses: AtomicUsize,
    attempts: AtomicUsize,
}

impl ContendedLedger {
    pub(super) fn new(inner: Arc<MemoryStore>, losses: usize) -> Self {
        Self {
            inner,
            losses: AtomicUsize::new(losses),
            attempts: AtomicUsize::new(0),
        }
    }

    pub(super) fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn lose_race(&self, entry: &PendingEntry) -> Option<RepositoryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let remaining = self.losses.load(Ordering::SeqCst);
        if remaining == 0 {
            return None;
        }
        self.losses.store(remaining - 1, Ordering::SeqCst);
        Some(RepositoryError::StaleBalance {
            expected: entry.previous_balance,
            actual: entry.previous_balance + 1,
        })
    }
}

impl LedgerStore for ContendedLedger {
    fn latest(&self, company: &CompanyId) -> Result<Option<LedgerRow>, RepositoryError> {
        self.inner.latest(company)
    }

    fn history(&self, company: &CompanyId) -> Result<Vec<LedgerRow>, RepositoryError> {
        self.inner.history(company)
    }

    fn find_reference(
        &self,
        company: &CompanyId,
        reason: LedgerReason,
        reference: &LedgerReference,
    ) -> Result<Option<LedgerRow>, RepositoryError> {
        self.inner.find_reference(company, reason, reference)
    }

    fn append(&self, entry: PendingEntry) -> Result<LedgerRow, RepositoryError> {
        match self.lose_race(&entry) {
            Some(err) => Err(err),
            None => LedgerStore::append(self.inner.as_ref(), entry),
        }
    }

    fn append_linked(
        &self,
        entry: PendingEntry,
        change: AssignmentChange,
    ) -> Result<(LedgerRow, LeadAssignment), RepositoryError> {
        match self.lose_race(&entry) {
            Some(err) => Err(err),
            None => self.inner.append_linked(entry, change),
        }
    }
}

type Interleaved = Box<dyn FnOnce() + Send>;

/// Assignment store that runs a queued action right after the next `fetch` returns,
/// so a caller acts on a read that has already gone stale.
pub(super) struct InterleavingAssignments {
    inner: Arc<dyn AssignmentRepository>,
    after_fetch: Mutex<Option<Interleaved>>,
}

impl InterleavingAssignments {
    pub(super) fn new(inner: Arc<dyn AssignmentRepository>) -> Self {
        Self {
            inner,
            after_fetch: Mutex::new(None),
        }
    }

    pub(super) fn after_next_fetch(&self, action: impl FnOnce() + Send + 'static) {
        *self.after_fetch.lock() = Some(Box::new(action));
    }
}

impl AssignmentRepository for InterleavingAssignments {
    fn insert(&self, assignment: LeadAssignment) -> Result<LeadAssignment, RepositoryError> {
        self.inner.insert(assignment)
    }

    fn advance(
        &self,
        id: &AssignmentId,
        company: &CompanyId,
        status: AssignmentStatus,
    ) -> Result<LeadAssignment, RepositoryError> {
        self.inner.advance(id, company, status)
    }

    fn fetch(&self, id: &AssignmentId) -> Result<Option<LeadAssignment>, RepositoryError> {
        let found = self.inner.fetch(id)?;
        let action = self.after_fetch.lock().take();
        if let Some(action) = action {
            action();
        }
        Ok(found)
    }

    fn for_company(&self, company: &CompanyId) -> Result<Vec<LeadAssignment>, RepositoryError> {
        self.inner.for_company(company)
    }

    fn for_lead(&self, lead: &LeadId) -> Result<Vec<LeadAssignment>, RepositoryError> {
        self.inner.for_lead(lead)
    }
}

pub(super) fn settings() -> MarketplaceSettings {
    MarketplaceSettings {
        welcome_credits: 10,
        default_reveal_price: 5,
        base_url: "https://movequote.test".to_string(),
        webhook_secret: Some(WEBHOOK_SECRET.to_string()),
    }
}

pub(super) fn settings_with_welcome(credits: i64) -> MarketplaceSettings {
    MarketplaceSettings {
        welcome_credits: credits,
        ..settings()
    }
}

pub(super) struct Harness {
    pub store: Arc<MemoryStore>,
    pub market: Arc<Marketplace>,
    pub identity: Arc<StaticIdentity>,
    pub notifier: Arc<RecordingNotifier>,
}

pub(super) fn harness() -> Harness {
    harness_with(|_| {}, RecordingNotifier::default(), settings())
}

pub(super) fn harness_with(
    customize: impl FnOnce(&mut MarketplaceStores),
    notifier: RecordingNotifier,
    settings: MarketplaceSettings,
) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let mut stores = MarketplaceStores::in_memory(store.clone());
    customize(&mut stores);
    let identity = Arc::new(StaticIdentity::new());
    let notifier = Arc::new(notifier);
    let market = Arc::new(Marketplace::new(
        stores,
        Collaborators {
            identity: identity.clone(),
            notifier: notifier.clone(),
            payments: Arc::new(FakeGateway::default()),
        },
        settings,
    ));
    Harness {
        store,
        market,
        identity,
        notifier,
    }
}

pub(super) fn registration(email: &str, coverage: &[&str]) -> PartnerRegistration {
    PartnerRegistration {
        company_name: format!("Removals {email}"),
        contact_name: "Jo Swift".to_string(),
        contact_email: email.to_string(),
        contact_phone: "07700 900123".to_string(),
        services: vec![ServiceKind::HomeRemovals, ServiceKind::Packing],
        accreditations: vec!["BAR".to_string()],
        coverage: coverage.iter().map(|prefix| prefix.to_string()).collect(),
    }
}

pub(super) fn lead_submission(origin: &str) -> LeadSubmission {
    LeadSubmission {
        origin_postcode: origin.to_string(),
        destination_postcode: "LS6 2AB".to_string(),
        move_date: now().date_naive() + Duration::days(30),
        property_size: PropertySize::ThreeBed,
        services: ServiceFlags {
            packing: true,
            ..ServiceFlags::default()
        },
        distance_miles: Some(40),
        notes: Some("Second floor flat, no lift".to_string()),
        contact: ContactSubmission {
            name: "Sam Homeowner".to_string(),
            email: "sam@home.example".to_string(),
            phone: "07700 900456".to_string(),
        },
        consent: true,
    }
}

pub(super) fn flat_rule(price: i64) -> PricingRuleDraft {
    PricingRuleDraft {
        name: format!("Flat {price}"),
        base_price: price,
        property_size_modifiers: Default::default(),
        distance_band_modifiers: Default::default(),
        short_notice_days: 0,
        short_notice_surcharge: 0,
    }
}

impl Harness {
    pub(super) fn register(&self, email: &str, coverage: &[&str]) -> Company {
        self.market
            .partners
            .register(registration(email, coverage), now())
            .expect("registration succeeds")
    }

    /// Registers and approves a company; it receives the configured welcome credits.
    pub(super) fn approved_company(&self, email: &str, coverage: &[&str]) -> Company {
        let company = self.register(email, coverage);
        self.market
            .lifecycle
            .set_status(&admin(), &company.id, CompanyStatus::Approved, now())
            .expect("approval succeeds")
            .company
    }

    pub(super) fn submit_lead(&self, origin: &str) -> LeadReceipt {
        self.market
            .intake
            .submit(lead_submission(origin), now())
            .expect("lead submission succeeds")
    }

    pub(super) fn activate_flat_rule(&self, price: i64) -> PricingRule {
        let rule = self
            .market
            .pricing
            .create(&admin(), flat_rule(price), now())
            .expect("rule is valid");
        self.market
            .pricing
            .activate(&admin(), &rule.id, now())
            .expect("rule activates")
    }

    pub(super) fn balance(&self, company: &CompanyId) -> i64 {
        self.market.ledger.balance(company).expect("balance readable")
    }

    pub(super) fn assignment(&self, id: &AssignmentId) -> LeadAssignment {
        self.market
            .portal
            .inbox(&self.owner_of(id))
            .expect("inbox readable")
            .into_iter()
            .map(|item| item.assignment)
            .find(|assignment| &assignment.id == id)
            .expect("assignment exists")
    }

    fn owner_of(&self, id: &AssignmentId) -> CompanyId {
        AssignmentRepository::fetch(self.store.as_ref(), id)
            .expect("store readable")
            .expect("assignment exists")
            .company_id
    }
}

pub(super) fn assignment_for(receipt: &LeadReceipt, company: &CompanyId) -> AssignmentId {
    receipt
        .assignments
        .iter()
        .find(|assignment| &assignment.company_id == company)
        .map(|assignment| assignment.id.clone())
        .expect("company was matched to the lead")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}

pub(super) async fn read_text_body(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}
