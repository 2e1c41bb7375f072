//! Removal-quote marketplace: partner lifecycle, lead intake, paid reveals and the
//! credit ledger behind them.
//!
//! Services are synchronous and talk to storage through the traits in [`repository`].
//! [`Marketplace`] wires them together over one set of stores and the external
//! collaborators (identity, e-mail, hosted checkout); [`router::marketplace_router`]
//! exposes it over HTTP.

pub mod audit;
pub mod auth;
pub mod billing;
pub mod cms;
pub mod domain;
pub mod leads;
pub mod ledger;
pub mod lifecycle;
pub mod memory;
pub mod notify;
pub mod partners;
pub mod portal;
pub mod pricing;
pub mod repository;
pub mod reveal;
pub mod router;
pub mod validation;

#[cfg(test)]
mod tests;

use std::sync::Arc;

use axum::http::HeaderMap;

use crate::config::{MarketplaceConfig, PaymentConfig};

pub use audit::{AuditEntry, AuditLogger, AuditRecord};
pub use auth::{AuthError, IdentityProvider, Role, Session};
pub use billing::{
    BillingError, BillingService, CheckoutRequest, CheckoutSession, PaymentError, PaymentGateway,
    PurchaseOutcome,
};
pub use cms::{CmsContent, CmsDraft, CmsError, CmsKind, CmsService};
pub use domain::{
    AssignmentId, AssignmentStatus, Company, CompanyId, CompanyStatus, CreditPack, CreditPackId,
    Credits, DistanceBand, Lead, LeadAssignment, LeadContactDetails, LeadId, PricingRuleId,
    PropertySize, ServiceFlags, ServiceKind, UserId,
};
pub use leads::{ContactSubmission, IntakeError, LeadIntake, LeadReceipt, LeadSubmission};
pub use ledger::{CreditLedger, LedgerEntryRequest, LedgerError, LedgerReason, LedgerRow};
pub use lifecycle::{CompanyLifecycle, LifecycleError, StatusChange, WelcomeCreditOutcome};
pub use memory::MemoryStore;
pub use notify::{Notification, NotificationKind, Notifier, NotifyError};
pub use partners::{PartnerRegistration, PartnerService, ProfileUpdate, RegistrationError};
pub use portal::{InboxItem, PortalError, PortalService};
pub use pricing::{compute_price, PricingError, PricingRule, PricingRuleDraft, PricingService};
pub use repository::RepositoryError;
pub use reveal::{RefundOutcome, RevealError, RevealService, RevealedLead};
pub use router::marketplace_router;

use repository::{
    AssignmentRepository, AuditSink, CmsRepository, CompanyRepository, CreditPackCatalog,
    LeadRepository, LedgerStore, PricingRuleRepository,
};

/// Every store the marketplace reads or writes.
#[derive(Clone)]
pub struct MarketplaceStores {
    pub companies: Arc<dyn CompanyRepository>,
    pub leads: Arc<dyn LeadRepository>,
    pub assignments: Arc<dyn AssignmentRepository>,
    pub ledger: Arc<dyn LedgerStore>,
    pub audit: Arc<dyn AuditSink>,
    pub pricing_rules: Arc<dyn PricingRuleRepository>,
    pub cms: Arc<dyn CmsRepository>,
    pub credit_packs: Arc<dyn CreditPackCatalog>,
}

impl MarketplaceStores {
    pub fn in_memory(store: Arc<MemoryStore>) -> Self {
        Self {
            companies: store.clone(),
            leads: store.clone(),
            assignments: store.clone(),
            ledger: store.clone(),
            audit: store.clone(),
            pricing_rules: store.clone(),
            cms: store.clone(),
            credit_packs: store,
        }
    }
}

/// External services consumed through request/response contracts.
#[derive(Clone)]
pub struct Collaborators {
    pub identity: Arc<dyn IdentityProvider>,
    pub notifier: Arc<dyn Notifier>,
    pub payments: Arc<dyn PaymentGateway>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketplaceSettings {
    pub welcome_credits: Credits,
    pub default_reveal_price: Credits,
    pub base_url: String,
    pub webhook_secret: Option<String>,
}

impl MarketplaceSettings {
    pub fn from_config(marketplace: &MarketplaceConfig, payments: &PaymentConfig) -> Self {
        Self {
            welcome_credits: marketplace.welcome_credits,
            default_reveal_price: marketplace.default_reveal_price,
            base_url: marketplace.base_url.clone(),
            webhook_secret: payments.webhook_secret.clone(),
        }
    }
}

impl Default for MarketplaceSettings {
    fn default() -> Self {
        Self {
            welcome_credits: 10,
            default_reveal_price: 5,
            base_url: "http://localhost:3000".to_string(),
            webhook_secret: None,
        }
    }
}

pub struct Marketplace {
    pub intake: LeadIntake,
    pub partners: PartnerService,
    pub lifecycle: CompanyLifecycle,
    pub reveals: RevealService,
    pub portal: PortalService,
    pub billing: BillingService,
    pub pricing: Arc<PricingService>,
    pub cms: CmsService,
    pub ledger: Arc<CreditLedger>,
    pub audit: AuditLogger,
    identity: Arc<dyn IdentityProvider>,
    webhook_secret: Option<String>,
}

impl Marketplace {
    pub fn new(
        stores: MarketplaceStores,
        collaborators: Collaborators,
        settings: MarketplaceSettings,
    ) -> Self {
        let audit = AuditLogger::new(stores.audit.clone());
        let ledger = Arc::new(CreditLedger::new(stores.ledger.clone()));
        let pricing = Arc::new(PricingService::new(
            stores.pricing_rules.clone(),
            audit.clone(),
            settings.default_reveal_price,
        ));

        Self {
            intake: LeadIntake::new(
                stores.companies.clone(),
                stores.leads.clone(),
                stores.assignments.clone(),
            ),
            partners: PartnerService::new(stores.companies.clone()),
            lifecycle: CompanyLifecycle::new(
                stores.companies.clone(),
                ledger.clone(),
                audit.clone(),
                collaborators.identity.clone(),
                collaborators.notifier.clone(),
                settings.welcome_credits,
                settings.base_url.clone(),
            ),
            reveals: RevealService::new(
                stores.assignments.clone(),
                stores.leads.clone(),
                ledger.clone(),
                pricing.clone(),
                audit.clone(),
            ),
            portal: PortalService::new(stores.assignments.clone(), stores.leads.clone()),
            billing: BillingService::new(
                stores.credit_packs.clone(),
                stores.companies.clone(),
                ledger.clone(),
                collaborators.payments.clone(),
                audit.clone(),
                settings.base_url.clone(),
            ),
            pricing,
            cms: CmsService::new(stores.cms.clone(), audit.clone()),
            ledger,
            audit,
            identity: collaborators.identity,
            webhook_secret: settings.webhook_secret,
        }
    }

    pub fn session(&self, headers: &HeaderMap) -> Result<Session, AuthError> {
        auth::authenticate(self.identity.as_ref(), headers)
    }

    /// Admin caller's user id, or the reason access is refused.
    pub fn admin(&self, headers: &HeaderMap) -> Result<UserId, AuthError> {
        auth::require_admin(&self.session(headers)?)
    }

    /// The caller's company; portal access requires it to be approved (paused is fine).
    pub fn partner(&self, headers: &HeaderMap) -> Result<Company, AuthError> {
        let company_id = auth::require_partner(&self.session(headers)?)?;
        let company = self
            .partners
            .fetch(&company_id)
            .map_err(|err| match err {
                RegistrationError::NotFound => AuthError::CompanyNotApproved,
                other => AuthError::Provider(other.to_string()),
            })?;
        if company.status != CompanyStatus::Approved {
            return Err(AuthError::CompanyNotApproved);
        }
        Ok(company)
    }

    /// Whether a payment webhook may be trusted. Open when no secret is configured.
    pub fn webhook_authorized(&self, presented: Option<&str>) -> bool {
        match &self.webhook_secret {
            Some(secret) => presented == Some(secret.as_str()),
            None => true,
        }
    }
}
