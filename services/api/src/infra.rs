use metrics_exporter_prometheus::PrometheusHandle;
use movequote::config::{AuthConfig, EmailConfig, PaymentConfig};
use movequote::marketplace::repository::{CreditPackCatalog, RepositoryError};
use movequote::marketplace::{
    AuthError, CheckoutRequest, CheckoutSession, CompanyId, CreditPack, CreditPackId,
    IdentityProvider, Notification, Notifier, NotifyError, PaymentError, PaymentGateway, Role,
    Session, UserId,
};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

const HOSTED_CHECKOUT_URL: &str = "https://checkout.payments.example/pay";

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Stand-in for the hosted auth provider. The configured admin token maps to an admin
/// session; sign-in tokens issued to partners double as their session tokens.
pub(crate) struct InMemoryIdentityProvider {
    admin_token: Option<String>,
    sign_ins: Mutex<HashMap<String, CompanyId>>,
}

impl InMemoryIdentityProvider {
    pub(crate) fn from_config(config: &AuthConfig) -> Self {
        Self {
            admin_token: config.admin_token.clone(),
            sign_ins: Mutex::new(HashMap::new()),
        }
    }
}

impl IdentityProvider for InMemoryIdentityProvider {
    fn resolve(&self, token: &str) -> Result<Option<Session>, AuthError> {
        if self.admin_token.as_deref() == Some(token) {
            return Ok(Some(Session {
                user_id: UserId::from("admin"),
                role: Role::Admin,
            }));
        }
        Ok(self.sign_ins.lock().get(token).map(|company| Session {
            user_id: UserId(format!("partner-{company}")),
            role: Role::Partner {
                company_id: company.clone(),
            },
        }))
    }

    fn issue_sign_in(&self, company: &CompanyId) -> Result<String, AuthError> {
        let token = Uuid::new_v4().simple().to_string();
        self.sign_ins.lock().insert(token.clone(), company.clone());
        Ok(token)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum DeliveryChannel {
    Transactional,
    ProviderFallback,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct OutboundEmail {
    pub(crate) channel: DeliveryChannel,
    pub(crate) from: String,
    pub(crate) subject: String,
    pub(crate) notification: Notification,
}

/// Records outbound mail in process. Without an email API key messages go out on the
/// auth provider's own mailer.
pub(crate) struct OutboxNotifier {
    channel: DeliveryChannel,
    from: String,
    sent: Mutex<Vec<OutboundEmail>>,
}

impl OutboxNotifier {
    pub(crate) fn from_config(config: &EmailConfig) -> Self {
        let channel = if config.api_key.is_some() {
            DeliveryChannel::Transactional
        } else {
            DeliveryChannel::ProviderFallback
        };
        Self {
            channel,
            from: config.from_address.clone(),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn sent(&self) -> Vec<OutboundEmail> {
        self.sent.lock().clone()
    }
}

impl Notifier for OutboxNotifier {
    fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        let email = OutboundEmail {
            channel: self.channel,
            from: self.from.clone(),
            subject: notification.subject(),
            notification,
        };
        info!(
            channel = ?email.channel,
            to = %email.notification.to,
            subject = %email.subject,
            "email queued"
        );
        self.sent.lock().push(email);
        Ok(())
    }
}

/// Hands out hosted checkout sessions; payment completion arrives via the webhook.
pub(crate) struct HostedCheckoutGateway {
    secret_key: Option<String>,
}

impl HostedCheckoutGateway {
    pub(crate) fn from_config(config: &PaymentConfig) -> Self {
        Self {
            secret_key: config.secret_key.clone(),
        }
    }
}

impl PaymentGateway for HostedCheckoutGateway {
    fn create_checkout(&self, request: &CheckoutRequest) -> Result<CheckoutSession, PaymentError> {
        if self.secret_key.is_none() {
            return Err(PaymentError::Provider(
                "PAYMENTS_SECRET_KEY is not configured".to_string(),
            ));
        }
        let id = format!("cs_{}", Uuid::new_v4().simple());
        info!(
            session = %id,
            company = %request.company_id,
            pack = %request.pack.id,
            "checkout session opened"
        );
        Ok(CheckoutSession {
            url: format!("{HOSTED_CHECKOUT_URL}/{id}"),
            id,
        })
    }
}

pub(crate) fn default_credit_packs() -> Vec<CreditPack> {
    [
        ("starter", "Starter", 10, 1_500),
        ("standard", "Standard", 25, 3_500),
        ("bulk", "Bulk", 60, 7_500),
    ]
    .into_iter()
    .map(|(id, name, credits, price_pence)| CreditPack {
        id: CreditPackId::from(id),
        name: name.to_string(),
        credits,
        price_pence,
        active: true,
    })
    .collect()
}

pub(crate) fn seed_credit_packs(catalog: &dyn CreditPackCatalog) -> Result<usize, RepositoryError> {
    let packs = default_credit_packs();
    let count = packs.len();
    for pack in packs {
        catalog.upsert(pack)?;
    }
    Ok(count)
}
