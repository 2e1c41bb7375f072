//! Router harness shared by the HTTP integration suites: an in-memory marketplace with
//! session, mailbox and checkout doubles.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::Router;
use parking_lot::Mutex;
use serde_json::Value;
use tower::ServiceExt;

use movequote::marketplace::{
    marketplace_router, AuthError, CheckoutRequest, CheckoutSession, Collaborators, CompanyId,
    Credits, IdentityProvider, Marketplace, MarketplaceSettings, MarketplaceStores, MemoryStore,
    Notification, Notifier, NotifyError, PaymentError, PaymentGateway, Role, Session, UserId,
};

pub const ADMIN: &str = "admin-session";
pub const BASE_URL: &str = "https://quotes.example/";

/// Bearer tokens mapped to sessions. `ADMIN` always resolves; partners sign in explicitly.
#[derive(Default)]
pub struct Sessions {
    tokens: Mutex<HashMap<String, Session>>,
}

impl Sessions {
    pub fn sign_in(&self, company: &str) -> String {
        let token = format!("session-{company}");
        self.tokens.lock().insert(
            token.clone(),
            Session {
                user_id: UserId(format!("staff-{company}")),
                role: Role::Partner {
                    company_id: CompanyId::from(company),
                },
            },
        );
        token
    }
}

impl IdentityProvider for Sessions {
    fn resolve(&self, token: &str) -> Result<Option<Session>, AuthError> {
        if token == ADMIN {
            return Ok(Some(Session {
                user_id: UserId::from("ops-admin"),
                role: Role::Admin,
            }));
        }
        Ok(self.tokens.lock().get(token).cloned())
    }

    fn issue_sign_in(&self, company: &CompanyId) -> Result<String, AuthError> {
        Ok(format!("otp-{company}"))
    }
}

#[derive(Default)]
pub struct Mailbox {
    sent: Mutex<Vec<Notification>>,
}

impl Mailbox {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().clone()
    }
}

impl Notifier for Mailbox {
    fn send(&self, notification: Notification) -> Result<(), NotifyError> {
        self.sent.lock().push(notification);
        Ok(())
    }
}

pub struct NoCheckout;

impl PaymentGateway for NoCheckout {
    fn create_checkout(&self, _request: &CheckoutRequest) -> Result<CheckoutSession, PaymentError> {
        Err(PaymentError::Provider("checkout disabled".to_string()))
    }
}

pub struct TestApp {
    pub router: Router,
    pub sessions: Arc<Sessions>,
    pub mailbox: Arc<Mailbox>,
}

impl TestApp {
    pub fn new(welcome_credits: Credits) -> Self {
        let sessions = Arc::new(Sessions::default());
        let mailbox = Arc::new(Mailbox::default());
        let market = Arc::new(Marketplace::new(
            MarketplaceStores::in_memory(Arc::new(MemoryStore::new())),
            Collaborators {
                identity: sessions.clone(),
                notifier: mailbox.clone(),
                payments: Arc::new(NoCheckout),
            },
            MarketplaceSettings {
                welcome_credits,
                default_reveal_price: 5,
                base_url: BASE_URL.to_string(),
                webhook_secret: None,
            },
        ));
        Self {
            router: marketplace_router(market),
            sessions,
            mailbox,
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let response = self
            .router
            .clone()
            .oneshot(call(method, uri, token, body))
            .await
            .expect("route executes");
        let status = response.status();
        (status, json_body(response).await)
    }
}

pub fn call(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    let body = match body {
        Some(value) => {
            builder = builder.header(header::CONTENT_TYPE, "application/json");
            Body::from(serde_json::to_vec(&value).expect("serializable"))
        }
        None => Body::empty(),
    };
    builder.body(body).expect("request builds")
}

pub async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body readable");
    serde_json::from_slice(&bytes).expect("json body")
}
