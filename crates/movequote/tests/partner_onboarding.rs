//! Partner onboarding through the HTTP surface: registration, admin review, the
//! approval e-mail, and the self-service settings that decide which leads arrive.

mod common;

use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use serde_json::{json, Value};

use common::{TestApp, ADMIN};
use movequote::marketplace::NotificationKind;

fn registration(email: &str, coverage: &[&str]) -> Value {
    json!({
        "companyName": "Pennine Removals",
        "contactName": "Morgan Hill",
        "contactEmail": email,
        "contactPhone": "0113 496 0000",
        "services": ["home_removals", "storage"],
        "accreditations": ["BAR", " "],
        "coverage": coverage,
    })
}

fn lead(origin: &str) -> Value {
    json!({
        "originPostcode": origin,
        "destinationPostcode": "M1 4BT",
        "moveDate": (Utc::now().date_naive() + Duration::days(21)).to_string(),
        "propertySize": "2_bed",
        "contact": {
            "name": "Jamie Mover",
            "email": "jamie@home.example",
            "phone": "07700 900321",
        },
        "consent": true,
    })
}

fn onboarding() -> TestApp {
    TestApp::new(15)
}

impl TestApp {
    async fn register(&self, email: &str, coverage: &[&str]) -> String {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/partners/register",
                None,
                Some(registration(email, coverage)),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["status"], "pending");
        body["companyId"].as_str().expect("company id").to_string()
    }

    async fn set_status(&self, company_id: &str, status: &str) -> (StatusCode, Value) {
        self.send(
            Method::POST,
            &format!("/api/admin/companies/{company_id}/status"),
            Some(ADMIN),
            Some(json!({ "status": status })),
        )
        .await
    }

    async fn lead_count(&self, token: &str) -> usize {
        let (status, body) = self
            .send(Method::GET, "/api/portal/leads", Some(token), None)
            .await;
        assert_eq!(status, StatusCode::OK);
        body["leads"].as_array().map_or(0, Vec::len)
    }

    async fn submit_lead(&self, origin: &str) -> u64 {
        let (status, body) = self
            .send(Method::POST, "/api/leads/submit", None, Some(lead(origin)))
            .await;
        assert_eq!(status, StatusCode::CREATED);
        body["matched"].as_u64().expect("matched count")
    }
}

#[tokio::test]
async fn registration_is_validated_and_unique_per_email() {
    let onboarding = onboarding();

    let (status, body) = onboarding
        .send(
            Method::POST,
            "/api/partners/register",
            None,
            Some(json!({
                "companyName": " ",
                "contactName": "Morgan Hill",
                "contactEmail": "not-an-email",
                "contactPhone": "0113",
                "services": [],
                "coverage": ["99"],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let fields: Vec<&str> = body["fields"]
        .as_array()
        .expect("field errors")
        .iter()
        .filter_map(|error| error["field"].as_str())
        .collect();
    for field in ["companyName", "contactEmail", "contactPhone", "services", "coverage"] {
        assert!(fields.contains(&field), "missing {field} in {fields:?}");
    }

    onboarding.register("hello@pennine.example", &["LS"]).await;
    let (status, body) = onboarding
        .send(
            Method::POST,
            "/api/partners/register",
            None,
            Some(registration("Hello@Pennine.example", &["LS"])),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn approval_unlocks_portal_and_sends_sign_in_link() {
    let onboarding = onboarding();
    let company_id = onboarding.register("hello@pennine.example", &["LS"]).await;
    let token = onboarding.sessions.sign_in(&company_id);

    let (status, _) = onboarding
        .send(Method::GET, "/api/portal/leads", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, change) = onboarding.set_status(&company_id, "approved").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["welcomeCredits"]["credits"], 15);
    assert_eq!(change["emailSent"], true);

    let sent = onboarding.mailbox.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, "hello@pennine.example");
    assert_eq!(
        sent[0].kind,
        NotificationKind::CompanyApproved {
            sign_in_link: format!("https://quotes.example/auth/magic/otp-{company_id}"),
        }
    );

    assert_eq!(onboarding.lead_count(&token).await, 0);
    let (status, credits) = onboarding
        .send(Method::GET, "/api/portal/credits", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(credits["balance"], 15);
}

#[tokio::test]
async fn suspension_revokes_access_and_reapproval_keeps_the_single_grant() {
    let onboarding = onboarding();
    let company_id = onboarding.register("hello@pennine.example", &["LS"]).await;
    let token = onboarding.sessions.sign_in(&company_id);
    onboarding.set_status(&company_id, "approved").await;

    let (status, _) = onboarding.set_status(&company_id, "suspended").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = onboarding
        .send(Method::GET, "/api/portal/credits", Some(&token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(onboarding.submit_lead("LS6 2AB").await, 0);

    let (status, change) = onboarding.set_status(&company_id, "approved").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["welcomeCredits"]["outcome"], "already_granted");
    let (_, credits) = onboarding
        .send(Method::GET, "/api/portal/credits", Some(&token), None)
        .await;
    assert_eq!(credits["balance"], 15);
    assert_eq!(onboarding.mailbox.sent().len(), 2);
}

#[tokio::test]
async fn rejection_sends_notice_without_link() {
    let onboarding = onboarding();
    let company_id = onboarding.register("hello@pennine.example", &["LS"]).await;

    let (status, change) = onboarding.set_status(&company_id, "rejected").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(change["welcomeCredits"]["outcome"], "not_applicable");
    assert_eq!(
        onboarding.mailbox.sent()[0].kind,
        NotificationKind::CompanyRejected
    );

    let (status, _) = onboarding.set_status(&company_id, "suspended").await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn pause_and_coverage_decide_which_leads_arrive() {
    let onboarding = onboarding();
    let company_id = onboarding.register("hello@pennine.example", &["LS"]).await;
    let token = onboarding.sessions.sign_in(&company_id);
    onboarding.set_status(&company_id, "approved").await;

    assert_eq!(onboarding.submit_lead("LS6 2AB").await, 1);

    let (status, paused) = onboarding
        .send(
            Method::PUT,
            "/api/portal/paused",
            Some(&token),
            Some(json!({ "paused": true })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paused["paused"], true);
    assert_eq!(onboarding.submit_lead("LS6 2AB").await, 0);
    assert_eq!(onboarding.lead_count(&token).await, 1, "paused partners keep the inbox");

    onboarding
        .send(
            Method::PUT,
            "/api/portal/paused",
            Some(&token),
            Some(json!({ "paused": false })),
        )
        .await;
    let (status, coverage) = onboarding
        .send(
            Method::PUT,
            "/api/portal/coverage",
            Some(&token),
            Some(json!({ "coverage": ["m", "SW1", "M"] })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(coverage["coverage"], json!(["M", "SW1"]));

    assert_eq!(onboarding.submit_lead("LS6 2AB").await, 0);
    assert_eq!(onboarding.submit_lead("SW1A 1AA").await, 1);
    assert_eq!(onboarding.submit_lead("SW10 0AA").await, 0);
    assert_eq!(onboarding.lead_count(&token).await, 2);

    let (status, _) = onboarding
        .send(
            Method::PUT,
            "/api/portal/coverage",
            Some(&token),
            Some(json!({ "coverage": [] })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn profile_update_keeps_registered_email() {
    let onboarding = onboarding();
    let company_id = onboarding.register("hello@pennine.example", &["LS"]).await;
    let token = onboarding.sessions.sign_in(&company_id);
    onboarding.set_status(&company_id, "approved").await;

    let (status, body) = onboarding
        .send(
            Method::PUT,
            "/api/portal/profile",
            Some(&token),
            Some(json!({
                "companyName": "Pennine Moves Ltd",
                "contactName": "Morgan Hill",
                "contactPhone": "0113 496 0001",
                "services": ["packing", "home_removals", "packing"],
            })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["company"]["name"], "Pennine Moves Ltd");
    assert_eq!(body["company"]["contact_email"], "hello@pennine.example");
    assert_eq!(body["company"]["services"], json!(["home_removals", "packing"]));

    let (status, listing) = onboarding
        .send(Method::GET, "/api/admin/companies", Some(ADMIN), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listing["companies"][0]["name"], "Pennine Moves Ltd");
}
