use super::common::*;
use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use crate::marketplace::domain::{CreditPack, CreditPackId};
use crate::marketplace::repository::CreditPackCatalog;
use crate::marketplace::router::marketplace_router;

fn request(method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn router(h: &Harness) -> Router {
    marketplace_router(h.market.clone())
}

fn starter_pack(h: &Harness) -> CreditPack {
    h.store
        .upsert(CreditPack {
            id: CreditPackId::from("starter"),
            name: "Starter".to_string(),
            credits: 50,
            price_pence: 4500,
            active: true,
        })
        .unwrap()
}

#[tokio::test]
async fn lead_submission_returns_created_with_match_count() {
    let h = harness();
    h.approved_company("ops@swift.example", &["M"]);

    let response = router(&h)
        .oneshot(request(
            Method::POST,
            "/api/leads/submit",
            None,
            Some(json!(lead_submission("M1 4BT"))),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::CREATED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["success"], true);
    assert_eq!(payload["matched"], 1);
    assert!(payload["leadId"].is_string());
}

#[tokio::test]
async fn malformed_body_is_a_bad_request_envelope() {
    let h = harness();
    let response = router(&h)
        .oneshot(
            Request::post("/api/leads/submit")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let payload = read_json_body(response).await;
    assert_eq!(payload["success"], false);
    assert!(payload["error"].is_string());
}

#[tokio::test]
async fn invalid_lead_lists_field_errors() {
    let h = harness();
    let mut submission = json!(lead_submission("M1 4BT"));
    submission["originPostcode"] = json!("nowhere");
    submission["consent"] = json!(false);

    let response = router(&h)
        .oneshot(request(Method::POST, "/api/leads/submit", None, Some(submission)))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    let payload = read_json_body(response).await;
    let fields: Vec<&str> = payload["fields"]
        .as_array()
        .expect("field errors listed")
        .iter()
        .filter_map(|error| error["field"].as_str())
        .collect();
    assert_eq!(fields, vec!["originPostcode", "consent"]);
}

#[tokio::test]
async fn portal_requires_a_session() {
    let h = harness();
    let response = router(&h)
        .oneshot(request(Method::GET, "/api/portal/leads", None, None))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = router(&h)
        .oneshot(request(
            Method::GET,
            "/api/portal/leads",
            Some("unknown-token"),
            None,
        ))
        .await
        .expect("route executes");
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn pending_company_cannot_use_the_portal() {
    let h = harness();
    let company = h.register("ops@pending.example", &["M"]);
    let token = h.identity.partner_token(&company.id);

    let response = router(&h)
        .oneshot(request(Method::GET, "/api/portal/leads", Some(&token), None))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_routes_refuse_partner_sessions() {
    let h = harness();
    let company = h.approved_company("ops@swift.example", &["M"]);
    let token = h.identity.partner_token(&company.id);

    for (method, uri, body) in [
        (Method::GET, "/api/admin/companies".to_string(), None),
        (
            Method::POST,
            format!("/api/admin/companies/{}/credits", company.id),
            Some(json!({ "delta": 100 })),
        ),
        (Method::GET, "/api/admin/audit".to_string(), None),
    ] {
        let response = router(&h)
            .oneshot(request(method, &uri, Some(&token), body))
            .await
            .expect("route executes");
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{uri}");
    }
    assert_eq!(h.balance(&company.id), 10);
}

#[tokio::test]
async fn reveal_over_http_returns_contact_and_balance() {
    let h = harness();
    h.activate_flat_rule(4);
    let company = h.approved_company("ops@swift.example", &["M"]);
    let assignment_id = assignment_for(&h.submit_lead("M1 4BT"), &company.id);
    let token = h.identity.partner_token(&company.id);

    let response = router(&h)
        .oneshot(request(
            Method::POST,
            &format!("/api/portal/assignments/{assignment_id}/reveal"),
            Some(&token),
            None,
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["price"], 4);
    assert_eq!(payload["balance"], 6);
    assert_eq!(payload["contact"]["email"], "sam@home.example");

    let again = router(&h)
        .oneshot(request(
            Method::POST,
            &format!("/api/portal/assignments/{assignment_id}/reveal"),
            Some(&token),
            None,
        ))
        .await
        .expect("route executes");
    assert_eq!(again.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn reveal_without_enough_credits_is_payment_required() {
    let h = harness_with(|_| {}, RecordingNotifier::default(), settings_with_welcome(2));
    let company = h.approved_company("ops@swift.example", &["M"]);
    let assignment_id = assignment_for(&h.submit_lead("M1 4BT"), &company.id);
    let token = h.identity.partner_token(&company.id);

    let response = router(&h)
        .oneshot(request(
            Method::POST,
            &format!("/api/portal/assignments/{assignment_id}/reveal"),
            Some(&token),
            None,
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::PAYMENT_REQUIRED);
    let payload = read_json_body(response).await;
    assert_eq!(payload["success"], false);
    assert_eq!(h.balance(&company.id), 2);
}

#[tokio::test]
async fn admin_approval_reports_welcome_credits() {
    let h = harness();
    let company = h.register("ops@swift.example", &["M"]);

    let response = router(&h)
        .oneshot(request(
            Method::POST,
            &format!("/api/admin/companies/{}/status", company.id),
            Some(ADMIN_TOKEN),
            Some(json!({ "status": "approved" })),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["previousStatus"], "pending");
    assert_eq!(payload["company"]["status"], "approved");
    assert_eq!(payload["welcomeCredits"]["outcome"], "granted");
    assert_eq!(payload["emailSent"], true);

    let invalid = router(&h)
        .oneshot(request(
            Method::POST,
            &format!("/api/admin/companies/{}/status", company.id),
            Some(ADMIN_TOKEN),
            Some(json!({ "status": "pending" })),
        ))
        .await
        .expect("route executes");
    assert_eq!(invalid.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn webhook_requires_secret_and_ignores_replays() {
    let h = harness();
    let pack = starter_pack(&h);
    let company = h.approved_company("ops@swift.example", &["M"]);
    let notice = json!({
        "sessionId": "cs_live_1",
        "companyId": company.id,
        "packId": pack.id,
    });

    let forged = router(&h)
        .oneshot(
            Request::post("/api/stripe/webhook")
                .header(header::CONTENT_TYPE, "application/json")
                .header("x-webhook-secret", "guess")
                .body(Body::from(serde_json::to_vec(&notice).unwrap()))
                .unwrap(),
        )
        .await
        .expect("route executes");
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(h.balance(&company.id), 10);

    let deliver = || {
        Request::post("/api/stripe/webhook")
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-webhook-secret", WEBHOOK_SECRET)
            .body(Body::from(serde_json::to_vec(&notice).unwrap()))
            .unwrap()
    };

    let first = router(&h).oneshot(deliver()).await.expect("route executes");
    assert_eq!(first.status(), StatusCode::OK);
    let payload = read_json_body(first).await;
    assert_eq!(payload["credited"], 50);
    assert_eq!(payload["balance"], 60);

    let replay = router(&h).oneshot(deliver()).await.expect("route executes");
    assert_eq!(replay.status(), StatusCode::OK);
    let payload = read_json_body(replay).await;
    assert_eq!(payload["alreadyApplied"], true);
    assert_eq!(h.balance(&company.id), 60);
}

#[tokio::test]
async fn checkout_returns_hosted_payment_url() {
    let h = harness();
    let pack = starter_pack(&h);
    let company = h.approved_company("ops@swift.example", &["M"]);
    let token = h.identity.partner_token(&company.id);

    let response = router(&h)
        .oneshot(request(
            Method::POST,
            "/api/stripe/checkout",
            Some(&token),
            Some(json!({ "packId": pack.id })),
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    let payload = read_json_body(response).await;
    assert_eq!(payload["sessionId"], "cs_test_1");
    assert_eq!(payload["url"], "https://checkout.test/cs_test_1?pack=starter");
}

#[tokio::test]
async fn statement_is_served_as_csv() {
    let h = harness();
    let company = h.approved_company("ops@swift.example", &["M"]);
    let token = h.identity.partner_token(&company.id);

    let response = router(&h)
        .oneshot(request(
            Method::GET,
            "/api/portal/credits/statement.csv",
            Some(&token),
            None,
        ))
        .await
        .expect("route executes");

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/csv; charset=utf-8"
    );
    let body = read_text_body(response).await;
    let lines: Vec<&str> = body.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[1].contains("Welcome credits"));
}

#[tokio::test]
async fn cms_items_appear_publicly_once_published() {
    let h = harness();
    let draft = json!({
        "slug": "packing-checklist",
        "kind": "faq",
        "title": "What should I pack first?",
        "body": "Start with the rooms you use least.",
        "published": false,
    });

    let created = router(&h)
        .oneshot(request(
            Method::POST,
            "/api/admin/cms",
            Some(ADMIN_TOKEN),
            Some(draft.clone()),
        ))
        .await
        .expect("route executes");
    assert_eq!(created.status(), StatusCode::CREATED);
    let item_id = read_json_body(created).await["item"]["id"]
        .as_str()
        .expect("item id")
        .to_string();

    let hidden = router(&h)
        .oneshot(request(Method::GET, "/api/cms/faq", None, None))
        .await
        .expect("route executes");
    assert_eq!(read_json_body(hidden).await["items"], json!([]));

    let mut published = draft;
    published["published"] = json!(true);
    let updated = router(&h)
        .oneshot(request(
            Method::PUT,
            &format!("/api/admin/cms/{item_id}"),
            Some(ADMIN_TOKEN),
            Some(published),
        ))
        .await
        .expect("route executes");
    assert_eq!(updated.status(), StatusCode::OK);

    let listing = router(&h)
        .oneshot(request(Method::GET, "/api/cms/faq", None, None))
        .await
        .expect("route executes");
    let payload = read_json_body(listing).await;
    assert_eq!(payload["items"][0]["slug"], "packing-checklist");

    let unknown_kind = router(&h)
        .oneshot(request(Method::GET, "/api/cms/recipes", None, None))
        .await
        .expect("route executes");
    assert_eq!(unknown_kind.status(), StatusCode::NOT_FOUND);
}
