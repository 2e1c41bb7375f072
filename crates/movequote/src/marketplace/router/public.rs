use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::{payload, success, ApiError};
use crate::marketplace::billing::PurchaseOutcome;
use crate::marketplace::cms::{CmsError, CmsKind};
use crate::marketplace::domain::{CompanyId, CreditPackId};
use crate::marketplace::leads::LeadSubmission;
use crate::marketplace::partners::PartnerRegistration;
use crate::marketplace::Marketplace;

pub(crate) const WEBHOOK_SECRET_HEADER: &str = "x-webhook-secret";

pub(super) fn routes() -> Router<Arc<Marketplace>> {
    Router::new()
        .route("/api/leads/submit", post(submit_lead))
        .route("/api/partners/register", post(register_partner))
        .route("/api/credit-packs", get(credit_packs))
        .route("/api/cms/:kind", get(cms_listing))
        .route("/api/cms/slug/:slug", get(cms_item))
        .route("/api/stripe/webhook", post(payment_webhook))
}

async fn submit_lead(
    State(market): State<Arc<Marketplace>>,
    body: Result<Json<LeadSubmission>, JsonRejection>,
) -> Result<Response, ApiError> {
    let submission = payload(body)?;
    let receipt = market.intake.submit(submission, Utc::now())?;
    Ok(success(
        StatusCode::CREATED,
        json!({
            "leadId": receipt.lead_id,
            "matched": receipt.matched,
        }),
    ))
}

async fn register_partner(
    State(market): State<Arc<Marketplace>>,
    body: Result<Json<PartnerRegistration>, JsonRejection>,
) -> Result<Response, ApiError> {
    let registration = payload(body)?;
    let company = market.partners.register(registration, Utc::now())?;
    Ok(success(
        StatusCode::CREATED,
        json!({
            "companyId": company.id,
            "status": company.status,
        }),
    ))
}

async fn credit_packs(State(market): State<Arc<Marketplace>>) -> Result<Response, ApiError> {
    let packs = market.billing.active_packs()?;
    Ok(success(StatusCode::OK, json!({ "packs": packs })))
}

async fn cms_listing(
    State(market): State<Arc<Marketplace>>,
    Path(kind): Path<String>,
) -> Result<Response, ApiError> {
    let kind = CmsKind::parse(&kind).ok_or(CmsError::NotFound)?;
    let items = market.cms.published(kind)?;
    Ok(success(StatusCode::OK, json!({ "items": items })))
}

async fn cms_item(
    State(market): State<Arc<Marketplace>>,
    Path(slug): Path<String>,
) -> Result<Response, ApiError> {
    let item = market.cms.published_by_slug(&slug)?;
    Ok(success(StatusCode::OK, json!({ "item": item })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PaymentNotice {
    session_id: String,
    company_id: CompanyId,
    pack_id: CreditPackId,
}

async fn payment_webhook(
    State(market): State<Arc<Marketplace>>,
    headers: HeaderMap,
    body: Result<Json<PaymentNotice>, JsonRejection>,
) -> Result<Response, ApiError> {
    let presented = headers
        .get(WEBHOOK_SECRET_HEADER)
        .and_then(|value| value.to_str().ok());
    if !market.webhook_authorized(presented) {
        warn!("payment webhook rejected: bad secret");
        return Err(ApiError::new(
            StatusCode::UNAUTHORIZED,
            "webhook signature mismatch",
        ));
    }
    let notice = payload(body)?;
    let outcome = market.billing.complete_purchase(
        &notice.session_id,
        &notice.company_id,
        &notice.pack_id,
        Utc::now(),
    )?;
    let body = match outcome {
        PurchaseOutcome::Credited { row } => json!({
            "credited": row.delta,
            "balance": row.balance_after,
        }),
        PurchaseOutcome::AlreadyApplied => json!({ "alreadyApplied": true }),
    };
    Ok(success(StatusCode::OK, body))
}
