use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::{payload, success, ApiError};
use crate::marketplace::cms::CmsDraft;
use crate::marketplace::domain::{
    AssignmentId, CmsContentId, CompanyId, CompanyStatus, Credits, PricingRuleId,
};
use crate::marketplace::pricing::PricingRuleDraft;
use crate::marketplace::Marketplace;

const DEFAULT_AUDIT_LIMIT: usize = 100;
const MAX_AUDIT_LIMIT: usize = 500;

pub(super) fn routes() -> Router<Arc<Marketplace>> {
    Router::new()
        .route("/api/admin/companies", get(companies))
        .route("/api/admin/companies/:id/status", post(company_status))
        .route("/api/admin/companies/:id/credits", post(adjust_credits))
        .route("/api/admin/assignments/:id/refund", post(refund))
        .route(
            "/api/admin/pricing-rules",
            get(pricing_rules).post(create_pricing_rule),
        )
        .route("/api/admin/pricing-rules/:id", put(update_pricing_rule))
        .route(
            "/api/admin/pricing-rules/:id/activate",
            post(activate_pricing_rule),
        )
        .route("/api/admin/cms", post(create_cms))
        .route("/api/admin/cms/:id", put(update_cms))
        .route("/api/admin/audit", get(audit_log))
}

async fn companies(
    State(market): State<Arc<Marketplace>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    market.admin(&headers)?;
    let companies = market.partners.list()?;
    Ok(success(StatusCode::OK, json!({ "companies": companies })))
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: CompanyStatus,
}

async fn company_status(
    State(market): State<Arc<Marketplace>>,
    Path(company_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<StatusBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let actor = market.admin(&headers)?;
    let request = payload(body)?;
    let change = market.lifecycle.set_status(
        &actor,
        &CompanyId(company_id),
        request.status,
        Utc::now(),
    )?;
    Ok(success(
        StatusCode::OK,
        json!({
            "company": change.company,
            "previousStatus": change.previous,
            "welcomeCredits": change.welcome_credits,
            "emailSent": change.email_sent,
            "emailError": change.email_error,
        }),
    ))
}

#[derive(Debug, Deserialize)]
struct AdjustmentBody {
    delta: Credits,
    #[serde(default)]
    description: Option<String>,
}

async fn adjust_credits(
    State(market): State<Arc<Marketplace>>,
    Path(company_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<AdjustmentBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let actor = market.admin(&headers)?;
    let request = payload(body)?;
    let row = market.billing.adjust_credits(
        &actor,
        &CompanyId(company_id),
        request.delta,
        request.description,
        Utc::now(),
    )?;
    Ok(success(
        StatusCode::OK,
        json!({
            "entry": row,
            "balance": row.balance_after,
        }),
    ))
}

async fn refund(
    State(market): State<Arc<Marketplace>>,
    Path(assignment_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let actor = market.admin(&headers)?;
    let outcome = market
        .reveals
        .refund_reveal(&actor, &AssignmentId(assignment_id), Utc::now())?;
    Ok(success(
        StatusCode::OK,
        json!({
            "assignment": outcome.assignment,
            "refunded": outcome.refunded,
            "balance": outcome.balance_after,
        }),
    ))
}

async fn pricing_rules(
    State(market): State<Arc<Marketplace>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    market.admin(&headers)?;
    let rules = market.pricing.list()?;
    Ok(success(StatusCode::OK, json!({ "rules": rules })))
}

async fn create_pricing_rule(
    State(market): State<Arc<Marketplace>>,
    headers: HeaderMap,
    body: Result<Json<PricingRuleDraft>, JsonRejection>,
) -> Result<Response, ApiError> {
    let actor = market.admin(&headers)?;
    let draft = payload(body)?;
    let rule = market.pricing.create(&actor, draft, Utc::now())?;
    Ok(success(StatusCode::CREATED, json!({ "rule": rule })))
}

async fn update_pricing_rule(
    State(market): State<Arc<Marketplace>>,
    Path(rule_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<PricingRuleDraft>, JsonRejection>,
) -> Result<Response, ApiError> {
    let actor = market.admin(&headers)?;
    let draft = payload(body)?;
    let rule = market
        .pricing
        .update(&actor, &PricingRuleId(rule_id), draft, Utc::now())?;
    Ok(success(StatusCode::OK, json!({ "rule": rule })))
}

async fn activate_pricing_rule(
    State(market): State<Arc<Marketplace>>,
    Path(rule_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let actor = market.admin(&headers)?;
    let rule = market
        .pricing
        .activate(&actor, &PricingRuleId(rule_id), Utc::now())?;
    Ok(success(StatusCode::OK, json!({ "rule": rule })))
}

async fn create_cms(
    State(market): State<Arc<Marketplace>>,
    headers: HeaderMap,
    body: Result<Json<CmsDraft>, JsonRejection>,
) -> Result<Response, ApiError> {
    let actor = market.admin(&headers)?;
    let draft = payload(body)?;
    let item = market.cms.create(&actor, draft, Utc::now())?;
    Ok(success(StatusCode::CREATED, json!({ "item": item })))
}

async fn update_cms(
    State(market): State<Arc<Marketplace>>,
    Path(content_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<CmsDraft>, JsonRejection>,
) -> Result<Response, ApiError> {
    let actor = market.admin(&headers)?;
    let draft = payload(body)?;
    let item = market
        .cms
        .update(&actor, &CmsContentId(content_id), draft, Utc::now())?;
    Ok(success(StatusCode::OK, json!({ "item": item })))
}

#[derive(Debug, Deserialize)]
struct AuditQuery {
    limit: Option<usize>,
}

async fn audit_log(
    State(market): State<Arc<Marketplace>>,
    Query(query): Query<AuditQuery>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    market.admin(&headers)?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_AUDIT_LIMIT)
        .clamp(1, MAX_AUDIT_LIMIT);
    let entries = market.audit.recent(limit)?;
    Ok(success(StatusCode::OK, json!({ "entries": entries })))
}
