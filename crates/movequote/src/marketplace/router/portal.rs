use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::{payload, success, ApiError};
use crate::marketplace::domain::{AssignmentId, CreditPackId};
use crate::marketplace::partners::ProfileUpdate;
use crate::marketplace::portal::ProgressUpdate;
use crate::marketplace::Marketplace;

pub(super) fn routes() -> Router<Arc<Marketplace>> {
    Router::new()
        .route("/api/portal/leads", get(inbox))
        .route("/api/portal/assignments/:id/reveal", post(reveal))
        .route("/api/portal/assignments/:id/status", post(progress))
        .route("/api/portal/credits", get(credits))
        .route("/api/portal/credits/statement.csv", get(statement))
        .route("/api/portal/profile", put(profile))
        .route("/api/portal/coverage", put(coverage))
        .route("/api/portal/paused", put(paused))
        .route("/api/stripe/checkout", post(checkout))
}

async fn inbox(
    State(market): State<Arc<Marketplace>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let company = market.partner(&headers)?;
    let leads = market.portal.inbox(&company.id)?;
    Ok(success(StatusCode::OK, json!({ "leads": leads })))
}

async fn reveal(
    State(market): State<Arc<Marketplace>>,
    Path(assignment_id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let company = market.partner(&headers)?;
    let revealed = market.reveals.reveal_lead(
        &company.id,
        &AssignmentId(assignment_id),
        Utc::now(),
    )?;
    Ok(success(
        StatusCode::OK,
        json!({
            "assignment": revealed.assignment,
            "lead": revealed.lead,
            "contact": revealed.contact,
            "price": revealed.price,
            "balance": revealed.balance_after,
        }),
    ))
}

async fn progress(
    State(market): State<Arc<Marketplace>>,
    Path(assignment_id): Path<String>,
    headers: HeaderMap,
    body: Result<Json<ProgressUpdate>, JsonRejection>,
) -> Result<Response, ApiError> {
    let company = market.partner(&headers)?;
    let update = payload(body)?;
    let assignment = market.portal.update_progress(
        &company.id,
        &AssignmentId(assignment_id),
        update.status,
    )?;
    Ok(success(StatusCode::OK, json!({ "assignment": assignment })))
}

async fn credits(
    State(market): State<Arc<Marketplace>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let company = market.partner(&headers)?;
    let balance = market.ledger.balance(&company.id)?;
    let history = market.ledger.history(&company.id)?;
    Ok(success(
        StatusCode::OK,
        json!({
            "balance": balance,
            "history": history,
        }),
    ))
}

async fn statement(
    State(market): State<Arc<Marketplace>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let company = market.partner(&headers)?;
    let mut csv = Vec::new();
    market.ledger.write_statement(&company.id, &mut csv)?;
    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"credit-statement.csv\"",
            ),
        ],
        csv,
    )
        .into_response())
}

async fn profile(
    State(market): State<Arc<Marketplace>>,
    headers: HeaderMap,
    body: Result<Json<ProfileUpdate>, JsonRejection>,
) -> Result<Response, ApiError> {
    let company = market.partner(&headers)?;
    let update = payload(body)?;
    let company = market.partners.update_profile(&company.id, update)?;
    Ok(success(StatusCode::OK, json!({ "company": company })))
}

#[derive(Debug, Deserialize)]
struct CoverageUpdate {
    coverage: Vec<String>,
}

async fn coverage(
    State(market): State<Arc<Marketplace>>,
    headers: HeaderMap,
    body: Result<Json<CoverageUpdate>, JsonRejection>,
) -> Result<Response, ApiError> {
    let company = market.partner(&headers)?;
    let update = payload(body)?;
    let company = market.partners.set_coverage(&company.id, update.coverage)?;
    Ok(success(StatusCode::OK, json!({ "coverage": company.coverage })))
}

#[derive(Debug, Deserialize)]
struct PauseUpdate {
    paused: bool,
}

async fn paused(
    State(market): State<Arc<Marketplace>>,
    headers: HeaderMap,
    body: Result<Json<PauseUpdate>, JsonRejection>,
) -> Result<Response, ApiError> {
    let company = market.partner(&headers)?;
    let update = payload(body)?;
    let company = market.partners.set_paused(&company.id, update.paused)?;
    Ok(success(StatusCode::OK, json!({ "paused": company.paused })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutBody {
    pack_id: CreditPackId,
}

async fn checkout(
    State(market): State<Arc<Marketplace>>,
    headers: HeaderMap,
    body: Result<Json<CheckoutBody>, JsonRejection>,
) -> Result<Response, ApiError> {
    let company = market.partner(&headers)?;
    let request = payload(body)?;
    let session = market.billing.start_checkout(&company.id, &request.pack_id)?;
    Ok(success(
        StatusCode::OK,
        json!({
            "url": session.url,
            "sessionId": session.id,
        }),
    ))
}
