//! Axum REST API handlers.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use crate::db;
use crate::errors::Result;
use crate::funding::{self, NewFundingRequest, RequestFilter};
use crate::investments;
use crate::ledger;
use crate::notify::Notifier;
use crate::progress;
use crate::types::{
    FundingRequest, FundingStatus, GrowingMethod, InvestmentRecord, LedgerEntry,
};

#[derive(Clone)]
pub struct ApiState {
    pub pool: SqlitePool,
    pub notifier: Notifier,
}

/// Assemble the full route table.
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/requests", post(create_request).get(list_requests))
        .route("/requests/:id", get(get_request))
        .route("/requests/:id/updates", post(append_update))
        .route("/requests/:id/cancel", post(cancel_request))
        .route("/requests/:id/status", post(set_request_status))
        .route("/investments", post(invest).get(list_investments))
        .route("/investments/:id", get(get_investment))
        .route("/investments/:id/progress", post(update_progress))
        .route("/investments/:id/cancel", post(cancel_investment))
        .route("/ledger", get(get_ledger))
        .route("/evidence", post(register_evidence))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────
// Request / response shapes
// ─────────────────────────────────────────────────────────

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

#[derive(Deserialize)]
pub struct CreateRequestBody {
    pub farmer_id: String,
    pub title: String,
    pub crop: String,
    pub acreage: f64,
    pub requested_amount: i64,
    pub method: GrowingMethod,
    pub evidence_cid: String,
    #[serde(default)]
    pub description: String,
    pub timeline_months: i64,
    pub roi_percent: i64,
    pub investor_share_percent: i64,
}

#[derive(Deserialize)]
pub struct ListRequestsQuery {
    pub crop: Option<String>,
    pub method: Option<GrowingMethod>,
    pub min_roi: Option<i64>,
    pub max_amount: Option<i64>,
    pub farmer_id: Option<String>,
}

#[derive(Serialize)]
pub struct RequestsResponse {
    pub count: usize,
    pub requests: Vec<FundingRequest>,
}

#[derive(Deserialize)]
pub struct AppendUpdateBody {
    pub farmer_id: String,
    pub text: String,
}

#[derive(Deserialize)]
pub struct CancelRequestBody {
    pub farmer_id: String,
}

#[derive(Deserialize)]
pub struct SetStatusBody {
    pub farmer_id: String,
    pub status: FundingStatus,
}

#[derive(Deserialize)]
pub struct InvestBody {
    pub project_id: String,
    pub investor_id: String,
    pub amount: i64,
}

#[derive(Deserialize)]
pub struct ListInvestmentsQuery {
    pub investor_id: Option<String>,
    pub project_id: Option<String>,
}

#[derive(Serialize)]
pub struct InvestmentsResponse {
    pub count: usize,
    pub records: Vec<InvestmentRecord>,
}

#[derive(Deserialize)]
pub struct UpdateProgressBody {
    pub caller_id: String,
    pub progress: i64,
    pub note: Option<String>,
}

#[derive(Deserialize)]
pub struct LedgerQuery {
    pub user_id: Option<String>,
    pub project_id: Option<String>,
}

#[derive(Serialize)]
pub struct LedgerResponse {
    pub count: usize,
    pub entries: Vec<LedgerEntry>,
}

#[derive(Deserialize)]
pub struct RegisterEvidenceBody {
    pub cid: String,
    pub storage_hash: String,
    pub owner_id: String,
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /requests`
pub async fn create_request(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<CreateRequestBody>,
) -> Result<impl IntoResponse> {
    let request = funding::create(
        &state.pool,
        &state.notifier,
        NewFundingRequest {
            farmer_id: body.farmer_id,
            title: body.title,
            crop: body.crop,
            acreage: body.acreage,
            requested_amount: body.requested_amount,
            method: body.method,
            evidence_cid: body.evidence_cid,
            description: body.description,
            timeline_months: body.timeline_months,
            roi_percent: body.roi_percent,
            investor_share_percent: body.investor_share_percent,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// `GET /requests`
pub async fn list_requests(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ListRequestsQuery>,
) -> Result<impl IntoResponse> {
    let requests = funding::list(
        &state.pool,
        &RequestFilter {
            crop: query.crop,
            method: query.method,
            min_roi: query.min_roi,
            max_amount: query.max_amount,
            farmer_id: query.farmer_id,
        },
    )
    .await?;
    Ok(Json(RequestsResponse {
        count: requests.len(),
        requests,
    }))
}

/// `GET /requests/:id`
pub async fn get_request(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let request = funding::get(&state.pool, &id).await?;
    Ok(Json(request))
}

/// `POST /requests/:id/updates`
pub async fn append_update(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(body): Json<AppendUpdateBody>,
) -> Result<impl IntoResponse> {
    let update =
        funding::append_update(&state.pool, &state.notifier, &id, &body.farmer_id, &body.text)
            .await?;
    Ok(Json(update))
}

/// `POST /requests/:id/cancel`
pub async fn cancel_request(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(body): Json<CancelRequestBody>,
) -> Result<impl IntoResponse> {
    funding::cancel(&state.pool, &id, &body.farmer_id).await?;
    Ok(StatusCode::OK)
}

/// `POST /requests/:id/status`
pub async fn set_request_status(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(body): Json<SetStatusBody>,
) -> Result<impl IntoResponse> {
    let request = funding::set_status(&state.pool, &id, &body.farmer_id, body.status).await?;
    Ok(Json(request))
}

/// `POST /investments`
pub async fn invest(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<InvestBody>,
) -> Result<impl IntoResponse> {
    let record = investments::invest(
        &state.pool,
        &state.notifier,
        &body.project_id,
        &body.investor_id,
        body.amount,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(record)))
}

/// `GET /investments`
pub async fn list_investments(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<ListInvestmentsQuery>,
) -> Result<impl IntoResponse> {
    let records = investments::list(
        &state.pool,
        query.investor_id.as_deref(),
        query.project_id.as_deref(),
    )
    .await?;
    Ok(Json(InvestmentsResponse {
        count: records.len(),
        records,
    }))
}

/// `GET /investments/:id`
pub async fn get_investment(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let record = investments::get(&state.pool, &id).await?;
    Ok(Json(record))
}

/// `POST /investments/:id/progress`
pub async fn update_progress(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
    Json(body): Json<UpdateProgressBody>,
) -> Result<impl IntoResponse> {
    let record = progress::update_progress(
        &state.pool,
        &state.notifier,
        &id,
        &body.caller_id,
        body.progress,
        body.note.as_deref(),
    )
    .await?;
    Ok(Json(record))
}

/// `POST /investments/:id/cancel`
pub async fn cancel_investment(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let record = investments::cancel(&state.pool, &id).await?;
    Ok(Json(record))
}

/// `GET /ledger`
pub async fn get_ledger(
    State(state): State<Arc<ApiState>>,
    Query(query): Query<LedgerQuery>,
) -> Result<impl IntoResponse> {
    let entries = match (query.user_id.as_deref(), query.project_id.as_deref()) {
        (Some(user_id), _) => ledger::for_user(&state.pool, user_id).await?,
        (None, Some(project_id)) => ledger::for_project(&state.pool, project_id).await?,
        (None, None) => {
            return Err(crate::errors::LedgerError::Validation(
                "user_id or project_id query parameter is required".to_string(),
            ));
        }
    };
    Ok(Json(LedgerResponse {
        count: entries.len(),
        entries,
    }))
}

/// `POST /evidence`
///
/// Ingestion seam for the media subsystem.
pub async fn register_evidence(
    State(state): State<Arc<ApiState>>,
    Json(body): Json<RegisterEvidenceBody>,
) -> Result<impl IntoResponse> {
    let evidence =
        db::register_evidence(&state.pool, &body.cid, &body.storage_hash, &body.owner_id).await?;
    Ok((StatusCode::CREATED, Json(evidence)))
}
