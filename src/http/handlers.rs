//! API handlers.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::approval::{CreateIntentRequest, IntentDetail, VoteOutcome, VoteRequest};
use crate::http::response::{ApiError, ApiResponse, ApiResult};
use crate::http::server::AppState;
use crate::store::{
    BlockRepository, Intent, Page, PageRequest, TransferJob, TransferJobRepository,
    TransferStatus,
};

pub async fn create_intent(
    State(state): State<AppState>,
    payload: Result<Json<CreateIntentRequest>, JsonRejection>,
) -> ApiResult<Intent> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let intent = state.approvals.create_intent(request).await?;
    Ok(ApiResponse::ok(intent))
}

pub async fn cast_vote(
    State(state): State<AppState>,
    payload: Result<Json<VoteRequest>, JsonRejection>,
) -> ApiResult<VoteOutcome> {
    let Json(request) = payload.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let outcome = state.approvals.cast_vote(request).await?;
    Ok(ApiResponse::ok(outcome))
}

pub async fn page_intents(
    State(state): State<AppState>,
    query: Result<Query<PageRequest>, QueryRejection>,
) -> ApiResult<Page<Intent>> {
    let Query(page) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let page = state.approvals.page_intents(page).await?;
    Ok(ApiResponse::ok(page))
}

pub async fn get_intent(
    State(state): State<AppState>,
    id: Result<Path<i64>, PathRejection>,
) -> ApiResult<IntentDetail> {
    let Path(id) = id.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let detail = state.approvals.intent_detail(id).await?;
    Ok(ApiResponse::ok(detail))
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferPageQuery {
    pub page_num: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<TransferStatus>,
}

pub async fn page_transfers(
    State(state): State<AppState>,
    query: Result<Query<TransferPageQuery>, QueryRejection>,
) -> ApiResult<Page<TransferJob>> {
    let Query(query) = query.map_err(|e| ApiError::bad_request(e.body_text()))?;
    let request = PageRequest {
        page_num: query.page_num,
        page_size: query.page_size,
    };

    let mut conn = state.store.acquire().await?;
    let total = TransferJobRepository::count(&mut conn, query.status).await?;
    let list = TransferJobRepository::page(
        &mut conn,
        query.status,
        request.limit(),
        request.offset(),
    )
    .await?;
    Ok(ApiResponse::ok(Page::new(request, total, list)))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    pub quorum: u32,
    /// Highest block recorded by the scanner.
    pub scanned_through: Option<u64>,
}

pub async fn health(State(state): State<AppState>) -> ApiResult<HealthStatus> {
    let mut conn = state.store.acquire().await?;
    let scanned_through = BlockRepository::latest_number(&mut conn).await?;
    Ok(ApiResponse::ok(HealthStatus {
        status: "up".to_string(),
        quorum: state.approvals.quorum(),
        scanned_through,
    }))
}
