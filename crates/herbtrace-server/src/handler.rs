use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use serde::Serialize;
use serde_json::json;

use herbtrace_ledger::{
    BatchRecord, Event, PendingProcessing, PendingTesting, ProjectionBuilder, ProvenanceView,
};
use herbtrace_types::BatchId;

use crate::error::ServerResult;
use crate::router::AppState;

#[derive(Clone, Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }
    }
}

/// Health check handler.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::default())
}

/// Info handler.
pub async fn info_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let orgs = state.chain.contract().orgs();
    Json(json!({
        "name": "herbtrace-server",
        "version": env!("CARGO_PKG_VERSION"),
        "collector_org": orgs.collector_org,
        "processor_org": orgs.processor_org,
        "anonymous_read": state.allow_anonymous_read,
    }))
}

/// Create a batch under a freshly minted id.
pub async fn create_generated_batch(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ServerResult<(StatusCode, Json<Vec<Event>>)> {
    let caller = state.writer(&headers).await?;
    let batch_id = BatchId::generate();
    let history = state
        .chain
        .create_batch(caller.credential(), batch_id.as_str(), &body)?;
    Ok((StatusCode::CREATED, Json(history)))
}

pub async fn create_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    headers: HeaderMap,
    body: String,
) -> ServerResult<(StatusCode, Json<Vec<Event>>)> {
    let caller = state.writer(&headers).await?;
    let history = state
        .chain
        .create_batch(caller.credential(), &batch_id, &body)?;
    Ok((StatusCode::CREATED, Json(history)))
}

pub async fn process_batch(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    headers: HeaderMap,
    body: String,
) -> ServerResult<Json<Vec<Event>>> {
    let caller = state.writer(&headers).await?;
    let history = state
        .chain
        .process_batch(caller.credential(), &batch_id, &body)?;
    Ok(Json(history))
}

pub async fn add_lab_test(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    headers: HeaderMap,
    body: String,
) -> ServerResult<Json<Vec<Event>>> {
    let caller = state.writer(&headers).await?;
    let history = state
        .chain
        .add_lab_test(caller.credential(), &batch_id, &body)?;
    Ok(Json(history))
}

/// Stored history, byte-for-byte.
pub async fn batch_history(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    headers: HeaderMap,
) -> ServerResult<impl IntoResponse> {
    let caller = state.reader(&headers).await?;
    let raw = state.chain.batch_history(caller.credential(), &batch_id)?;
    Ok(([(header::CONTENT_TYPE, "application/json")], raw))
}

pub async fn list_batches(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ServerResult<Json<Vec<BatchRecord>>> {
    let caller = state.reader(&headers).await?;
    Ok(Json(state.chain.all_batches(caller.credential())?))
}

pub async fn pending_processing(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ServerResult<Json<Vec<PendingProcessing>>> {
    let caller = state.reader(&headers).await?;
    let records = state.chain.all_batches(caller.credential())?;
    Ok(Json(ProjectionBuilder::pending_processing(&records)))
}

pub async fn pending_testing(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ServerResult<Json<Vec<PendingTesting>>> {
    let caller = state.reader(&headers).await?;
    let records = state.chain.all_batches(caller.credential())?;
    Ok(Json(ProjectionBuilder::pending_testing(&records)))
}

pub async fn provenance(
    State(state): State<AppState>,
    Path(batch_id): Path<String>,
    headers: HeaderMap,
) -> ServerResult<Json<ProvenanceView>> {
    let caller = state.reader(&headers).await?;
    let history = state.chain.history(caller.credential(), &batch_id)?;
    Ok(Json(ProjectionBuilder::provenance(&batch_id, &history)))
}
