//! Batch and schedule endpoints.

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    Json,
};
use tracing::info;

use autoflow_core::{Batch, BatchId};

use crate::http::responses::{
    Ack, ApiError, BatchListResponse, BatchResponse, BatchView, ScheduleRequest,
    ScheduleResponse,
};
use crate::orchestrator::NewBatch;
use crate::poller::WatchKey;
use crate::state::AppState;

async fn view(state: &AppState, batch: Batch) -> BatchView {
    let schedule = state.scheduler.get_schedule(&batch.id).await;
    BatchView { batch, schedule }
}

pub async fn list_batches(State(state): State<Arc<AppState>>) -> Json<BatchListResponse> {
    let mut batches = Vec::new();
    for batch in state.orchestrator.list().await {
        batches.push(view(&state, batch).await);
    }
    Json(BatchListResponse {
        success: true,
        batches,
    })
}

pub async fn create_batch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<NewBatch>, JsonRejection>,
) -> Result<Json<BatchResponse>, ApiError> {
    let Json(request) = payload?;
    let batch = state.orchestrator.create(request).await?;
    Ok(Json(BatchResponse {
        success: true,
        batch: view(&state, batch).await,
    }))
}

pub async fn get_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<BatchResponse>, ApiError> {
    let batch = state.orchestrator.get(&BatchId::new(id)).await?;
    Ok(Json(BatchResponse {
        success: true,
        batch: view(&state, batch).await,
    }))
}

pub async fn delete_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    let id = BatchId::new(id);
    state.orchestrator.delete(&id).await?;
    state.poller.stop(&WatchKey::Batch(id)).await;
    Ok(Ack::ok())
}

/// Start (or restart) a batch and begin polling its status.
pub async fn start_batch(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    let id = BatchId::new(id);
    state.orchestrator.start(&id).await?;
    info!(batch_id = %id, "Batch start requested over HTTP");
    state.poller.watch(WatchKey::Batch(id)).await;
    Ok(Ack::ok())
}

pub async fn set_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    payload: Result<Json<ScheduleRequest>, JsonRejection>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    let Json(req) = payload?;
    let schedule = state
        .scheduler
        .set_schedule(&BatchId::new(id), req.interval_seconds)
        .await?;
    Ok(Json(ScheduleResponse {
        success: true,
        schedule,
    }))
}

pub async fn clear_schedule(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Ack>, ApiError> {
    let id = BatchId::new(id);
    state.orchestrator.get(&id).await?;
    state.scheduler.clear_schedule(&id).await;
    Ok(Ack::ok())
}
