// src/api.rs
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Serialize;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::model::{DerivedFeed, SourceFeed};
use crate::queue::{QueueHandle, RunRecord, ScheduledTask, Task};
use crate::sync::{FeedSyncer, FetchOutcome};

#[derive(Clone)]
pub struct AppState {
    pub syncer: Arc<FeedSyncer>,
    pub queue: QueueHandle,
    /// `None` when no recorder was installed; `/metrics` then answers 404.
    pub metrics: Option<PrometheusHandle>,
}

pub fn router(state: AppState) -> Router {
    let feeds = ServeDir::new(state.syncer.files().dir());

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/metrics", get(metrics))
        .route("/api/sources", get(list_sources))
        .route("/api/derived", get(list_derived))
        .route("/api/sources/{sid}/refresh", post(refresh_source))
        .route("/api/queue", get(queue_status))
        .nest_service("/feeds", feeds)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound(what) => (StatusCode::NOT_FOUND, what).into_response(),
            Self::Internal(e) => {
                tracing::error!(error = %format!("{e:#}"), "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal error").into_response()
            }
        }
    }
}

async fn metrics(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => (StatusCode::NOT_FOUND, "metrics disabled").into_response(),
    }
}

async fn list_sources(State(state): State<AppState>) -> Result<Json<Vec<SourceFeed>>, ApiError> {
    Ok(Json(state.syncer.store().sources().await?))
}

async fn list_derived(State(state): State<AppState>) -> Result<Json<Vec<DerivedFeed>>, ApiError> {
    Ok(Json(state.syncer.store().all_derived().await?))
}

async fn refresh_source(
    State(state): State<AppState>,
    Path(sid): Path<String>,
) -> Result<Json<FetchOutcome>, ApiError> {
    match state.syncer.refresh_source(&sid).await? {
        Some(outcome) => Ok(Json(outcome)),
        None => Err(ApiError::NotFound(format!("unknown source feed {sid}"))),
    }
}

#[derive(Serialize)]
struct QueueStatus {
    closed: bool,
    scheduled: Vec<ScheduledTask>,
    pending: Vec<Task>,
    recent: Vec<RunRecord>,
}

async fn queue_status(State(state): State<AppState>) -> Json<QueueStatus> {
    Json(QueueStatus {
        closed: state.queue.is_closed(),
        scheduled: state.queue.scheduled(),
        pending: state.queue.pending(),
        recent: state.queue.results(),
    })
}
