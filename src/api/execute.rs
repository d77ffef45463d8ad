//! Triggers the end-to-end dispatch chain for an assigned task.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::api::tasks::TaskResponse;
use crate::domain::ports::HealthResponse;
use crate::services::DispatchOverrides;

#[derive(Debug, Deserialize)]
pub struct ExecuteRequest {
    pub task_id: Uuid,
    #[serde(default)]
    pub use_cloud: Option<bool>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub allow_fallback: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub struct AbortExecuteRequest {
    pub task_id: Uuid,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/tasks/:id/dispatch", post(dispatch))
        .route("/api/v1/execute", post(execute))
        .route("/api/v1/execute/abort", post(execute_abort))
        .route("/api/v1/execute/health", get(execute_health))
}

async fn dispatch(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<TaskResponse>> {
    let child = state.cancel.child_token();
    let task = state.queue.dispatch(id, &child).await?;
    Ok(Json(TaskResponse::from(task)))
}

/// Inbound entry point for dispatching a task with explicit per-call
/// overrides instead of relying on whatever the Router would otherwise
/// decide.
async fn execute(State(state): State<AppState>, Json(req): Json<ExecuteRequest>) -> ApiResult<Json<TaskResponse>> {
    let child = state.cancel.child_token();
    let overrides = DispatchOverrides {
        use_cloud: req.use_cloud,
        model: req.model,
        allow_fallback: req.allow_fallback,
    };
    let task = state.queue.dispatch_with_overrides(req.task_id, &child, overrides).await?;
    Ok(Json(TaskResponse::from(task)))
}

async fn execute_abort(
    State(state): State<AppState>,
    Json(req): Json<AbortExecuteRequest>,
) -> ApiResult<Json<TaskResponse>> {
    let task = state.queue.abort_task(req.task_id, "aborted via /execute/abort").await?;
    Ok(Json(TaskResponse::from(task)))
}

async fn execute_health(State(state): State<AppState>) -> ApiResult<Json<HealthResponse>> {
    let health = state.queue.agent_runtime.health().await?;
    Ok(Json(health))
}
