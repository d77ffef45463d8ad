//! Stuck-task recovery admin endpoints.

use axum::extract::State;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::api::tasks::TaskResponse;

#[derive(Debug, Deserialize)]
pub struct QueueAssignRequest {
    pub task_id: Uuid,
    pub agent_id: Uuid,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/queue/recovery/check", post(trigger_check))
        .route("/api/v1/queue/recovery/force", post(force_recover_all))
        .route("/api/v1/queue/assign", post(assign))
}

async fn trigger_check(State(state): State<AppState>) -> ApiResult<Json<Vec<Uuid>>> {
    Ok(Json(state.stuck_recovery.trigger_check().await?))
}

async fn force_recover_all(State(state): State<AppState>) -> ApiResult<Json<Vec<Uuid>>> {
    Ok(Json(state.stuck_recovery.force_recover_all().await?))
}

async fn assign(State(state): State<AppState>, Json(req): Json<QueueAssignRequest>) -> ApiResult<Json<TaskResponse>> {
    let task = state.queue.assign_task_to_agent(req.task_id, req.agent_id).await?;
    Ok(Json(TaskResponse::from(task)))
}
