//! Mission decomposition, approval, and rejection endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::domain::models::Mission;
use crate::domain::ports::OrchestratorError;

#[derive(Debug, Deserialize)]
pub struct DecomposeRequest {
    pub prompt: String,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub auto_approve: bool,
    /// Block the call until the mission reaches a terminal state instead of
    /// returning as soon as it's created.
    #[serde(default)]
    pub wait_for_completion: bool,
    /// Override every subtask's assessed complexity instead of trusting the
    /// decomposer's own estimate.
    #[serde(default)]
    pub force_complexity: Option<u8>,
}

fn default_language() -> String {
    "rust".to_string()
}

#[derive(Debug, Deserialize)]
pub struct RejectRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/missions", get(list_missions).post(decompose))
        .route("/api/v1/missions/:id", get(get_mission))
        .route("/api/v1/missions/:id/approve", post(approve))
        .route("/api/v1/missions/:id/reject", post(reject))
        .route("/api/v1/missions/:id/wait", get(wait_for_completion))
        .route("/api/v1/missions/:id/files", get(get_mission_files))
}

async fn list_missions(State(state): State<AppState>) -> ApiResult<Json<Vec<Mission>>> {
    Ok(Json(state.missions.list().await?))
}

async fn decompose(
    State(state): State<AppState>,
    Json(req): Json<DecomposeRequest>,
) -> ApiResult<(StatusCode, Json<Mission>)> {
    let mission = state
        .mission_orchestrator
        .decompose_with_complexity(&req.prompt, &req.language, req.auto_approve, req.force_complexity)
        .await?;
    let mission = if req.wait_for_completion {
        state.mission_orchestrator.wait_for_completion(mission.id).await?
    } else {
        mission
    };
    Ok((StatusCode::CREATED, Json(mission)))
}

async fn get_mission(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Mission>> {
    let mission = state.missions.get(id).await?.ok_or(OrchestratorError::NotFound("mission", id))?;
    Ok(Json(mission))
}

async fn approve(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Mission>> {
    Ok(Json(state.mission_orchestrator.approve(id).await?))
}

async fn reject(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<RejectRequest>,
) -> ApiResult<Json<Mission>> {
    let reason = req.reason.unwrap_or_else(|| "rejected via API".to_string());
    Ok(Json(state.mission_orchestrator.reject(id, reason).await?))
}

async fn wait_for_completion(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Mission>> {
    Ok(Json(state.mission_orchestrator.wait_for_completion(id).await?))
}

/// Every file path locked by any of the mission's subtasks, deduplicated.
async fn get_mission_files(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<Vec<String>>> {
    let mission = state.missions.get(id).await?.ok_or(OrchestratorError::NotFound("mission", id))?;
    let mut files = Vec::new();
    for task_id in &mission.subtask_ids {
        if let Some(task) = state.tasks.get(*task_id).await? {
            for path in task.locked_files {
                if !files.contains(&path) {
                    files.push(path);
                }
            }
        }
    }
    Ok(Json(files))
}
