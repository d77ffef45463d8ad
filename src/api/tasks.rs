//! Task CRUD and lifecycle transition endpoints.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::api::state::AppState;
use crate::domain::models::{Task, TaskStatus, TaskType};
use crate::domain::ports::{OrchestratorError, TaskFilter};

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub title: String,
    pub description: String,
    pub task_type: String,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub required_agent: Option<String>,
    #[serde(default)]
    pub locked_files: Vec<String>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub validation_command: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TaskQueryParams {
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub parent_task_id: Option<Uuid>,
    #[serde(default)]
    pub required_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AssignTaskRequest {
    pub agent_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct AbortTaskRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PatchTaskRequest {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub required_agent: Option<Option<String>>,
    #[serde(default)]
    pub max_iterations: Option<u32>,
    #[serde(default)]
    pub validation_command: Option<Option<String>>,
}

#[derive(Debug, Deserialize)]
pub struct CompleteTaskRequest {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
pub struct HumanInputRequest {
    #[serde(default = "default_true")]
    pub approve: bool,
    #[serde(default)]
    pub reason: Option<String>,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Serialize)]
pub struct TaskResponse {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub task_type: String,
    pub priority: u8,
    pub required_agent: Option<String>,
    pub locked_files: Vec<String>,
    pub max_iterations: u32,
    pub current_iteration: u32,
    pub complexity: u8,
    pub complexity_source: String,
    pub status: String,
    pub assigned_agent_id: Option<Uuid>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub parent_task_id: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Task> for TaskResponse {
    fn from(t: Task) -> Self {
        Self {
            id: t.id,
            title: t.title,
            description: t.description,
            task_type: t.task_type.as_str().to_string(),
            priority: t.priority,
            required_agent: t.required_agent,
            locked_files: t.locked_files,
            max_iterations: t.max_iterations,
            current_iteration: t.current_iteration,
            complexity: t.complexity,
            complexity_source: t.complexity_source.as_str().to_string(),
            status: t.status.as_str().to_string(),
            assigned_agent_id: t.assigned_agent_id,
            result: t.result,
            error: t.error,
            parent_task_id: t.parent_task_id,
            created_at: t.created_at.to_rfc3339(),
            updated_at: t.updated_at.to_rfc3339(),
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/tasks", get(list_tasks).post(create_task))
        .route("/api/v1/tasks/:id", get(get_task).patch(patch_task).delete(delete_task))
        .route("/api/v1/tasks/:id/assign", post(assign_task))
        .route("/api/v1/tasks/:id/abort", post(abort_task))
        .route("/api/v1/tasks/:id/return-to-pool", post(return_to_pool))
        .route("/api/v1/tasks/:id/retry", post(retry_task))
        .route("/api/v1/tasks/:id/complete", post(complete_task))
        .route("/api/v1/tasks/:id/human", post(human_input))
        .route("/api/v1/tasks/:id/escalate", post(escalate_task))
}

async fn list_tasks(
    State(state): State<AppState>,
    Query(params): Query<TaskQueryParams>,
) -> ApiResult<Json<Vec<TaskResponse>>> {
    let status = params.status.as_deref().and_then(TaskStatus::from_str);
    let filter = TaskFilter { status, parent_task_id: params.parent_task_id, required_agent: params.required_agent };
    let tasks = state.tasks.list(filter).await?;
    Ok(Json(tasks.into_iter().map(TaskResponse::from).collect()))
}

async fn create_task(
    State(state): State<AppState>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<TaskResponse>)> {
    let task_type = TaskType::from_str(&req.task_type)
        .ok_or_else(|| ApiError(OrchestratorError::InvalidTransition(format!("unknown task_type: {}", req.task_type))))?;
    let mut task = Task::new(req.title, req.description, task_type).with_locked_files(req.locked_files);
    if let Some(priority) = req.priority {
        task = task.with_priority(priority);
    }
    if let Some(agent) = req.required_agent {
        task = task.with_required_agent(agent);
    }
    if let Some(max_iterations) = req.max_iterations {
        task = task.with_max_iterations(max_iterations);
    }
    if let Some(cmd) = req.validation_command {
        task = task.with_validation_command(cmd);
    }
    let created = state.queue.create_task(task).await?;
    Ok((StatusCode::CREATED, Json(TaskResponse::from(created))))
}

async fn get_task(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<TaskResponse>> {
    let task = state.tasks.get(id).await?.ok_or(OrchestratorError::NotFound("task", id))?;
    Ok(Json(TaskResponse::from(task)))
}

async fn patch_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PatchTaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    let mut task = state.tasks.get(id).await?.ok_or(OrchestratorError::NotFound("task", id))?;
    if task.status != TaskStatus::Pending {
        return Err(ApiError(OrchestratorError::InvalidTransition(format!(
            "task {id} is {:?}, cannot be patched",
            task.status
        ))));
    }
    task.apply_patch(
        req.title,
        req.description,
        req.priority,
        req.required_agent,
        req.max_iterations,
        req.validation_command,
    );
    state.tasks.update(&task).await?;
    state.events.publish_task_updated(id, task.status.as_str()).await;
    Ok(Json(TaskResponse::from(task)))
}

async fn delete_task(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    state.tasks.delete(id).await?;
    state.events.publish_task_deleted(id).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn assign_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AssignTaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    let task = state.queue.assign_task_to_agent(id, req.agent_id).await?;
    Ok(Json(TaskResponse::from(task)))
}

async fn abort_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<AbortTaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    let reason = req.reason.unwrap_or_else(|| "aborted via API".to_string());
    let task = state.queue.abort_task(id, reason).await?;
    Ok(Json(TaskResponse::from(task)))
}

async fn return_to_pool(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<TaskResponse>> {
    let task = state.queue.return_to_pool(id).await?;
    Ok(Json(TaskResponse::from(task)))
}

async fn retry_task(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<TaskResponse>> {
    let task = state.queue.return_to_pool(id).await?;
    Ok(Json(TaskResponse::from(task)))
}

async fn complete_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CompleteTaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    let task = state.queue.complete_manually(id, req.result.unwrap_or_else(|| serde_json::json!({}))).await?;
    Ok(Json(TaskResponse::from(task)))
}

async fn human_input(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<HumanInputRequest>,
) -> ApiResult<Json<TaskResponse>> {
    let task = state.queue.provide_human_input(id, req.approve, req.reason).await?;
    Ok(Json(TaskResponse::from(task)))
}

async fn escalate_task(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<TaskResponse>> {
    let task = state.queue.escalate(id).await?;
    Ok(Json(TaskResponse::from(task)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_response_carries_status_as_str() {
        let task = Task::new("t", "d", TaskType::Code);
        let resp: TaskResponse = task.into();
        assert_eq!(resp.status, "pending");
    }
}
