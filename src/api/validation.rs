//! Manual entry points into the async validation pipeline.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::domain::ports::OrchestratorError;
use crate::services::async_validation::{ValidationRecord, ValidationState, ValidationStatus};

#[derive(Debug, Serialize)]
pub struct ValidationRecordResponse {
    pub task_id: Uuid,
    pub command: String,
    pub state: String,
    pub attempts: u32,
    pub last_output: Option<String>,
}

impl From<ValidationRecord> for ValidationRecordResponse {
    fn from(r: ValidationRecord) -> Self {
        let state = match r.state {
            ValidationState::Pending => "pending",
            ValidationState::Running => "running",
            ValidationState::Passed => "passed",
            ValidationState::Failed => "failed",
        };
        Self {
            task_id: r.task_id,
            command: r.command,
            state: state.to_string(),
            attempts: r.attempts,
            last_output: r.last_output,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/validation/tasks/:id/enqueue", post(enqueue_task))
        .route("/api/v1/validation/drain", post(drain))
        .route("/api/v1/validation/status", get(status))
        .route("/api/v1/validation/results", get(results))
        .route("/api/v1/validation/retry-results", get(retry_results))
        .route("/api/v1/validation/retry", post(retry))
        .route("/api/v1/validation/clear", post(clear))
}

async fn enqueue_task(
    State(state): State<AppState>,
    axum::extract::Path(id): axum::extract::Path<Uuid>,
) -> ApiResult<()> {
    let task = state.tasks.get(id).await?.ok_or(OrchestratorError::NotFound("task", id))?;
    state.validation.enqueue(&task).await;
    Ok(())
}

async fn drain(State(state): State<AppState>) -> ApiResult<Json<Vec<ValidationRecordResponse>>> {
    let records = state.validation.drain().await?;
    Ok(Json(records.into_iter().map(ValidationRecordResponse::from).collect()))
}

async fn status(State(state): State<AppState>) -> Json<ValidationStatus> {
    Json(state.validation.get_status().await)
}

async fn results(State(state): State<AppState>) -> Json<Vec<ValidationRecordResponse>> {
    let records = state.validation.get_results().await;
    Json(records.into_iter().map(ValidationRecordResponse::from).collect())
}

async fn retry_results(State(state): State<AppState>) -> Json<Vec<ValidationRecordResponse>> {
    let records = state.validation.get_retry_results().await;
    Json(records.into_iter().map(ValidationRecordResponse::from).collect())
}

/// `startRetryQueue()`: non-blocking — kicks the pending queue's drain in
/// the background and returns immediately; callers poll `getStatus`.
async fn retry(State(state): State<AppState>) -> StatusCode {
    let validation = state.validation.clone();
    tokio::spawn(async move {
        if let Err(err) = validation.drain().await {
            tracing::warn!(error = %err, "background validation retry drain failed");
        }
    });
    StatusCode::ACCEPTED
}

async fn clear(State(state): State<AppState>) -> StatusCode {
    state.validation.clear_results().await;
    StatusCode::NO_CONTENT
}
