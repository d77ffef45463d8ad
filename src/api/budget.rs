//! Budget status and policy endpoints.

use axum::extract::{Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::domain::models::{BudgetConfig, BudgetHistoryEntry, BudgetState};

#[derive(Debug, Serialize)]
pub struct CloudBlockedResponse {
    pub blocked: bool,
}

#[derive(Debug, Deserialize)]
pub struct HistoryQueryParams {
    #[serde(default = "default_history_days")]
    pub days: u32,
}

fn default_history_days() -> u32 {
    30
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/budget", get(get_status).put(set_config))
        .route("/api/v1/budget/history", get(get_history))
        .route("/api/v1/budget/reset", post(reset_daily))
        .route("/api/v1/budget/cloud-blocked", get(cloud_blocked))
}

async fn get_status(State(state): State<AppState>) -> Json<BudgetState> {
    Json(state.budget.get_status().await)
}

async fn cloud_blocked(State(state): State<AppState>) -> Json<CloudBlockedResponse> {
    Json(CloudBlockedResponse { blocked: state.budget.is_cloud_blocked().await })
}

async fn set_config(
    State(state): State<AppState>,
    Json(config): Json<BudgetConfig>,
) -> ApiResult<Json<BudgetConfig>> {
    state.budget.set_config(config.clone()).await?;
    Ok(Json(config))
}

async fn get_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryQueryParams>,
) -> ApiResult<Json<Vec<BudgetHistoryEntry>>> {
    let history = state.budget.get_history(params.days).await?;
    Ok(Json(history))
}

async fn reset_daily(State(state): State<AppState>) -> ApiResult<Json<BudgetState>> {
    state.budget.reset_daily().await?;
    Ok(Json(state.budget.get_status().await))
}
