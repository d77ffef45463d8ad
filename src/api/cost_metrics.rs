//! Aggregate cost reporting over execution logs.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::domain::models::ExecutionLog;
use crate::services::cost_calculator::{aggregate, cost_cents, CostSummary};

#[derive(Debug, Deserialize)]
pub struct CostQueryParams {
    #[serde(default)]
    pub task_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct TimelineQueryParams {
    #[serde(default = "default_timeline_hours")]
    pub hours: i64,
}

fn default_timeline_hours() -> i64 {
    24
}

#[derive(Debug, Default, Serialize)]
pub struct ByAgentSummary {
    pub by_agent: HashMap<String, f64>,
}

#[derive(Debug, Default, Serialize)]
pub struct ByTaskTypeSummary {
    pub by_task_type: HashMap<String, f64>,
}

#[derive(Debug, Serialize)]
pub struct TimelineBucket {
    pub hour: String,
    pub cents: f64,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/costs", get(get_cost_summary))
        .route("/api/v1/costs/tasks/:id", get(get_task_execution_logs))
        .route("/api/v1/cost-metrics/summary", get(get_cost_summary))
        .route("/api/v1/cost-metrics/by-agent", get(get_by_agent))
        .route("/api/v1/cost-metrics/by-task-type", get(get_by_task_type))
        .route("/api/v1/cost-metrics/timeline", get(get_timeline))
}

async fn get_cost_summary(
    State(state): State<AppState>,
    Query(params): Query<CostQueryParams>,
) -> ApiResult<Json<CostSummary>> {
    let logs = match params.task_id {
        Some(task_id) => state.execution_logs.list_for_task(task_id).await?,
        None => state.execution_logs.list_all().await?,
    };
    Ok(Json(aggregate(&logs, &state.rate_table)))
}

async fn get_task_execution_logs(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Vec<ExecutionLog>>> {
    let logs = state.execution_logs.list_for_task(id).await?;
    Ok(Json(logs))
}

async fn get_by_agent(State(state): State<AppState>) -> ApiResult<Json<ByAgentSummary>> {
    let logs = state.execution_logs.list_all().await?;
    let mut by_agent = HashMap::new();
    for log in &logs {
        let cost = cost_cents(log, &state.rate_table);
        *by_agent.entry(log.agent_id.to_string()).or_insert(0.0) += cost;
    }
    Ok(Json(ByAgentSummary { by_agent }))
}

/// Groups cost by the originating task's `task_type`. A log whose task has
/// since been deleted is skipped rather than counted under an unknown type.
async fn get_by_task_type(State(state): State<AppState>) -> ApiResult<Json<ByTaskTypeSummary>> {
    let logs = state.execution_logs.list_all().await?;
    let mut by_task_type = HashMap::new();
    for log in &logs {
        let Some(task) = state.tasks.get(log.task_id).await? else { continue };
        let cost = cost_cents(log, &state.rate_table);
        *by_task_type.entry(task.task_type.as_str().to_string()).or_insert(0.0) += cost;
    }
    Ok(Json(ByTaskTypeSummary { by_task_type }))
}

async fn get_timeline(
    State(state): State<AppState>,
    Query(params): Query<TimelineQueryParams>,
) -> ApiResult<Json<Vec<TimelineBucket>>> {
    let cutoff = chrono::Utc::now() - chrono::Duration::hours(params.hours.max(1));
    let logs = state.execution_logs.list_all().await?;
    let mut buckets: HashMap<String, f64> = HashMap::new();
    for log in &logs {
        if log.timestamp < cutoff {
            continue;
        }
        let hour = log.timestamp.format("%Y-%m-%dT%H:00:00Z").to_string();
        *buckets.entry(hour).or_insert(0.0) += cost_cents(log, &state.rate_table);
    }
    let mut timeline: Vec<TimelineBucket> = buckets.into_iter().map(|(hour, cents)| TimelineBucket { hour, cents }).collect();
    timeline.sort_by(|a, b| a.hour.cmp(&b.hour));
    Ok(Json(timeline))
}
