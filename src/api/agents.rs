//! Agent CRUD endpoints.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiResult;
use crate::api::state::AppState;
use crate::domain::models::{Agent, AgentConfig, AgentType, ExecutionAction, TierOverride};
use crate::domain::ports::OrchestratorError;

#[derive(Debug, Deserialize)]
pub struct CreateAgentRequest {
    pub name: String,
    pub agent_type: String,
    #[serde(default)]
    pub preferred_tier: Option<String>,
    #[serde(default)]
    pub concurrency_cap: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PatchAgentRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub preferred_tier: Option<String>,
    #[serde(default)]
    pub concurrency_cap: Option<u32>,
    #[serde(default)]
    pub auto_retry: Option<bool>,
    #[serde(default)]
    pub context_budget_tokens: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct AgentStatsResponse {
    pub tasks_completed: usize,
    pub tasks_failed: usize,
    pub tasks_aborted: usize,
    pub total_cost_cents: f64,
}

#[derive(Debug, Serialize)]
pub struct AgentResponse {
    pub id: Uuid,
    pub name: String,
    pub agent_type: String,
    pub status: String,
    pub current_task_id: Option<Uuid>,
    pub inflight: u32,
    pub tasks_completed_since_rest: u32,
}

impl From<Agent> for AgentResponse {
    fn from(a: Agent) -> Self {
        Self {
            id: a.id,
            name: a.name,
            agent_type: a.agent_type.as_str().to_string(),
            status: a.status.as_str().to_string(),
            current_task_id: a.current_task_id,
            inflight: a.inflight,
            tasks_completed_since_rest: a.tasks_completed_since_rest,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/v1/agents", get(list_agents).post(create_agent))
        .route("/api/v1/agents/types", get(list_agent_types))
        .route("/api/v1/agents/reset-all", post(reset_all))
        .route("/api/v1/agents/:id", get(get_agent).patch(patch_agent).delete(delete_agent))
        .route("/api/v1/agents/:id/next-task", post(assign_next_task))
        .route("/api/v1/agents/:id/pause", post(pause_agent))
        .route("/api/v1/agents/:id/resume", post(resume_agent))
        .route("/api/v1/agents/:id/abort", post(abort_agent))
        .route("/api/v1/agents/:id/offline", post(offline_agent))
        .route("/api/v1/agents/:id/online", post(online_agent))
        .route("/api/v1/agents/:id/stats", get(agent_stats))
}

fn parse_tier_override(s: &str) -> Option<TierOverride> {
    match s.to_lowercase().as_str() {
        "auto" => Some(TierOverride::Auto),
        "local" => Some(TierOverride::Local),
        "remote_local" => Some(TierOverride::RemoteLocal),
        "grok" => Some(TierOverride::Grok),
        "haiku" => Some(TierOverride::Haiku),
        "sonnet" => Some(TierOverride::Sonnet),
        "opus" => Some(TierOverride::Opus),
        _ => None,
    }
}

async fn list_agents(State(state): State<AppState>) -> ApiResult<Json<Vec<AgentResponse>>> {
    let agents = state.agents.list().await?;
    Ok(Json(agents.into_iter().map(AgentResponse::from).collect()))
}

async fn create_agent(
    State(state): State<AppState>,
    Json(req): Json<CreateAgentRequest>,
) -> ApiResult<(StatusCode, Json<AgentResponse>)> {
    let agent_type = AgentType::from_str(&req.agent_type)
        .ok_or_else(|| OrchestratorError::InvalidTransition(format!("unknown agent_type: {}", req.agent_type)))?;
    let mut agent = Agent::new(req.name, agent_type);
    if let Some(tier) = req.preferred_tier.as_deref().and_then(parse_tier_override) {
        agent.config.preferred_tier = tier;
    }
    if let Some(cap) = req.concurrency_cap {
        agent.config = AgentConfig { concurrency_cap: cap, ..agent.config };
    }
    state.agents.create(&agent).await?;
    state.events.publish_agent_status_changed(agent.id, agent.status.as_str()).await;
    Ok((StatusCode::CREATED, Json(AgentResponse::from(agent))))
}

async fn get_agent(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<AgentResponse>> {
    let agent = state.agents.get(id).await?.ok_or(OrchestratorError::NotFound("agent", id))?;
    Ok(Json(AgentResponse::from(agent)))
}

async fn delete_agent(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<StatusCode> {
    let agent = state.agents.get(id).await?.ok_or(OrchestratorError::NotFound("agent", id))?;
    if !agent.can_be_deleted() {
        return Err(OrchestratorError::InvalidTransition(format!("agent {id} is not idle")).into());
    }
    state.agents.delete(id).await?;
    state.events.publish_agent_deleted(id).await;
    Ok(StatusCode::NO_CONTENT)
}

async fn assign_next_task(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<Option<crate::api::tasks::TaskResponse>>> {
    let task = state.queue.assign_next_for_agent(id).await?;
    Ok(Json(task.map(crate::api::tasks::TaskResponse::from)))
}

async fn list_agent_types() -> Json<Vec<&'static str>> {
    Json(vec![AgentType::Coder.as_str(), AgentType::Qa.as_str(), AgentType::Cto.as_str()])
}

async fn patch_agent(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PatchAgentRequest>,
) -> ApiResult<Json<AgentResponse>> {
    let mut agent = state.agents.get(id).await?.ok_or(OrchestratorError::NotFound("agent", id))?;
    let preferred_tier = req.preferred_tier.as_deref().and_then(parse_tier_override);
    agent.apply_patch(req.name, preferred_tier, req.concurrency_cap, req.auto_retry, req.context_budget_tokens);
    state.agents.update(&agent).await?;
    Ok(Json(AgentResponse::from(agent)))
}

async fn pause_agent(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<AgentResponse>> {
    let mut agent = state.agents.get(id).await?.ok_or(OrchestratorError::NotFound("agent", id))?;
    agent.mark_paused();
    state.agents.update(&agent).await?;
    state.events.publish_agent_status_changed(id, agent.status.as_str()).await;
    Ok(Json(AgentResponse::from(agent)))
}

async fn resume_agent(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<AgentResponse>> {
    let mut agent = state.agents.get(id).await?.ok_or(OrchestratorError::NotFound("agent", id))?;
    agent.mark_resumed();
    state.agents.update(&agent).await?;
    state.events.publish_agent_status_changed(id, agent.status.as_str()).await;
    Ok(Json(AgentResponse::from(agent)))
}

/// Aborts whatever task the agent currently holds (if any), then marks the
/// agent idle. Unlike `offline`, this leaves the agent in rotation.
async fn abort_agent(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<AgentResponse>> {
    let agent = state.agents.get(id).await?.ok_or(OrchestratorError::NotFound("agent", id))?;
    if let Some(task_id) = agent.current_task_id {
        state.queue.abort_task(task_id, "aborted via agent abort").await?;
    }
    let agent = state.agents.get(id).await?.ok_or(OrchestratorError::NotFound("agent", id))?;
    Ok(Json(AgentResponse::from(agent)))
}

async fn offline_agent(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<AgentResponse>> {
    let mut agent = state.agents.get(id).await?.ok_or(OrchestratorError::NotFound("agent", id))?;
    agent.mark_offline();
    state.agents.update(&agent).await?;
    state.events.publish_agent_status_changed(id, agent.status.as_str()).await;
    Ok(Json(AgentResponse::from(agent)))
}

async fn online_agent(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<AgentResponse>> {
    let mut agent = state.agents.get(id).await?.ok_or(OrchestratorError::NotFound("agent", id))?;
    agent.mark_online();
    state.agents.update(&agent).await?;
    state.events.publish_agent_status_changed(id, agent.status.as_str()).await;
    Ok(Json(AgentResponse::from(agent)))
}

async fn reset_all(State(state): State<AppState>) -> ApiResult<Json<Vec<AgentResponse>>> {
    let mut reset = Vec::new();
    for mut agent in state.agents.list().await? {
        agent.mark_online();
        agent.current_task_id = None;
        agent.inflight = 0;
        state.agents.update(&agent).await?;
        state.events.publish_agent_status_changed(agent.id, agent.status.as_str()).await;
        reset.push(AgentResponse::from(agent));
    }
    Ok(Json(reset))
}

async fn agent_stats(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<Json<AgentStatsResponse>> {
    state.agents.get(id).await?.ok_or(OrchestratorError::NotFound("agent", id))?;
    let logs = state.execution_logs.list_all().await?;
    let mut stats = AgentStatsResponse {
        tasks_completed: 0,
        tasks_failed: 0,
        tasks_aborted: 0,
        total_cost_cents: 0.0,
    };
    for log in logs.iter().filter(|l| l.agent_id == id) {
        match log.action {
            ExecutionAction::Completed => stats.tasks_completed += 1,
            ExecutionAction::Failed => stats.tasks_failed += 1,
            ExecutionAction::Aborted => stats.tasks_aborted += 1,
            ExecutionAction::Started => {}
        }
        stats.total_cost_cents += crate::services::cost_calculator::cost_cents(log, &state.rate_table);
    }
    Ok(Json(stats))
}
