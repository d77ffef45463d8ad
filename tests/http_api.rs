//! End-to-end exercises of the HTTP façade, driven through the axum router
//! with `tower::ServiceExt::oneshot` against an in-memory sqlite backend.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use taskforge::adapters::agent_runtime_http::StaticAgentRuntime;
use taskforge::adapters::sqlite::{
    DatabasePool, SqliteAgentRepository, SqliteBudgetRepository, SqliteExecutionLogRepository,
    SqliteFileLockRepository, SqliteMissionRepository, SqliteTaskRepository,
};
use taskforge::api::{self, AppState};
use taskforge::domain::models::{AppConfig, CoolingConfig, SubtaskSpec, TaskType};
use taskforge::domain::ports::{
    AgentRuntimeClient, BudgetRepository, FileLockRepository, MissionDecomposer, OrchestratorResult,
};
use taskforge::services::{
    AsyncValidationPipeline, BudgetLedger, ChatService, EventBus, FileLockManager,
    MissionOrchestrator, RateGovernor, RateTable, ResourcePool, ShellCommandRunner,
    StuckTaskRecovery, TaskQueueService, TaskRouter,
};
use tokio_util::sync::CancellationToken;

struct ScriptedDecomposer(Vec<SubtaskSpec>);

#[async_trait]
impl MissionDecomposer for ScriptedDecomposer {
    async fn decompose(&self, _prompt: &str, _language: &str) -> OrchestratorResult<Vec<SubtaskSpec>> {
        Ok(self.0.clone())
    }
}

fn one_shot_spec() -> SubtaskSpec {
    SubtaskSpec {
        title: "scaffold".to_string(),
        description: "set up the project skeleton".to_string(),
        task_type: TaskType::Code,
        required_agent: None,
        depends_on: Vec::new(),
        complexity: Some(2),
        file_paths: vec!["main.py".to_string()],
        acceptance_criteria: Vec::new(),
    }
}

async fn build_state(api_key: Option<&str>) -> AppState {
    let pool = DatabasePool::connect_in_memory().await.unwrap();
    pool.migrate().await.unwrap();

    let tasks = Arc::new(SqliteTaskRepository::new(pool.clone()));
    let agents = Arc::new(SqliteAgentRepository::new(pool.clone()));
    let execution_logs = Arc::new(SqliteExecutionLogRepository::new(pool.clone()));
    let missions_repo = Arc::new(SqliteMissionRepository::new(pool.clone()));
    let budget_repo: Arc<dyn BudgetRepository> = Arc::new(SqliteBudgetRepository::new(pool.clone()));
    let file_lock_repo: Arc<dyn FileLockRepository> = Arc::new(SqliteFileLockRepository::new(pool.clone()));

    let agent_runtime: Arc<dyn AgentRuntimeClient> =
        Arc::new(StaticAgentRuntime::success(json!({"ok": true}), 10, 1, 1));

    let events = EventBus::new_for_test();
    let resources = ResourcePool::new(events.clone());
    let rate_governor = RateGovernor::new(Default::default());
    let budget = BudgetLedger::load(budget_repo, events.clone(), Default::default()).await.unwrap();
    let file_locks = FileLockManager::new(file_lock_repo);

    let router = Arc::new(TaskRouter::new(None));
    let rate_table = RateTable::default_table();

    let queue = Arc::new(TaskQueueService::new(
        tasks.clone(),
        agents.clone(),
        execution_logs.clone(),
        file_locks.clone(),
        resources,
        rate_governor,
        budget.clone(),
        events.clone(),
        router,
        agent_runtime.clone(),
        rate_table.clone(),
        CoolingConfig { rest_ms: 1, extended_rest_ms: 1, reset_every_n: 5 },
        false,
    ));

    let decomposer: Arc<dyn MissionDecomposer> = Arc::new(ScriptedDecomposer(vec![one_shot_spec()]));
    let mission_orchestrator = Arc::new(MissionOrchestrator::new(
        missions_repo.clone(),
        tasks.clone(),
        queue.clone(),
        decomposer,
        events.clone(),
    ));

    let validation = Arc::new(AsyncValidationPipeline::new(
        tasks.clone(),
        queue.clone(),
        events.clone(),
        Arc::new(ShellCommandRunner),
        Default::default(),
    ));

    let chat = Arc::new(ChatService::new(
        agent_runtime.clone(),
        missions_repo.clone(),
        mission_orchestrator.clone(),
        events.clone(),
    ));

    let stuck_recovery = Arc::new(StuckTaskRecovery::new(
        tasks.clone(),
        agents.clone(),
        file_locks,
        queue.clone(),
        events.clone(),
        Default::default(),
    ));

    let mut config = AppConfig::default();
    config.server.api_key = api_key.map(str::to_string);

    AppState {
        tasks,
        agents,
        execution_logs,
        missions: missions_repo,
        queue,
        mission_orchestrator,
        validation,
        stuck_recovery,
        chat,
        budget,
        events,
        rate_table,
        config: Arc::new(config),
        cancel: CancellationToken::new(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), 1024 * 1024).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_endpoint_bypasses_auth() {
    let state = build_state(Some("secret")).await;
    let app = api::build_router(state);

    let resp = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn protected_route_without_api_key_is_unauthorized() {
    let state = build_state(Some("secret")).await;
    let app = api::build_router(state);

    let resp = app
        .oneshot(Request::builder().uri("/api/v1/tasks").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn protected_route_with_wrong_api_key_is_forbidden() {
    let state = build_state(Some("secret")).await;
    let app = api::build_router(state);

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/tasks")
                .header("x-api-key", "wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn create_and_fetch_task_round_trip() {
    let state = build_state(None).await;
    let app = api::build_router(state);

    let create_body = json!({
        "title": "double",
        "description": "write a function that doubles its input",
        "task_type": "code",
    });
    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/tasks")
                .header("content-type", "application/json")
                .body(Body::from(create_body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let created = body_json(resp).await;
    let id = created["id"].as_str().unwrap();

    let resp = app
        .oneshot(Request::builder().uri(format!("/api/v1/tasks/{id}")).body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let fetched = body_json(resp).await;
    assert_eq!(fetched["title"], "double");
    assert_eq!(fetched["status"], "pending");
}

#[tokio::test]
async fn fetching_unknown_task_returns_404_with_error_body() {
    let state = build_state(None).await;
    let app = api::build_router(state);

    let missing_id = uuid::Uuid::new_v4();
    let resp = app
        .oneshot(
            Request::builder()
                .uri(format!("/api/v1/tasks/{missing_id}"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn mission_decompose_then_approve_flow() {
    let state = build_state(None).await;
    let app = api::build_router(state);

    let resp = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/v1/missions")
                .header("content-type", "application/json")
                .body(Body::from(json!({"prompt": "build a calculator", "language": "python"}).to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::CREATED);
    let mission = body_json(resp).await;
    assert_eq!(mission["status"], "awaiting_approval");
    let id = mission["id"].as_str().unwrap();

    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri(format!("/api/v1/missions/{id}/approve"))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let approved = body_json(resp).await;
    assert_eq!(approved["status"], "executing");
}
