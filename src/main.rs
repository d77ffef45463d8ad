//! Composition root: load configuration, wire every adapter and service,
//! and serve the HTTP/WebSocket façade until shutdown.

use std::sync::Arc;
use std::time::Duration;

use taskforge::adapters::agent_runtime_http::HttpAgentRuntime;
use taskforge::adapters::pubsub::{HttpBridgeEventSink, NoopEventSink};
use taskforge::adapters::sqlite::{
    DatabasePool, SqliteAgentRepository, SqliteBudgetRepository, SqliteExecutionLogRepository,
    SqliteFileLockRepository, SqliteMissionRepository, SqliteTaskRepository,
};
use taskforge::api;
use taskforge::domain::models::{AppConfig, Tier};
use taskforge::domain::ports::{
    AgentRuntimeClient, ExternalEventSink, MissionDecomposer, SemanticComplexityAssessor,
};
use taskforge::infrastructure::{ConfigLoader, LoggerGuard};
use taskforge::services::{
    AsyncValidationPipeline, BudgetLedger, ChatService, EventBus, FileLockManager,
    MissionOrchestrator, RateGovernor, RateGovernorConfig, RateTable, ResourcePool,
    ShellCommandRunner, StuckTaskRecovery, TaskQueueService, TaskRouter,
};
use tokio_util::sync::CancellationToken;

const MISSION_DRIVER_INTERVAL: Duration = Duration::from_secs(5);
const STARTUP_HEALTH_RETRIES: u8 = 5;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ConfigLoader::load()?;
    let _logger_guard: LoggerGuard = taskforge::infrastructure::logging::init(&config.logging)?;

    tracing::info!(bind_addr = %config.server.bind_addr, "starting taskforge");

    let db = DatabasePool::connect(&config.database.path, config.database.max_connections).await?;
    db.migrate().await?;

    let tasks = Arc::new(SqliteTaskRepository::new(db.clone()));
    let agents = Arc::new(SqliteAgentRepository::new(db.clone()));
    let execution_logs = Arc::new(SqliteExecutionLogRepository::new(db.clone()));
    let missions_repo = Arc::new(SqliteMissionRepository::new(db.clone()));
    let budget_repo = Arc::new(SqliteBudgetRepository::new(db.clone()));
    let file_lock_repo = Arc::new(SqliteFileLockRepository::new(db.clone()));

    let agent_runtime = Arc::new(HttpAgentRuntime::new(
        config.agents_runtime.base_url.clone(),
        Duration::from_secs(config.agents_runtime.execute_timeout_sec),
        Duration::from_secs(config.agents_runtime.health_timeout_sec),
    )?);
    wait_for_agent_runtime(agent_runtime.as_ref()).await;

    let event_sink: Arc<dyn ExternalEventSink> = if config.pubsub.enabled {
        let url = config
            .pubsub
            .url
            .clone()
            .ok_or_else(|| anyhow::anyhow!("pubsub.enabled is true but pubsub.url is unset"))?;
        Arc::new(HttpBridgeEventSink::new(url))
    } else {
        Arc::new(NoopEventSink)
    };
    let events = EventBus::new(Some(event_sink));

    let resources = ResourcePool::new(events.clone());
    let rate_governor = RateGovernor::new(rate_governor_config(&config));
    let budget = BudgetLedger::load(budget_repo, events.clone(), config.budget.clone()).await?;
    let file_locks = FileLockManager::new(file_lock_repo);

    let semantic_assessor: Arc<dyn SemanticComplexityAssessor> = agent_runtime.clone();
    let router = Arc::new(TaskRouter::new(Some(semantic_assessor)));
    let rate_table = RateTable::from_config(&config.pricing);
    let agent_runtime_client: Arc<dyn AgentRuntimeClient> = agent_runtime.clone();

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
        agent_runtime_client,
        rate_table.clone(),
        config.cooling.clone(),
        config.review.auto_code_review,
    ));

    let decomposer: Arc<dyn MissionDecomposer> = agent_runtime.clone();
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
        config.validation.clone(),
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
        config.stuck_task.clone(),
    ));

    let cancel = CancellationToken::new();

    let state = api::state::AppState {
        tasks,
        agents,
        execution_logs,
        missions: missions_repo,
        queue,
        mission_orchestrator: mission_orchestrator.clone(),
        validation,
        stuck_recovery: stuck_recovery.clone(),
        chat,
        budget,
        events,
        rate_table,
        config: Arc::new(config.clone()),
        cancel: cancel.clone(),
    };

    {
        let recovery = stuck_recovery.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            recovery.run(cancel).await;
            tracing::info!("stuck-task recovery loop exited");
        });
    }
    {
        let orchestrator = mission_orchestrator.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            orchestrator.run_driver(cancel, MISSION_DRIVER_INTERVAL).await;
        });
    }

    let app = api::build_router(state);
    let listener = tokio::net::TcpListener::bind(&config.server.bind_addr).await?;
    tracing::info!(addr = %config.server.bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    Ok(())
}

/// Wait on SIGINT/SIGTERM, then cancel the root token so the background
/// sweep/driver loops and any in-flight dispatch unwind cleanly.
async fn shutdown_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    tracing::info!("shutdown signal received");
    cancel.cancel();
}

/// Poll the external agent runtime's health endpoint with exponential
/// backoff before accepting traffic, so the first real dispatch doesn't
/// eat the cold-start latency of a runtime still booting alongside us.
/// Logs and proceeds anyway if the runtime never comes up, since starting
/// degraded is preferable to never starting at all.
async fn wait_for_agent_runtime(runtime: &HttpAgentRuntime) {
    let backoff = backoff::ExponentialBackoffBuilder::new()
        .with_initial_interval(Duration::from_millis(200))
        .with_max_interval(Duration::from_secs(5))
        .with_max_elapsed_time(Some(Duration::from_secs(30)))
        .build();

    let attempts = std::cell::Cell::new(0u8);
    let result = backoff::future::retry(backoff, || async {
        attempts.set(attempts.get() + 1);
        runtime.health().await.map_err(|e| {
            if attempts.get() >= STARTUP_HEALTH_RETRIES {
                backoff::Error::permanent(e)
            } else {
                backoff::Error::transient(e)
            }
        })
    })
    .await;

    match result {
        Ok(health) => tracing::info!(?health.local, ?health.cloud, "agent runtime healthy"),
        Err(err) => tracing::warn!(error = %err, "agent runtime did not become healthy before startup; continuing anyway"),
    }
}

fn rate_governor_config(config: &AppConfig) -> RateGovernorConfig {
    let mut limits = std::collections::HashMap::new();
    for (name, tier_limits) in &config.rate_limit.limits {
        let tier = match name.as_str() {
            "local" => Tier::Local,
            "remote_local" => Tier::RemoteLocal,
            "grok" => Tier::Grok,
            "haiku" => Tier::Haiku,
            "sonnet" => Tier::Sonnet,
            "opus" => Tier::Opus,
            other => {
                tracing::warn!(tier = other, "unknown rate_limit tier in config, ignoring");
                continue;
            }
        };
        limits.insert(tier, *tier_limits);
    }
    RateGovernorConfig {
        buffer_factor: config.rate_limit.buffer_factor,
        min_delay: Duration::from_secs_f64(config.rate_limit.min_api_delay_sec),
        limits,
    }
}
