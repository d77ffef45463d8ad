//! Stuck Task Recovery: periodic sweep for tasks and file locks orphaned by
//! a crashed or unresponsive agent process.

use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{StuckTaskConfig, TaskStatus};
use crate::domain::ports::{AgentRepository, OrchestratorResult, TaskRepository};
use crate::services::event_bus::EventBus;
use crate::services::file_lock_manager::FileLockManager;
use crate::services::task_queue_service::TaskQueueService;

pub struct StuckTaskRecovery {
    tasks: Arc<dyn TaskRepository>,
    agents: Arc<dyn AgentRepository>,
    file_locks: FileLockManager,
    queue: Arc<TaskQueueService>,
    events: EventBus,
    config: StuckTaskConfig,
}

impl StuckTaskRecovery {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        agents: Arc<dyn AgentRepository>,
        file_locks: FileLockManager,
        queue: Arc<TaskQueueService>,
        events: EventBus,
        config: StuckTaskConfig,
    ) -> Self {
        Self { tasks, agents, file_locks, queue, events, config }
    }

    /// One sweep pass: find `{assigned, in_progress}` tasks whose
    /// `assigned_at` predates the configured timeout and force them
    /// terminal (`aborted`, reason "timed out"), releasing resources and
    /// file locks. Whether an aborted task gets re-queued is a retry-path
    /// decision, not this sweeper's — it leaves the task `aborted`. Also
    /// sweeps independently-expired locks, since a lock's TTL and the
    /// stuck-task timeout are different knobs.
    pub async fn sweep(&self) -> OrchestratorResult<Vec<Uuid>> {
        let cutoff = chrono::Utc::now() - chrono::Duration::milliseconds(self.config.timeout_ms);
        let stuck = self.tasks.list_stuck(cutoff).await?;
        let mut recovered = Vec::with_capacity(stuck.len());

        for task in stuck {
            if task.status.is_terminal() {
                continue;
            }
            warn!(task_id = %task.id, "recovering stuck task");
            self.queue.abort_task(task.id, "timed out").await?;
            self.events.publish_alert(
                format!("task {} recovered after exceeding stuck-task timeout", task.id),
                "warning",
            ).await;
            recovered.push(task.id);
        }

        let expired_locks = self.file_locks.release_expired().await?;
        if !expired_locks.is_empty() {
            info!(count = expired_locks.len(), "released expired file locks");
        }

        Ok(recovered)
    }

    /// Synchronous on-demand check, e.g. from an admin API call, distinct
    /// from the background `run` loop's periodic cadence.
    pub async fn trigger_check(&self) -> OrchestratorResult<Vec<Uuid>> {
        self.sweep().await
    }

    /// Force every non-terminal `{assigned, in_progress, needs_human}` task
    /// back to pending regardless of its age, for operator-triggered
    /// recovery after an agent-runtime outage.
    pub async fn force_recover_all(&self) -> OrchestratorResult<Vec<Uuid>> {
        let all = self.tasks.list(Default::default()).await?;
        let mut recovered = Vec::new();
        for task in all {
            if matches!(task.status, TaskStatus::Assigned | TaskStatus::InProgress | TaskStatus::NeedsHuman) {
                self.queue.abort_task(task.id, "force-recovered by operator").await?;
                self.queue.return_to_pool(task.id).await?;
                recovered.push(task.id);
            }
        }
        let _ = self.agents.list().await?;
        Ok(recovered)
    }

    /// Background loop: sweep on `check_interval_ms`, until cancelled.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.check_interval_ms));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.sweep().await {
                        warn!(error = %err, "stuck-task sweep failed");
                    }
                }
                _ = cancel.cancelled() => {
                    info!("stuck-task recovery loop shutting down");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::agent_runtime_http::StaticAgentRuntime;
    use crate::adapters::sqlite::agent_repo::SqliteAgentRepository;
    use crate::adapters::sqlite::budget_repo::SqliteBudgetRepository;
    use crate::adapters::sqlite::execution_log_repo::SqliteExecutionLogRepository;
    use crate::adapters::sqlite::file_lock_repo::SqliteFileLockRepository;
    use crate::adapters::sqlite::pool::DatabasePool;
    use crate::adapters::sqlite::task_repo::SqliteTaskRepository;
    use crate::domain::models::{Agent, AgentType, BudgetConfig, CoolingConfig, Task, TaskType};
    use crate::domain::ports::{AgentRuntimeClient, BudgetRepository, FileLockRepository};
    use crate::services::budget_ledger::BudgetLedger;
    use crate::services::cost_calculator::RateTable;
    use crate::services::rate_governor::RateGovernor;
    use crate::services::resource_pool::ResourcePool;
    use crate::services::task_router::TaskRouter;

    async fn build() -> (StuckTaskRecovery, Arc<dyn TaskRepository>, Arc<TaskQueueService>, Arc<dyn AgentRepository>) {
        let pool = DatabasePool::connect_in_memory().await.unwrap();
        pool.migrate().await.unwrap();
        let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let agents: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let logs = Arc::new(SqliteExecutionLogRepository::new(pool.clone()));
        let locks: Arc<dyn FileLockRepository> = Arc::new(SqliteFileLockRepository::new(pool.clone()));
        let budget_repo: Arc<dyn BudgetRepository> = Arc::new(SqliteBudgetRepository::new(pool.clone()));
        let events = EventBus::new_for_test();
        let budget = BudgetLedger::load(budget_repo, events.clone(), BudgetConfig::default()).await.unwrap();
        let file_locks = FileLockManager::new(locks);
        let runtime: Arc<dyn AgentRuntimeClient> = Arc::new(StaticAgentRuntime::success(serde_json::json!({}), 1, 1, 1));
        let queue = Arc::new(TaskQueueService::new(
            tasks.clone(),
            agents.clone(),
            logs,
            file_locks.clone(),
            ResourcePool::new(events.clone()),
            RateGovernor::new(Default::default()),
            budget,
            events.clone(),
            Arc::new(TaskRouter::new(None)),
            runtime,
            RateTable::default_table(),
            CoolingConfig { rest_ms: 1, extended_rest_ms: 1, reset_every_n: 5 },
            false,
        ));
        let recovery = StuckTaskRecovery::new(
            tasks.clone(),
            agents.clone(),
            file_locks,
            queue.clone(),
            events,
            StuckTaskConfig { timeout_ms: 0, check_interval_ms: 60_000 },
        );
        (recovery, tasks, queue, agents)
    }

    #[tokio::test]
    async fn sweep_recovers_tasks_past_timeout() {
        let (recovery, tasks, queue, agents) = build().await;
        let agent = Agent::new("a", AgentType::Coder);
        agents.create(&agent).await.unwrap();
        let task = Task::new("t", "d", TaskType::Code);
        queue.create_task(task.clone()).await.unwrap();
        queue.assign_task_to_agent(task.id, agent.id).await.unwrap();

        let recovered = recovery.sweep().await.unwrap();
        assert_eq!(recovered, vec![task.id]);

        let stored = tasks.get(task.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TaskStatus::Aborted);
        assert_eq!(stored.error.as_deref(), Some("timed out"));
    }

    #[tokio::test]
    async fn force_recover_all_resets_non_terminal_tasks() {
        let (recovery, _tasks, queue, agents) = build().await;
        let agent = Agent::new("a", AgentType::Coder);
        agents.create(&agent).await.unwrap();
        let task = Task::new("t", "d", TaskType::Code);
        queue.create_task(task.clone()).await.unwrap();
        queue.assign_task_to_agent(task.id, agent.id).await.unwrap();

        let recovered = recovery.force_recover_all().await.unwrap();
        assert_eq!(recovered, vec![task.id]);
    }
}
