//! Async Validation Pipeline: runs a task's `validation_command` out of
//! band from task completion, so a slow test suite never blocks the queue.

use std::collections::VecDeque;
use std::sync::Arc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::models::{Task, ValidationConfig};
use crate::domain::ports::{OrchestratorResult, TaskRepository};
use crate::services::event_bus::EventBus;
use crate::services::task_queue_service::TaskQueueService;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    Pending,
    Running,
    Passed,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationRecord {
    pub task_id: Uuid,
    pub command: String,
    pub state: ValidationState,
    pub attempts: u32,
    pub last_output: Option<String>,
}

/// Snapshot returned by `getStatus`: how many validations are still queued
/// versus how many have reached a terminal state since the last `clear`.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationStatus {
    pub pending: usize,
    pub passed: usize,
    pub failed: usize,
}

/// Runs shell validation commands for completed tasks and retries failures
/// up to a small bound before giving up and escalating.
pub trait CommandRunner: Send + Sync {
    fn run(&self, command: &str) -> OrchestratorResult<(bool, String)>;
}

/// Default runner: executes the command through a shell. Kept behind the
/// `CommandRunner` trait so tests can substitute a fake without touching
/// the host filesystem.
pub struct ShellCommandRunner;

impl CommandRunner for ShellCommandRunner {
    fn run(&self, command: &str) -> OrchestratorResult<(bool, String)> {
        let output = std::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .output()
            .map_err(|e| crate::domain::ports::OrchestratorError::Internal(e.to_string()))?;
        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        Ok((output.status.success(), combined))
    }
}

const MAX_VALIDATION_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF_MS: u64 = 500;

pub struct AsyncValidationPipeline {
    tasks: Arc<dyn TaskRepository>,
    queue: Arc<TaskQueueService>,
    events: EventBus,
    runner: Arc<dyn CommandRunner>,
    config: ValidationConfig,
    records: Arc<Mutex<VecDeque<ValidationRecord>>>,
    /// Records that reached a terminal state, kept until `clear_results`.
    results: Arc<Mutex<Vec<ValidationRecord>>>,
}

impl AsyncValidationPipeline {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        queue: Arc<TaskQueueService>,
        events: EventBus,
        runner: Arc<dyn CommandRunner>,
        config: ValidationConfig,
    ) -> Self {
        Self {
            tasks,
            queue,
            events,
            runner,
            config,
            records: Arc::new(Mutex::new(VecDeque::new())),
            results: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Enqueue `task_id` for validation if it carries a `validation_command`
    /// and validation is enabled. No-op otherwise.
    pub async fn enqueue(&self, task: &Task) {
        if !self.config.enabled {
            return;
        }
        let Some(command) = task.validation_command.clone() else { return };
        let mut records = self.records.lock().await;
        records.push_back(ValidationRecord {
            task_id: task.id,
            command,
            state: ValidationState::Pending,
            attempts: 0,
            last_output: None,
        });
    }

    /// Drain and run every pending validation once. Failures are retried up
    /// to `MAX_VALIDATION_ATTEMPTS` with a fixed backoff; permanent failures
    /// escalate the task to `needs_human` rather than silently dropping it.
    pub async fn drain(&self) -> OrchestratorResult<Vec<ValidationRecord>> {
        let pending: Vec<ValidationRecord> = {
            let mut records = self.records.lock().await;
            records.drain(..).collect()
        };

        let mut results = Vec::with_capacity(pending.len());
        for mut record in pending {
            record.state = ValidationState::Running;
            record.attempts += 1;

            match self.runner.run(&record.command) {
                Ok((true, output)) => {
                    record.state = ValidationState::Passed;
                    record.last_output = Some(output);
                    info!(task_id = %record.task_id, "validation passed");
                }
                Ok((false, output)) => {
                    record.last_output = Some(output);
                    if record.attempts < MAX_VALIDATION_ATTEMPTS {
                        record.state = ValidationState::Pending;
                        warn!(task_id = %record.task_id, attempt = record.attempts, "validation failed, will retry");
                        tokio::time::sleep(Duration::from_millis(RETRY_BACKOFF_MS)).await;
                        let mut records = self.records.lock().await;
                        records.push_back(record.clone());
                    } else {
                        record.state = ValidationState::Failed;
                        warn!(task_id = %record.task_id, "validation exhausted retries, escalating task");
                        let _ = self.queue.escalate(record.task_id).await;
                        self.events
                            .publish_alert(format!("task {} failed validation", record.task_id), "error")
                            .await;
                    }
                }
                Err(err) => {
                    record.state = ValidationState::Failed;
                    record.last_output = Some(err.to_string());
                    warn!(task_id = %record.task_id, error = %err, "validation command errored");
                }
            }
            if matches!(record.state, ValidationState::Passed | ValidationState::Failed) {
                self.results.lock().await.push(record.clone());
            }
            results.push(record);
        }
        Ok(results)
    }

    pub async fn get_task(&self, task_id: Uuid) -> OrchestratorResult<Option<Task>> {
        self.tasks.get(task_id).await
    }

    /// `getStatus`: how many validations are still queued plus a running
    /// tally of terminal outcomes recorded since the last `clearResults`.
    pub async fn get_status(&self) -> ValidationStatus {
        let pending = self.records.lock().await.len();
        let results = self.results.lock().await;
        let passed = results.iter().filter(|r| r.state == ValidationState::Passed).count();
        let failed = results.iter().filter(|r| r.state == ValidationState::Failed).count();
        ValidationStatus { pending, passed, failed }
    }

    /// `getResult`-style bulk accessor: every terminal record since the
    /// last `clearResults`.
    pub async fn get_results(&self) -> Vec<ValidationRecord> {
        self.results.lock().await.clone()
    }

    /// Just the terminal records that needed at least one retry attempt.
    pub async fn get_retry_results(&self) -> Vec<ValidationRecord> {
        self.results.lock().await.iter().filter(|r| r.attempts > 1).cloned().collect()
    }

    /// `clearResults`: drop the terminal-result history. Does not touch
    /// whatever is still queued for validation.
    pub async fn clear_results(&self) {
        self.results.lock().await.clear();
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
    use crate::domain::models::{AgentType, BudgetConfig, CoolingConfig, TaskType};
    use crate::domain::ports::{AgentRepository, AgentRuntimeClient, BudgetRepository, FileLockRepository};
    use crate::services::budget_ledger::BudgetLedger;
    use crate::services::cost_calculator::RateTable;
    use crate::services::file_lock_manager::FileLockManager;
    use crate::services::rate_governor::RateGovernor;
    use crate::services::resource_pool::ResourcePool;
    use crate::services::task_router::TaskRouter;

    struct FakeRunner(bool);
    impl CommandRunner for FakeRunner {
        fn run(&self, _command: &str) -> OrchestratorResult<(bool, String)> {
            Ok((self.0, "output".to_string()))
        }
    }

    async fn build(runner: Arc<dyn CommandRunner>) -> (AsyncValidationPipeline, Arc<dyn TaskRepository>) {
        let pool = DatabasePool::connect_in_memory().await.unwrap();
        pool.migrate().await.unwrap();
        let tasks: Arc<dyn TaskRepository> = Arc::new(SqliteTaskRepository::new(pool.clone()));
        let agents: Arc<dyn AgentRepository> = Arc::new(SqliteAgentRepository::new(pool.clone()));
        let logs = Arc::new(SqliteExecutionLogRepository::new(pool.clone()));
        let locks: Arc<dyn FileLockRepository> = Arc::new(SqliteFileLockRepository::new(pool.clone()));
        let budget_repo: Arc<dyn BudgetRepository> = Arc::new(SqliteBudgetRepository::new(pool.clone()));
        let events = EventBus::new_for_test();
        let budget = BudgetLedger::load(budget_repo, events.clone(), BudgetConfig::default()).await.unwrap();
        let runtime: Arc<dyn AgentRuntimeClient> = Arc::new(StaticAgentRuntime::success(serde_json::json!({}), 1, 1, 1));
        let queue = Arc::new(TaskQueueService::new(
            tasks.clone(),
            agents,
            logs,
            FileLockManager::new(locks),
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
        let pipeline = AsyncValidationPipeline::new(
            tasks.clone(),
            queue,
            events,
            runner,
            ValidationConfig { enabled: true },
        );
        (pipeline, tasks)
    }

    #[tokio::test]
    async fn passing_validation_is_recorded() {
        let (pipeline, tasks) = build(Arc::new(FakeRunner(true))).await;
        let task = Task::new("t", "d", TaskType::Code).with_validation_command("true");
        tasks.create(&task).await.unwrap();
        pipeline.enqueue(&task).await;
        let results = pipeline.drain().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].state, ValidationState::Passed);
    }

    #[tokio::test]
    async fn task_without_validation_command_is_not_enqueued() {
        let (pipeline, tasks) = build(Arc::new(FakeRunner(true))).await;
        let task = Task::new("t", "d", TaskType::Code);
        tasks.create(&task).await.unwrap();
        pipeline.enqueue(&task).await;
        let results = pipeline.drain().await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn failing_validation_escalates_after_max_attempts() {
        let (pipeline, tasks) = build(Arc::new(FakeRunner(false))).await;
        let task = Task::new("t", "d", TaskType::Code).with_validation_command("false");
        tasks.create(&task).await.unwrap();
        pipeline.enqueue(&task).await;

        let mut last = Vec::new();
        for _ in 0..MAX_VALIDATION_ATTEMPTS {
            last = pipeline.drain().await.unwrap();
        }
        assert_eq!(last.last().unwrap().state, ValidationState::Failed);
        assert_eq!(last.last().unwrap().attempts, MAX_VALIDATION_ATTEMPTS);
    }
}
