//! Store Gateway ports: typed CRUD over persisted entities.
//!
//! Concrete implementations live under `adapters::sqlite`. Every mutating
//! operation that must be atomic with other row changes (see the Lifecycle
//! transitions in `services::task_queue_service`) is expressed as a single
//! method here so the adapter can wrap it in one transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::errors::OrchestratorResult;
use crate::domain::models::{
    Agent, BudgetHistoryEntry, BudgetState, ExecutionLog, FileLock, Mission, Task, TaskStatus,
};

/// Filter criteria for listing tasks.
#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub status: Option<TaskStatus>,
    pub parent_task_id: Option<Uuid>,
    pub required_agent: Option<String>,
}

#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, task: &Task) -> OrchestratorResult<()>;
    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Task>>;
    async fn list(&self, filter: TaskFilter) -> OrchestratorResult<Vec<Task>>;
    async fn delete(&self, id: Uuid) -> OrchestratorResult<()>;

    /// Candidates for `assign`, ordered priority DESC, created_at ASC.
    async fn list_pending_ordered(&self) -> OrchestratorResult<Vec<Task>>;

    /// Tasks in `{assigned, in_progress}` with `assigned_at` older than the
    /// cutoff, for the Stuck-Task sweep.
    async fn list_stuck(&self, cutoff: DateTime<Utc>) -> OrchestratorResult<Vec<Task>>;

    /// Atomically assign `task_id` to `agent_id`, acquire the given file
    /// locks, and mark the agent busy. Fails with `Conflict` if the task's
    /// `version` no longer matches (optimistic concurrency) or any lock is
    /// already held.
    async fn commit_assignment(
        &self,
        task: &Task,
        agent: &Agent,
        locks: &[FileLock],
    ) -> OrchestratorResult<()>;

    /// Atomically persist a terminal/failure/abort transition: task row,
    /// agent row (if released), released file locks, and an execution log
    /// entry when one is supplied.
    async fn commit_terminal_transition(
        &self,
        task: &Task,
        agent: Option<&Agent>,
        release_file_paths: &[String],
        log_entry: Option<&ExecutionLog>,
    ) -> OrchestratorResult<()>;

    async fn update(&self, task: &Task) -> OrchestratorResult<()>;
}

#[async_trait]
pub trait AgentRepository: Send + Sync {
    async fn create(&self, agent: &Agent) -> OrchestratorResult<()>;
    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Agent>>;
    async fn list(&self) -> OrchestratorResult<Vec<Agent>>;
    async fn list_by_type(&self, agent_type: &str) -> OrchestratorResult<Vec<Agent>>;
    async fn update(&self, agent: &Agent) -> OrchestratorResult<()>;
    async fn delete(&self, id: Uuid) -> OrchestratorResult<()>;
}

#[async_trait]
pub trait FileLockRepository: Send + Sync {
    async fn acquire_all(&self, locks: &[FileLock]) -> OrchestratorResult<bool>;
    async fn release_for_task(&self, task_id: Uuid) -> OrchestratorResult<()>;
    async fn release_expired(&self, now: DateTime<Utc>) -> OrchestratorResult<Vec<FileLock>>;
    async fn locked_paths(&self) -> OrchestratorResult<Vec<String>>;
}

#[async_trait]
pub trait ExecutionLogRepository: Send + Sync {
    async fn append(&self, entry: &ExecutionLog) -> OrchestratorResult<()>;
    async fn list_for_task(&self, task_id: Uuid) -> OrchestratorResult<Vec<ExecutionLog>>;
    async fn list_all(&self) -> OrchestratorResult<Vec<ExecutionLog>>;
}

#[async_trait]
pub trait MissionRepository: Send + Sync {
    async fn create(&self, mission: &Mission) -> OrchestratorResult<()>;
    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Mission>>;
    async fn list(&self) -> OrchestratorResult<Vec<Mission>>;
    async fn update(&self, mission: &Mission) -> OrchestratorResult<()>;
}

#[async_trait]
pub trait BudgetRepository: Send + Sync {
    async fn load(&self) -> OrchestratorResult<Option<BudgetState>>;
    async fn save(&self, state: &BudgetState) -> OrchestratorResult<()>;
    async fn archive_day(&self, entry: &BudgetHistoryEntry) -> OrchestratorResult<()>;
    async fn history(&self, days: u32) -> OrchestratorResult<Vec<BudgetHistoryEntry>>;
}
