//! File Lock Manager: per-file exclusive locks with TTL, tied to a task.
//!
//! A thin service over `FileLockRepository` — the actual exclusivity
//! guarantee is enforced at the store layer (a unique constraint on
//! `file_path` for non-expired rows), since admission must be atomic with
//! the task-assignment transaction (see `TaskQueueService::assign`).

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::models::FileLock;
use crate::domain::ports::{FileLockRepository, OrchestratorResult};

#[derive(Clone)]
pub struct FileLockManager {
    repo: Arc<dyn FileLockRepository>,
}

impl FileLockManager {
    pub fn new(repo: Arc<dyn FileLockRepository>) -> Self {
        Self { repo }
    }

    /// True if any of `candidate_files` is currently locked.
    pub async fn conflicts(&self, candidate_files: &[String]) -> OrchestratorResult<bool> {
        if candidate_files.is_empty() {
            return Ok(false);
        }
        let locked = self.repo.locked_paths().await?;
        Ok(candidate_files.iter().any(|f| locked.contains(f)))
    }

    pub fn build_locks(files: &[String], agent_id: Uuid, task_id: Uuid) -> Vec<FileLock> {
        files.iter().map(|f| FileLock::new(f.clone(), agent_id, task_id)).collect()
    }

    pub async fn release_for_task(&self, task_id: Uuid) -> OrchestratorResult<()> {
        self.repo.release_for_task(task_id).await
    }

    /// Sweep expired locks (TTL elapsed); returns the released locks so
    /// the caller can log/emit events for them.
    pub async fn release_expired(&self) -> OrchestratorResult<Vec<FileLock>> {
        self.repo.release_expired(Utc::now()).await
    }
}
