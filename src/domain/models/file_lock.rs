//! File lock domain model.
//!
//! Exclusive by `file_path`. Acquired on task assignment when the task's
//! `locked_files` is non-empty; released on any terminal transition, or
//! reclaimed once `expires_at` elapses (default TTL 30 minutes).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default time-to-live for a file lock, independent of the stuck-task
/// sweep interval (see `StuckTaskRecovery`): locks may outlive the sweep
/// and rely on this TTL if a crash orphans them.
pub const DEFAULT_LOCK_TTL: Duration = Duration::minutes(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileLock {
    pub file_path: String,
    pub agent_id: Uuid,
    pub task_id: Uuid,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl FileLock {
    pub fn new(file_path: impl Into<String>, agent_id: Uuid, task_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            file_path: file_path.into(),
            agent_id,
            task_id,
            acquired_at: now,
            expires_at: now + DEFAULT_LOCK_TTL,
        }
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.expires_at = self.acquired_at + ttl;
        self
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_lock_is_not_expired() {
        let lock = FileLock::new("a.py", Uuid::new_v4(), Uuid::new_v4());
        assert!(!lock.is_expired_at(Utc::now()));
    }

    #[test]
    fn lock_expires_after_ttl() {
        let lock = FileLock::new("a.py", Uuid::new_v4(), Uuid::new_v4())
            .with_ttl(Duration::seconds(1));
        assert!(lock.is_expired_at(Utc::now() + Duration::seconds(2)));
    }
}
