//! SQLite implementation of `FileLockRepository`.
//!
//! Exclusivity is enforced by the `file_locks` table's primary key on
//! `file_path`; `acquire_all` relies on that constraint rather than an
//! application-level check-then-insert race.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;

use crate::domain::models::FileLock;
use crate::domain::ports::{FileLockRepository, OrchestratorError, OrchestratorResult};

use super::pool::DatabasePool;

#[derive(Clone)]
pub struct SqliteFileLockRepository {
    pool: DatabasePool,
}

impl SqliteFileLockRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn row_to_lock(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<FileLock> {
    Ok(FileLock {
        file_path: row.try_get("file_path")?,
        agent_id: parse_uuid(row.try_get("agent_id")?)?,
        task_id: parse_uuid(row.try_get("task_id")?)?,
        acquired_at: parse_ts(row.try_get("acquired_at")?)?,
        expires_at: parse_ts(row.try_get("expires_at")?)?,
    })
}

fn parse_uuid(s: String) -> OrchestratorResult<uuid::Uuid> {
    uuid::Uuid::parse_str(&s).map_err(|e| OrchestratorError::Internal(format!("invalid uuid in row: {e}")))
}

fn parse_ts(s: String) -> OrchestratorResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OrchestratorError::Internal(format!("invalid timestamp in row: {e}")))
}

#[async_trait]
impl FileLockRepository for SqliteFileLockRepository {
    async fn acquire_all(&self, locks: &[FileLock]) -> OrchestratorResult<bool> {
        let mut tx = self.pool.sqlite_pool().begin().await?;
        for lock in locks {
            let result = sqlx::query(
                "INSERT OR IGNORE INTO file_locks (file_path, agent_id, task_id, acquired_at, expires_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&lock.file_path)
            .bind(lock.agent_id.to_string())
            .bind(lock.task_id.to_string())
            .bind(lock.acquired_at.to_rfc3339())
            .bind(lock.expires_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Ok(false);
            }
        }
        tx.commit().await?;
        Ok(true)
    }

    async fn release_for_task(&self, task_id: uuid::Uuid) -> OrchestratorResult<()> {
        sqlx::query("DELETE FROM file_locks WHERE task_id = ?")
            .bind(task_id.to_string())
            .execute(self.pool.sqlite_pool())
            .await?;
        Ok(())
    }

    async fn release_expired(&self, now: DateTime<Utc>) -> OrchestratorResult<Vec<FileLock>> {
        let rows = sqlx::query("SELECT * FROM file_locks WHERE expires_at <= ?")
            .bind(now.to_rfc3339())
            .fetch_all(self.pool.sqlite_pool())
            .await?;
        let expired: Vec<FileLock> = rows.iter().map(row_to_lock).collect::<OrchestratorResult<_>>()?;
        sqlx::query("DELETE FROM file_locks WHERE expires_at <= ?")
            .bind(now.to_rfc3339())
            .execute(self.pool.sqlite_pool())
            .await?;
        Ok(expired)
    }

    async fn locked_paths(&self) -> OrchestratorResult<Vec<String>> {
        let rows = sqlx::query("SELECT file_path FROM file_locks")
            .fetch_all(self.pool.sqlite_pool())
            .await?;
        rows.iter().map(|r| r.try_get::<String, _>("file_path").map_err(OrchestratorError::from)).collect()
    }
}
