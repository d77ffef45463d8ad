//! SQLite implementation of `ExecutionLogRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::models::{ExecutionAction, ExecutionLog};
use crate::domain::ports::{ExecutionLogRepository, OrchestratorError, OrchestratorResult};

use super::pool::DatabasePool;

#[derive(Clone)]
pub struct SqliteExecutionLogRepository {
    pool: DatabasePool,
}

impl SqliteExecutionLogRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn row_to_log(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<ExecutionLog> {
    let action = match row.try_get::<String, _>("action")?.as_str() {
        "started" => ExecutionAction::Started,
        "completed" => ExecutionAction::Completed,
        "failed" => ExecutionAction::Failed,
        "aborted" => ExecutionAction::Aborted,
        other => return Err(OrchestratorError::Internal(format!("invalid execution action in row: {other}"))),
    };
    Ok(ExecutionLog {
        id: parse_uuid(row.try_get("id")?)?,
        task_id: parse_uuid(row.try_get("task_id")?)?,
        agent_id: parse_uuid(row.try_get("agent_id")?)?,
        timestamp: parse_ts(row.try_get("timestamp")?)?,
        action,
        model_used: row.try_get("model_used")?,
        input_tokens: row.try_get::<i64, _>("input_tokens")? as u64,
        output_tokens: row.try_get::<i64, _>("output_tokens")? as u64,
        duration_ms: row.try_get("duration_ms")?,
    })
}

fn parse_uuid(s: String) -> OrchestratorResult<Uuid> {
    Uuid::parse_str(&s).map_err(|e| OrchestratorError::Internal(format!("invalid uuid in row: {e}")))
}

fn parse_ts(s: String) -> OrchestratorResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OrchestratorError::Internal(format!("invalid timestamp in row: {e}")))
}

#[async_trait]
impl ExecutionLogRepository for SqliteExecutionLogRepository {
    async fn append(&self, entry: &ExecutionLog) -> OrchestratorResult<()> {
        sqlx::query(
            r#"INSERT INTO execution_logs (id, task_id, agent_id, timestamp, action, model_used, input_tokens, output_tokens, duration_ms)
               VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(entry.id.to_string())
        .bind(entry.task_id.to_string())
        .bind(entry.agent_id.to_string())
        .bind(entry.timestamp.to_rfc3339())
        .bind(entry.action.as_str())
        .bind(&entry.model_used)
        .bind(entry.input_tokens as i64)
        .bind(entry.output_tokens as i64)
        .bind(entry.duration_ms)
        .execute(self.pool.sqlite_pool())
        .await?;
        Ok(())
    }

    async fn list_for_task(&self, task_id: Uuid) -> OrchestratorResult<Vec<ExecutionLog>> {
        let rows = sqlx::query("SELECT * FROM execution_logs WHERE task_id = ? ORDER BY timestamp ASC")
            .bind(task_id.to_string())
            .fetch_all(self.pool.sqlite_pool())
            .await?;
        rows.iter().map(row_to_log).collect()
    }

    async fn list_all(&self) -> OrchestratorResult<Vec<ExecutionLog>> {
        let rows = sqlx::query("SELECT * FROM execution_logs ORDER BY timestamp ASC")
            .fetch_all(self.pool.sqlite_pool())
            .await?;
        rows.iter().map(row_to_log).collect()
    }
}
