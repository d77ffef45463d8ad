//! SQLite implementation of `TaskRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::models::{
    Agent, ComplexitySource, ExecutionLog, FileLock, Task, TaskStatus, TaskType,
};
use crate::domain::ports::{OrchestratorError, OrchestratorResult, TaskFilter, TaskRepository};

use super::pool::DatabasePool;

#[derive(Clone)]
pub struct SqliteTaskRepository {
    pool: DatabasePool,
}

impl SqliteTaskRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn row_to_task(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<Task> {
    let locked_files: String = row.try_get("locked_files")?;
    let result: Option<String> = row.try_get("result")?;
    Ok(Task {
        id: parse_uuid(row.try_get("id")?)?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        task_type: TaskType::from_str(row.try_get::<String, _>("task_type")?.as_str())
            .ok_or_else(|| OrchestratorError::Internal("invalid task_type in row".to_string()))?,
        priority: row.try_get::<i64, _>("priority")? as u8,
        required_agent: row.try_get("required_agent")?,
        locked_files: serde_json::from_str(&locked_files)?,
        max_iterations: row.try_get::<i64, _>("max_iterations")? as u32,
        current_iteration: row.try_get::<i64, _>("current_iteration")? as u32,
        complexity: row.try_get::<i64, _>("complexity")? as u8,
        complexity_source: ComplexitySource::from_str(row.try_get::<String, _>("complexity_source")?.as_str())
            .ok_or_else(|| OrchestratorError::Internal("invalid complexity_source in row".to_string()))?,
        status: TaskStatus::from_str(row.try_get::<String, _>("status")?.as_str())
            .ok_or_else(|| OrchestratorError::Internal("invalid status in row".to_string()))?,
        assigned_agent_id: row.try_get::<Option<String>, _>("assigned_agent_id")?.map(|s| parse_uuid(s)).transpose()?,
        assigned_at: parse_opt_ts(row.try_get("assigned_at")?)?,
        completed_at: parse_opt_ts(row.try_get("completed_at")?)?,
        time_spent_ms: row.try_get("time_spent_ms")?,
        result: result.map(|s| serde_json::from_str(&s)).transpose()?,
        error: row.try_get("error")?,
        parent_task_id: row.try_get::<Option<String>, _>("parent_task_id")?.map(|s| parse_uuid(s)).transpose()?,
        validation_command: row.try_get("validation_command")?,
        created_at: parse_ts(row.try_get("created_at")?)?,
        updated_at: parse_ts(row.try_get("updated_at")?)?,
        version: row.try_get("version")?,
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

fn parse_opt_ts(s: Option<String>) -> OrchestratorResult<Option<DateTime<Utc>>> {
    s.map(parse_ts).transpose()
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn create(&self, task: &Task) -> OrchestratorResult<()> {
        let locked_files = serde_json::to_string(&task.locked_files)?;
        let result = task.result.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"INSERT INTO tasks (
                id, title, description, task_type, priority, required_agent, locked_files,
                max_iterations, current_iteration, complexity, complexity_source, status,
                assigned_agent_id, assigned_at, completed_at, time_spent_ms, result, error,
                parent_task_id, validation_command, created_at, updated_at, version
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(task.id.to_string())
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.task_type.as_str())
        .bind(task.priority as i64)
        .bind(&task.required_agent)
        .bind(locked_files)
        .bind(task.max_iterations as i64)
        .bind(task.current_iteration as i64)
        .bind(task.complexity as i64)
        .bind(task.complexity_source.as_str())
        .bind(task.status.as_str())
        .bind(task.assigned_agent_id.map(|id| id.to_string()))
        .bind(task.assigned_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.time_spent_ms)
        .bind(result)
        .bind(&task.error)
        .bind(task.parent_task_id.map(|id| id.to_string()))
        .bind(&task.validation_command)
        .bind(task.created_at.to_rfc3339())
        .bind(task.updated_at.to_rfc3339())
        .bind(task.version)
        .execute(self.pool.sqlite_pool())
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Task>> {
        let row = sqlx::query("SELECT * FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool.sqlite_pool())
            .await?;
        row.as_ref().map(row_to_task).transpose()
    }

    async fn list(&self, filter: TaskFilter) -> OrchestratorResult<Vec<Task>> {
        let mut sql = "SELECT * FROM tasks WHERE 1=1".to_string();
        if filter.status.is_some() {
            sql.push_str(" AND status = ?");
        }
        if filter.parent_task_id.is_some() {
            sql.push_str(" AND parent_task_id = ?");
        }
        if filter.required_agent.is_some() {
            sql.push_str(" AND required_agent = ?");
        }
        sql.push_str(" ORDER BY created_at ASC");

        let mut query = sqlx::query(&sql);
        if let Some(status) = filter.status {
            query = query.bind(status.as_str());
        }
        if let Some(parent) = filter.parent_task_id {
            query = query.bind(parent.to_string());
        }
        if let Some(required) = filter.required_agent {
            query = query.bind(required);
        }
        let rows = query.fetch_all(self.pool.sqlite_pool()).await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn delete(&self, id: Uuid) -> OrchestratorResult<()> {
        sqlx::query("DELETE FROM tasks WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool.sqlite_pool())
            .await?;
        Ok(())
    }

    async fn list_pending_ordered(&self) -> OrchestratorResult<Vec<Task>> {
        let rows = sqlx::query("SELECT * FROM tasks WHERE status = 'pending' ORDER BY priority DESC, created_at ASC")
            .fetch_all(self.pool.sqlite_pool())
            .await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn list_stuck(&self, cutoff: DateTime<Utc>) -> OrchestratorResult<Vec<Task>> {
        let rows = sqlx::query(
            "SELECT * FROM tasks WHERE status IN ('assigned', 'in_progress') AND assigned_at IS NOT NULL AND assigned_at < ?",
        )
        .bind(cutoff.to_rfc3339())
        .fetch_all(self.pool.sqlite_pool())
        .await?;
        rows.iter().map(row_to_task).collect()
    }

    async fn commit_assignment(&self, task: &Task, agent: &Agent, locks: &[FileLock]) -> OrchestratorResult<()> {
        let mut tx = self.pool.sqlite_pool().begin().await?;

        let result = sqlx::query(
            r#"UPDATE tasks SET status = ?, assigned_agent_id = ?, assigned_at = ?,
               current_iteration = ?, updated_at = ?, version = ? WHERE id = ? AND version = ?"#,
        )
        .bind(task.status.as_str())
        .bind(task.assigned_agent_id.map(|id| id.to_string()))
        .bind(task.assigned_at.map(|t| t.to_rfc3339()))
        .bind(task.current_iteration as i64)
        .bind(task.updated_at.to_rfc3339())
        .bind(task.version)
        .bind(task.id.to_string())
        .bind(task.version - 1)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(OrchestratorError::Conflict(format!("task {} version mismatch on assignment", task.id)));
        }

        sqlx::query(
            "UPDATE agents SET status = ?, current_task_id = ?, inflight = ?, updated_at = ? WHERE id = ?",
        )
        .bind(agent.status.as_str())
        .bind(agent.current_task_id.map(|id| id.to_string()))
        .bind(agent.inflight as i64)
        .bind(agent.updated_at.to_rfc3339())
        .bind(agent.id.to_string())
        .execute(&mut *tx)
        .await?;

        for lock in locks {
            let inserted = sqlx::query(
                "INSERT OR IGNORE INTO file_locks (file_path, agent_id, task_id, acquired_at, expires_at) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(&lock.file_path)
            .bind(lock.agent_id.to_string())
            .bind(lock.task_id.to_string())
            .bind(lock.acquired_at.to_rfc3339())
            .bind(lock.expires_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
            if inserted.rows_affected() == 0 {
                return Err(OrchestratorError::AdmissionDenied(format!("file lock already held: {}", lock.file_path)));
            }
        }

        tx.commit().await?;
        Ok(())
    }

    async fn commit_terminal_transition(
        &self,
        task: &Task,
        agent: Option<&Agent>,
        release_file_paths: &[String],
        log_entry: Option<&ExecutionLog>,
    ) -> OrchestratorResult<()> {
        let mut tx = self.pool.sqlite_pool().begin().await?;
        let result = task.result.as_ref().map(serde_json::to_string).transpose()?;

        sqlx::query(
            r#"UPDATE tasks SET status = ?, assigned_agent_id = ?, completed_at = ?, time_spent_ms = ?,
               result = ?, error = ?, assigned_at = ?, updated_at = ?, version = ? WHERE id = ?"#,
        )
        .bind(task.status.as_str())
        .bind(task.assigned_agent_id.map(|id| id.to_string()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.time_spent_ms)
        .bind(result)
        .bind(&task.error)
        .bind(task.assigned_at.map(|t| t.to_rfc3339()))
        .bind(task.updated_at.to_rfc3339())
        .bind(task.version)
        .bind(task.id.to_string())
        .execute(&mut *tx)
        .await?;

        if let Some(agent) = agent {
            sqlx::query(
                "UPDATE agents SET status = ?, current_task_id = ?, inflight = ?, updated_at = ? WHERE id = ?",
            )
            .bind(agent.status.as_str())
            .bind(agent.current_task_id.map(|id| id.to_string()))
            .bind(agent.inflight as i64)
            .bind(agent.updated_at.to_rfc3339())
            .bind(agent.id.to_string())
            .execute(&mut *tx)
            .await?;
        }

        for path in release_file_paths {
            sqlx::query("DELETE FROM file_locks WHERE file_path = ? AND task_id = ?")
                .bind(path)
                .bind(task.id.to_string())
                .execute(&mut *tx)
                .await?;
        }

        if let Some(log) = log_entry {
            sqlx::query(
                r#"INSERT INTO execution_logs (id, task_id, agent_id, timestamp, action, model_used, input_tokens, output_tokens, duration_ms)
                   VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
            )
            .bind(log.id.to_string())
            .bind(log.task_id.to_string())
            .bind(log.agent_id.to_string())
            .bind(log.timestamp.to_rfc3339())
            .bind(log.action.as_str())
            .bind(&log.model_used)
            .bind(log.input_tokens as i64)
            .bind(log.output_tokens as i64)
            .bind(log.duration_ms)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn update(&self, task: &Task) -> OrchestratorResult<()> {
        let locked_files = serde_json::to_string(&task.locked_files)?;
        let result = task.result.as_ref().map(serde_json::to_string).transpose()?;
        sqlx::query(
            r#"UPDATE tasks SET title = ?, description = ?, task_type = ?, priority = ?, required_agent = ?,
               locked_files = ?, max_iterations = ?, current_iteration = ?, complexity = ?, complexity_source = ?,
               status = ?, assigned_agent_id = ?, assigned_at = ?, completed_at = ?, time_spent_ms = ?,
               result = ?, error = ?, validation_command = ?, updated_at = ?, version = ? WHERE id = ?"#,
        )
        .bind(&task.title)
        .bind(&task.description)
        .bind(task.task_type.as_str())
        .bind(task.priority as i64)
        .bind(&task.required_agent)
        .bind(locked_files)
        .bind(task.max_iterations as i64)
        .bind(task.current_iteration as i64)
        .bind(task.complexity as i64)
        .bind(task.complexity_source.as_str())
        .bind(task.status.as_str())
        .bind(task.assigned_agent_id.map(|id| id.to_string()))
        .bind(task.assigned_at.map(|t| t.to_rfc3339()))
        .bind(task.completed_at.map(|t| t.to_rfc3339()))
        .bind(task.time_spent_ms)
        .bind(result)
        .bind(&task.error)
        .bind(&task.validation_command)
        .bind(task.updated_at.to_rfc3339())
        .bind(task.version)
        .bind(task.id.to_string())
        .execute(self.pool.sqlite_pool())
        .await?;
        Ok(())
    }
}
