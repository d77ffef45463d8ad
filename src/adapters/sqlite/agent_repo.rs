//! SQLite implementation of `AgentRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::models::{Agent, AgentConfig, AgentStatus, AgentType};
use crate::domain::ports::{AgentRepository, OrchestratorError, OrchestratorResult};

use super::pool::DatabasePool;

#[derive(Clone)]
pub struct SqliteAgentRepository {
    pool: DatabasePool,
}

impl SqliteAgentRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn row_to_agent(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<Agent> {
    let config: String = row.try_get("config")?;
    Ok(Agent {
        id: parse_uuid(row.try_get("id")?)?,
        name: row.try_get("name")?,
        agent_type: AgentType::from_str(row.try_get::<String, _>("agent_type")?.as_str())
            .ok_or_else(|| OrchestratorError::Internal("invalid agent_type in row".to_string()))?,
        status: AgentStatus::from_str(row.try_get::<String, _>("status")?.as_str())
            .ok_or_else(|| OrchestratorError::Internal("invalid status in row".to_string()))?,
        current_task_id: row.try_get::<Option<String>, _>("current_task_id")?.map(parse_uuid).transpose()?,
        config: serde_json::from_str::<AgentConfig>(&config)?,
        inflight: row.try_get::<i64, _>("inflight")? as u32,
        tasks_completed_since_rest: row.try_get::<i64, _>("tasks_completed_since_rest")? as u32,
        created_at: parse_ts(row.try_get("created_at")?)?,
        updated_at: parse_ts(row.try_get("updated_at")?)?,
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
impl AgentRepository for SqliteAgentRepository {
    async fn create(&self, agent: &Agent) -> OrchestratorResult<()> {
        let config = serde_json::to_string(&agent.config)?;
        sqlx::query(
            r#"INSERT INTO agents (id, name, agent_type, status, current_task_id, config, inflight,
               tasks_completed_since_rest, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(agent.id.to_string())
        .bind(&agent.name)
        .bind(agent.agent_type.as_str())
        .bind(agent.status.as_str())
        .bind(agent.current_task_id.map(|id| id.to_string()))
        .bind(config)
        .bind(agent.inflight as i64)
        .bind(agent.tasks_completed_since_rest as i64)
        .bind(agent.created_at.to_rfc3339())
        .bind(agent.updated_at.to_rfc3339())
        .execute(self.pool.sqlite_pool())
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Agent>> {
        let row = sqlx::query("SELECT * FROM agents WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool.sqlite_pool())
            .await?;
        row.as_ref().map(row_to_agent).transpose()
    }

    async fn list(&self) -> OrchestratorResult<Vec<Agent>> {
        let rows = sqlx::query("SELECT * FROM agents ORDER BY created_at ASC")
            .fetch_all(self.pool.sqlite_pool())
            .await?;
        rows.iter().map(row_to_agent).collect()
    }

    async fn list_by_type(&self, agent_type: &str) -> OrchestratorResult<Vec<Agent>> {
        let rows = sqlx::query("SELECT * FROM agents WHERE agent_type = ? ORDER BY created_at ASC")
            .bind(agent_type)
            .fetch_all(self.pool.sqlite_pool())
            .await?;
        rows.iter().map(row_to_agent).collect()
    }

    async fn update(&self, agent: &Agent) -> OrchestratorResult<()> {
        let config = serde_json::to_string(&agent.config)?;
        sqlx::query(
            r#"UPDATE agents SET name = ?, agent_type = ?, status = ?, current_task_id = ?, config = ?,
               inflight = ?, tasks_completed_since_rest = ?, updated_at = ? WHERE id = ?"#,
        )
        .bind(&agent.name)
        .bind(agent.agent_type.as_str())
        .bind(agent.status.as_str())
        .bind(agent.current_task_id.map(|id| id.to_string()))
        .bind(config)
        .bind(agent.inflight as i64)
        .bind(agent.tasks_completed_since_rest as i64)
        .bind(agent.updated_at.to_rfc3339())
        .bind(agent.id.to_string())
        .execute(self.pool.sqlite_pool())
        .await?;
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> OrchestratorResult<()> {
        sqlx::query("DELETE FROM agents WHERE id = ?")
            .bind(id.to_string())
            .execute(self.pool.sqlite_pool())
            .await?;
        Ok(())
    }
}
