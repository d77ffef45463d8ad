//! SQLite implementation of `MissionRepository`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use uuid::Uuid;

use crate::domain::models::{Mission, MissionAggregates, MissionStatus};
use crate::domain::ports::{MissionRepository, OrchestratorError, OrchestratorResult};

use super::pool::DatabasePool;

#[derive(Clone)]
pub struct SqliteMissionRepository {
    pool: DatabasePool,
}

impl SqliteMissionRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn row_to_mission(row: &sqlx::sqlite::SqliteRow) -> OrchestratorResult<Mission> {
    let subtask_ids: String = row.try_get("subtask_ids")?;
    let subtask_ids: Vec<Uuid> = serde_json::from_str(&subtask_ids)?;
    let aggregates: String = row.try_get("aggregates")?;
    let aggregates: MissionAggregates = serde_json::from_str(&aggregates)?;
    let status_str: String = row.try_get("status")?;
    let status = match status_str.as_str() {
        "decomposing" => MissionStatus::Decomposing,
        "awaiting_approval" => MissionStatus::AwaitingApproval,
        "executing" => MissionStatus::Executing,
        "reviewing" => MissionStatus::Reviewing,
        "approved" => MissionStatus::Approved,
        "rejected" => MissionStatus::Rejected,
        "failed" => MissionStatus::Failed,
        other => return Err(OrchestratorError::Internal(format!("invalid mission status in row: {other}"))),
    };
    Ok(Mission {
        id: parse_uuid(row.try_get("id")?)?,
        prompt: row.try_get("prompt")?,
        language: row.try_get("language")?,
        status,
        auto_approve: row.try_get::<i64, _>("auto_approve")? != 0,
        conversation_id: row.try_get::<Option<String>, _>("conversation_id")?.map(parse_uuid).transpose()?,
        subtask_ids,
        aggregates,
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
impl MissionRepository for SqliteMissionRepository {
    async fn create(&self, mission: &Mission) -> OrchestratorResult<()> {
        let subtask_ids = serde_json::to_string(&mission.subtask_ids)?;
        let aggregates = serde_json::to_string(&mission.aggregates)?;
        sqlx::query(
            r#"INSERT INTO missions (id, prompt, language, status, auto_approve, conversation_id,
               subtask_ids, aggregates, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(mission.id.to_string())
        .bind(&mission.prompt)
        .bind(&mission.language)
        .bind(mission.status.as_str())
        .bind(mission.auto_approve as i64)
        .bind(mission.conversation_id.map(|id| id.to_string()))
        .bind(subtask_ids)
        .bind(aggregates)
        .bind(mission.created_at.to_rfc3339())
        .bind(mission.updated_at.to_rfc3339())
        .execute(self.pool.sqlite_pool())
        .await?;
        Ok(())
    }

    async fn get(&self, id: Uuid) -> OrchestratorResult<Option<Mission>> {
        let row = sqlx::query("SELECT * FROM missions WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(self.pool.sqlite_pool())
            .await?;
        row.as_ref().map(row_to_mission).transpose()
    }

    async fn list(&self) -> OrchestratorResult<Vec<Mission>> {
        let rows = sqlx::query("SELECT * FROM missions ORDER BY created_at ASC")
            .fetch_all(self.pool.sqlite_pool())
            .await?;
        rows.iter().map(row_to_mission).collect()
    }

    async fn update(&self, mission: &Mission) -> OrchestratorResult<()> {
        let subtask_ids = serde_json::to_string(&mission.subtask_ids)?;
        let aggregates = serde_json::to_string(&mission.aggregates)?;
        sqlx::query(
            r#"UPDATE missions SET status = ?, conversation_id = ?, subtask_ids = ?, aggregates = ?, updated_at = ? WHERE id = ?"#,
        )
        .bind(mission.status.as_str())
        .bind(mission.conversation_id.map(|id| id.to_string()))
        .bind(subtask_ids)
        .bind(aggregates)
        .bind(mission.updated_at.to_rfc3339())
        .bind(mission.id.to_string())
        .execute(self.pool.sqlite_pool())
        .await?;
        Ok(())
    }
}
