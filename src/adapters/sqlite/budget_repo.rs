//! SQLite implementation of `BudgetRepository`.
//!
//! `budget_state` is a single-row table (`id = 1`); daily archives live in
//! `budget_history` keyed by date rather than nested inside the state blob,
//! so `history(days)` can page without deserializing the whole ledger.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Row;

use crate::domain::models::{BudgetConfig, BudgetHistoryEntry, BudgetState};
use crate::domain::ports::{BudgetRepository, OrchestratorError, OrchestratorResult};

use super::pool::DatabasePool;

#[derive(Clone)]
pub struct SqliteBudgetRepository {
    pool: DatabasePool,
}

impl SqliteBudgetRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

fn parse_ts(s: String) -> OrchestratorResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| OrchestratorError::Internal(format!("invalid timestamp in row: {e}")))
}

fn parse_date(s: String) -> OrchestratorResult<NaiveDate> {
    s.parse::<NaiveDate>()
        .map_err(|e| OrchestratorError::Internal(format!("invalid date in row: {e}")))
}

#[async_trait]
impl BudgetRepository for SqliteBudgetRepository {
    async fn load(&self) -> OrchestratorResult<Option<BudgetState>> {
        let row = sqlx::query("SELECT * FROM budget_state WHERE id = 1")
            .fetch_optional(self.pool.sqlite_pool())
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        let config: String = row.try_get("config")?;
        let config: BudgetConfig = serde_json::from_str(&config)?;
        Ok(Some(BudgetState {
            daily_spent_cents: row.try_get("daily_spent_cents")?,
            all_time_spent_cents: row.try_get("all_time_spent_cents")?,
            day_start: parse_ts(row.try_get("day_start")?)?,
            config,
            history: Vec::new(),
        }))
    }

    async fn save(&self, state: &BudgetState) -> OrchestratorResult<()> {
        let config = serde_json::to_string(&state.config)?;
        sqlx::query(
            r#"INSERT INTO budget_state (id, daily_spent_cents, all_time_spent_cents, day_start, config)
               VALUES (1, ?, ?, ?, ?)
               ON CONFLICT(id) DO UPDATE SET
                 daily_spent_cents = excluded.daily_spent_cents,
                 all_time_spent_cents = excluded.all_time_spent_cents,
                 day_start = excluded.day_start,
                 config = excluded.config"#,
        )
        .bind(state.daily_spent_cents)
        .bind(state.all_time_spent_cents)
        .bind(state.day_start.to_rfc3339())
        .bind(config)
        .execute(self.pool.sqlite_pool())
        .await?;
        Ok(())
    }

    async fn archive_day(&self, entry: &BudgetHistoryEntry) -> OrchestratorResult<()> {
        sqlx::query(
            r#"INSERT INTO budget_history (date, spent_cents) VALUES (?, ?)
               ON CONFLICT(date) DO UPDATE SET spent_cents = excluded.spent_cents"#,
        )
        .bind(entry.date.to_string())
        .bind(entry.spent_cents)
        .execute(self.pool.sqlite_pool())
        .await?;
        Ok(())
    }

    async fn history(&self, days: u32) -> OrchestratorResult<Vec<BudgetHistoryEntry>> {
        let rows = sqlx::query("SELECT * FROM budget_history ORDER BY date DESC LIMIT ?")
            .bind(days as i64)
            .fetch_all(self.pool.sqlite_pool())
            .await?;
        rows.iter()
            .map(|row| {
                Ok(BudgetHistoryEntry {
                    date: parse_date(row.try_get("date")?)?,
                    spent_cents: row.try_get("spent_cents")?,
                })
            })
            .collect()
    }
}
