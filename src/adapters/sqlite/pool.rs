//! SQLite connection pool and migration runner.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::domain::ports::{OrchestratorError, OrchestratorResult};

const MIGRATION_SQL: &str = include_str!("../../../migrations/0001_init.sql");

#[derive(Clone)]
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    pub async fn connect(database_url: &str, max_connections: u32) -> OrchestratorResult<Self> {
        ensure_database_directory(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| OrchestratorError::Internal(format!("invalid database url: {e}")))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(connect_options)
            .await?;

        Ok(Self { pool })
    }

    pub async fn connect_in_memory() -> OrchestratorResult<Self> {
        let connect_options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| OrchestratorError::Internal(format!("invalid in-memory database url: {e}")))?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .shared_cache(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(connect_options)
            .await?;

        Ok(Self { pool })
    }

    /// Apply the embedded schema. Idempotent via `CREATE TABLE IF NOT EXISTS`.
    pub async fn migrate(&self) -> OrchestratorResult<()> {
        sqlx::raw_sql(MIGRATION_SQL).execute(&self.pool).await?;
        Ok(())
    }

    pub fn sqlite_pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn ensure_database_directory(database_url: &str) -> OrchestratorResult<()> {
    let path = database_url
        .strip_prefix("sqlite:")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .unwrap_or(database_url);

    if path == ":memory:" || path.is_empty() {
        return Ok(());
    }

    let path = Path::new(path);
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OrchestratorError::Internal(format!("failed to create database directory: {e}")))?;
        }
    }
    Ok(())
}
