//! Append-only execution log entries.
//!
//! Every dispatch to the external agent runtime produces one entry on
//! completion (success or failure). Cost and metrics derive entirely from
//! this log — see `services::cost_calculator`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionAction {
    Started,
    Completed,
    Failed,
    Aborted,
}

impl ExecutionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: Uuid,
    pub task_id: Uuid,
    pub agent_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub action: ExecutionAction,
    pub model_used: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub duration_ms: i64,
}

impl ExecutionLog {
    pub fn new(
        task_id: Uuid,
        agent_id: Uuid,
        action: ExecutionAction,
        model_used: impl Into<String>,
        input_tokens: u64,
        output_tokens: u64,
        duration_ms: i64,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id,
            agent_id,
            timestamp: Utc::now(),
            action,
            model_used: model_used.into(),
            input_tokens,
            output_tokens,
            duration_ms,
        }
    }
}
