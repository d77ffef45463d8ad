//! Mission domain model.
//!
//! A `Mission` is a user-prompted goal that the orchestrator decomposes
//! into a DAG of `Task`s (linked via `Task::parent_task_id`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MissionStatus {
    Decomposing,
    AwaitingApproval,
    Executing,
    Reviewing,
    Approved,
    Rejected,
    Failed,
}

impl MissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Decomposing => "decomposing",
            Self::AwaitingApproval => "awaiting_approval",
            Self::Executing => "executing",
            Self::Reviewing => "reviewing",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected | Self::Failed)
    }
}

/// Subtask specification returned by mission decomposition, before it is
/// persisted as a concrete `Task`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubtaskSpec {
    pub title: String,
    pub description: String,
    pub task_type: crate::domain::models::task::TaskType,
    pub required_agent: Option<String>,
    /// Indices into the decomposition's subtask list this one depends on.
    #[serde(default)]
    pub depends_on: Vec<usize>,
    pub complexity: Option<u8>,
    #[serde(default)]
    pub file_paths: Vec<String>,
    #[serde(default)]
    pub acceptance_criteria: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MissionAggregates {
    pub total_cost_cents: f64,
    pub completed_count: u32,
    pub failed_count: u32,
    pub review_score: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mission {
    pub id: Uuid,
    pub prompt: String,
    pub language: String,
    pub status: MissionStatus,
    pub auto_approve: bool,
    pub conversation_id: Option<Uuid>,
    /// Ordered subtask ids, in decomposition order.
    pub subtask_ids: Vec<Uuid>,
    pub aggregates: MissionAggregates,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Mission {
    pub fn new(prompt: impl Into<String>, language: impl Into<String>, auto_approve: bool) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            prompt: prompt.into(),
            language: language.into(),
            status: MissionStatus::Decomposing,
            auto_approve,
            conversation_id: None,
            subtask_ids: Vec::new(),
            aggregates: MissionAggregates::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn record_subtask_terminal(&mut self, completed: bool, cost_cents: f64) {
        self.aggregates.total_cost_cents += cost_cents;
        if completed {
            self.aggregates.completed_count += 1;
        } else {
            self.aggregates.failed_count += 1;
        }
        self.touch();
    }

    pub fn all_subtasks_accounted_for(&self) -> bool {
        (self.aggregates.completed_count + self.aggregates.failed_count) as usize
            >= self.subtask_ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_mission_starts_decomposing() {
        let m = Mission::new("build a thing", "python", true);
        assert_eq!(m.status, MissionStatus::Decomposing);
        assert!(!m.status.is_terminal());
    }

    #[test]
    fn aggregates_track_completion_and_cost() {
        let mut m = Mission::new("build a thing", "python", true);
        m.subtask_ids = vec![Uuid::new_v4(), Uuid::new_v4()];
        m.record_subtask_terminal(true, 1.5);
        assert!(!m.all_subtasks_accounted_for());
        m.record_subtask_terminal(false, 0.0);
        assert!(m.all_subtasks_accounted_for());
        assert_eq!(m.aggregates.completed_count, 1);
        assert_eq!(m.aggregates.failed_count, 1);
        assert!((m.aggregates.total_cost_cents - 1.5).abs() < f64::EPSILON);
    }
}
