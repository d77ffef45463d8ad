//! Task domain model.
//!
//! A `Task` is the unit of work routed through the lifecycle state machine.
//! Tasks may stand alone or belong to a `Mission`'s decomposition tree via
//! `parent_task_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use uuid::Uuid;

/// Kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    Code,
    Test,
    Review,
    Debug,
    Refactor,
    Decomposition,
}

impl TaskType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::Test => "test",
            Self::Review => "review",
            Self::Debug => "debug",
            Self::Refactor => "refactor",
            Self::Decomposition => "decomposition",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "code" => Some(Self::Code),
            "test" => Some(Self::Test),
            "review" => Some(Self::Review),
            "debug" => Some(Self::Debug),
            "refactor" => Some(Self::Refactor),
            "decomposition" => Some(Self::Decomposition),
            _ => None,
        }
    }
}

/// Lifecycle status of a task.
///
/// See `valid_transitions` for the authoritative state machine; no caller
/// should mutate `status` without going through a `TaskQueueService`
/// operation that consults it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    InProgress,
    NeedsHuman,
    Completed,
    Failed,
    Aborted,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Assigned => "assigned",
            Self::InProgress => "in_progress",
            Self::NeedsHuman => "needs_human",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Aborted => "aborted",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "assigned" => Some(Self::Assigned),
            "in_progress" => Some(Self::InProgress),
            "needs_human" => Some(Self::NeedsHuman),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "aborted" => Some(Self::Aborted),
            _ => None,
        }
    }

    /// Terminal statuses never transition again without `return_to_pool`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Aborted)
    }

    /// True for exactly the statuses that require a non-null `assigned_agent_id`.
    pub fn requires_agent(&self) -> bool {
        matches!(self, Self::Assigned | Self::InProgress | Self::NeedsHuman)
    }

    pub fn valid_transitions(&self) -> &'static [TaskStatus] {
        match self {
            Self::Pending => &[Self::Assigned],
            Self::Assigned => &[Self::InProgress, Self::Aborted],
            Self::InProgress => &[
                Self::Completed,
                Self::Failed,
                Self::Aborted,
                Self::NeedsHuman,
            ],
            Self::NeedsHuman => &[Self::InProgress, Self::Aborted],
            Self::Completed => &[],
            Self::Failed => &[Self::Pending],
            Self::Aborted => &[Self::Pending],
        }
    }

    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

/// Source of the complexity value currently stored on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplexitySource {
    /// Heuristic router score only.
    Router,
    /// Heuristic and semantic assessor disagreed by >= 2; semantic wins.
    Dual,
    /// A small cloud model's raw opinion (rare: used by tests/tools).
    Haiku,
    /// Explicitly set by a human or API caller.
    Manual,
}

impl ComplexitySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Router => "router",
            Self::Dual => "dual",
            Self::Haiku => "haiku",
            Self::Manual => "manual",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "router" => Some(Self::Router),
            "dual" => Some(Self::Dual),
            "haiku" => Some(Self::Haiku),
            "manual" => Some(Self::Manual),
            _ => None,
        }
    }
}

/// A discrete unit of work executed by exactly one agent at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub task_type: TaskType,
    pub priority: u8,
    pub required_agent: Option<String>,
    pub locked_files: Vec<String>,
    pub max_iterations: u32,
    pub current_iteration: u32,
    pub complexity: u8,
    pub complexity_source: ComplexitySource,
    pub status: TaskStatus,
    pub assigned_agent_id: Option<Uuid>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub time_spent_ms: Option<i64>,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub parent_task_id: Option<Uuid>,
    pub validation_command: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub version: i64,
}

impl Task {
    pub fn new(title: impl Into<String>, description: impl Into<String>, task_type: TaskType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: description.into(),
            task_type,
            priority: 5,
            required_agent: None,
            locked_files: Vec::new(),
            max_iterations: 3,
            current_iteration: 0,
            complexity: 1,
            complexity_source: ComplexitySource::Router,
            status: TaskStatus::Pending,
            assigned_agent_id: None,
            assigned_at: None,
            completed_at: None,
            time_spent_ms: None,
            result: None,
            error: None,
            parent_task_id: None,
            validation_command: None,
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(1, 10);
        self
    }

    pub fn with_locked_files(mut self, files: impl IntoIterator<Item = String>) -> Self {
        self.locked_files = files.into_iter().collect();
        self
    }

    pub fn with_parent(mut self, parent_task_id: Uuid) -> Self {
        self.parent_task_id = Some(parent_task_id);
        self
    }

    pub fn with_required_agent(mut self, agent_type: impl Into<String>) -> Self {
        self.required_agent = Some(agent_type.into());
        self
    }

    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max.max(1);
        self
    }

    pub fn with_validation_command(mut self, cmd: impl Into<String>) -> Self {
        self.validation_command = Some(cmd.into());
        self
    }

    /// Invariant check used by tests and store-layer assertions: a non-null
    /// `assigned_agent_id` iff `status` is one of the agent-owning states.
    pub fn assignment_invariant_holds(&self) -> bool {
        self.status.requires_agent() == self.assigned_agent_id.is_some()
    }

    pub fn locked_files_set(&self) -> HashSet<&str> {
        self.locked_files.iter().map(String::as_str).collect()
    }

    pub fn retries_remaining(&self) -> bool {
        self.current_iteration < self.max_iterations
    }

    /// Apply an assign transition in place. Caller is responsible for the
    /// store transaction and file-lock/resource admission; this only updates
    /// the in-memory representation consistently.
    pub fn apply_assign(&mut self, agent_id: Uuid) {
        self.status = TaskStatus::Assigned;
        self.assigned_agent_id = Some(agent_id);
        self.assigned_at = Some(Utc::now());
        self.current_iteration += 1;
        self.touch();
    }

    pub fn apply_start(&mut self) {
        self.status = TaskStatus::InProgress;
        self.touch();
    }

    pub fn apply_completion(&mut self, result: serde_json::Value, time_spent_ms: i64) {
        self.status = TaskStatus::Completed;
        self.result = Some(result);
        self.time_spent_ms = Some(time_spent_ms);
        self.completed_at = Some(Utc::now());
        self.assigned_agent_id = None;
        self.touch();
    }

    /// Returns true if this failure is terminal (no retries remaining).
    pub fn apply_failure(&mut self, reason: impl Into<String>) -> bool {
        self.error = Some(reason.into());
        self.assigned_agent_id = None;
        if self.retries_remaining() {
            self.status = TaskStatus::Pending;
            self.assigned_at = None;
            self.touch();
            false
        } else {
            self.status = TaskStatus::Failed;
            self.completed_at = Some(Utc::now());
            self.touch();
            true
        }
    }

    pub fn apply_abort(&mut self, reason: impl Into<String>) {
        self.status = TaskStatus::Aborted;
        self.error = Some(reason.into());
        self.assigned_agent_id = None;
        self.completed_at = Some(Utc::now());
        self.touch();
    }

    pub fn apply_return_to_pool(&mut self) {
        self.status = TaskStatus::Pending;
        self.assigned_agent_id = None;
        self.assigned_at = None;
        self.touch();
    }

    pub fn apply_escalate(&mut self) {
        self.status = TaskStatus::NeedsHuman;
        self.touch();
    }

    /// `needs_human ── provideInput ──► in_progress`: a human supplied the
    /// missing input/decision and the task resumes with its existing
    /// assigned agent.
    pub fn apply_resume_from_human(&mut self) {
        self.status = TaskStatus::InProgress;
        self.touch();
    }

    /// Apply an operator-supplied field patch in place. Only legal while
    /// the task hasn't started (`pending`); callers enforce that.
    #[allow(clippy::too_many_arguments)]
    pub fn apply_patch(
        &mut self,
        title: Option<String>,
        description: Option<String>,
        priority: Option<u8>,
        required_agent: Option<Option<String>>,
        max_iterations: Option<u32>,
        validation_command: Option<Option<String>>,
    ) {
        if let Some(title) = title {
            self.title = title;
        }
        if let Some(description) = description {
            self.description = description;
        }
        if let Some(priority) = priority {
            self.priority = priority.clamp(1, 10);
        }
        if let Some(required_agent) = required_agent {
            self.required_agent = required_agent;
        }
        if let Some(max_iterations) = max_iterations {
            self.max_iterations = max_iterations.max(1);
        }
        if let Some(validation_command) = validation_command {
            self.validation_command = validation_command;
        }
        self.touch();
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.version += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_task_starts_pending_without_agent() {
        let t = Task::new("t", "d", TaskType::Code);
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.assignment_invariant_holds());
    }

    #[test]
    fn assign_sets_agent_and_requires_agent_status() {
        let mut t = Task::new("t", "d", TaskType::Code);
        let agent = Uuid::new_v4();
        t.apply_assign(agent);
        assert_eq!(t.status, TaskStatus::Assigned);
        assert_eq!(t.assigned_agent_id, Some(agent));
        assert!(t.assignment_invariant_holds());
    }

    #[test]
    fn failure_below_max_iterations_returns_to_pending() {
        let mut t = Task::new("t", "d", TaskType::Code).with_max_iterations(3);
        t.apply_assign(Uuid::new_v4());
        let terminal = t.apply_failure("boom");
        assert!(!terminal);
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(t.assignment_invariant_holds());
    }

    #[test]
    fn failure_at_max_iterations_is_terminal() {
        let mut t = Task::new("t", "d", TaskType::Code).with_max_iterations(1);
        t.apply_assign(Uuid::new_v4());
        let terminal = t.apply_failure("boom");
        assert!(terminal);
        assert_eq!(t.status, TaskStatus::Failed);
        assert!(t.current_iteration <= t.max_iterations);
    }

    #[test]
    fn state_machine_rejects_invalid_transitions() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Assigned));
        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Completed));
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Pending));
    }
}
