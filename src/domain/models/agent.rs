//! Agent domain model.
//!
//! Agents are persistent workers. Each holds at most one task at a time;
//! the inverse relationship (`Task::assigned_agent_id`) is kept consistent
//! by `TaskQueueService`, never mutated directly by callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse category used for routing and capability filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Coder,
    Qa,
    Cto,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Coder => "coder",
            Self::Qa => "qa",
            Self::Cto => "cto",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "coder" => Some(Self::Coder),
            "qa" => Some(Self::Qa),
            "cto" => Some(Self::Cto),
            _ => None,
        }
    }
}

/// Agent availability state.
///
/// `Stuck` is a transient synonym for `Paused` used internally by the
/// cooling and stuck-task-recovery paths; both serialize to the same wire
/// value so external callers only ever observe `paused`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Idle,
    Busy,
    Paused,
    Offline,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Busy => "busy",
            Self::Paused => "paused",
            Self::Offline => "offline",
        }
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "idle" => Some(Self::Idle),
            "busy" => Some(Self::Busy),
            "paused" | "stuck" => Some(Self::Paused),
            "offline" => Some(Self::Offline),
            _ => None,
        }
    }
}

/// Preferred tier override recognized by the Task Router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierOverride {
    Auto,
    Local,
    RemoteLocal,
    Grok,
    Haiku,
    Sonnet,
    Opus,
}

impl Default for TierOverride {
    fn default() -> Self {
        Self::Auto
    }
}

/// Per-agent configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub preferred_tier: TierOverride,
    pub concurrency_cap: u32,
    pub auto_retry: bool,
    pub context_budget_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            preferred_tier: TierOverride::Auto,
            concurrency_cap: 1,
            auto_retry: true,
            context_budget_tokens: 32_000,
        }
    }
}

/// A persistent worker that executes tasks through the external agent runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    pub agent_type: AgentType,
    pub status: AgentStatus,
    pub current_task_id: Option<Uuid>,
    pub config: AgentConfig,
    pub inflight: u32,
    pub tasks_completed_since_rest: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: impl Into<String>, agent_type: AgentType) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            agent_type,
            status: AgentStatus::Idle,
            current_task_id: None,
            config: AgentConfig::default(),
            inflight: 0,
            tasks_completed_since_rest: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// `current_task_id` is non-null iff `status` is busy (or paused/stuck
    /// while cooling, which is treated as a busy-adjacent transient state).
    pub fn assignment_invariant_holds(&self) -> bool {
        match self.status {
            AgentStatus::Busy | AgentStatus::Paused => self.current_task_id.is_some(),
            AgentStatus::Idle | AgentStatus::Offline => self.current_task_id.is_none(),
        }
    }

    pub fn mark_busy(&mut self, task_id: Uuid) {
        self.status = AgentStatus::Busy;
        self.current_task_id = Some(task_id);
        self.inflight += 1;
        self.updated_at = Utc::now();
    }

    /// Transition straight out of `busy` into cooling-down, releasing the
    /// inflight slot but keeping `current_task_id` set so the agent stays
    /// `assignment_invariant_holds`-valid for the paused/busy-adjacent
    /// duration of the rest delay.
    pub fn mark_cooling(&mut self) {
        self.status = AgentStatus::Paused;
        self.inflight = self.inflight.saturating_sub(1);
        self.updated_at = Utc::now();
    }

    pub fn mark_idle(&mut self) {
        self.status = AgentStatus::Idle;
        self.current_task_id = None;
        self.inflight = self.inflight.saturating_sub(1);
        self.updated_at = Utc::now();
    }

    pub fn is_idle(&self) -> bool {
        self.status == AgentStatus::Idle
    }

    pub fn can_be_deleted(&self) -> bool {
        self.status == AgentStatus::Idle
    }

    /// Operator-initiated pause, distinct from the automatic cooling-down
    /// pause: leaves `current_task_id` untouched, so a busy agent stays
    /// assigned to its task while declining any new one.
    pub fn mark_paused(&mut self) {
        self.status = AgentStatus::Paused;
        self.updated_at = Utc::now();
    }

    /// Resume from an operator pause into whatever status the current
    /// assignment implies: `busy` if still holding a task, `idle` otherwise.
    pub fn mark_resumed(&mut self) {
        self.status = if self.current_task_id.is_some() { AgentStatus::Busy } else { AgentStatus::Idle };
        self.updated_at = Utc::now();
    }

    /// Take the agent fully out of rotation: drops any in-flight slot
    /// bookkeeping since an offline agent cannot be resumed mid-task by
    /// this transition alone (its task must be reassigned separately).
    pub fn mark_offline(&mut self) {
        self.status = AgentStatus::Offline;
        self.current_task_id = None;
        self.inflight = 0;
        self.updated_at = Utc::now();
    }

    pub fn mark_online(&mut self) {
        self.status = AgentStatus::Idle;
        self.updated_at = Utc::now();
    }

    /// Apply an operator-supplied field patch in place.
    pub fn apply_patch(
        &mut self,
        name: Option<String>,
        preferred_tier: Option<TierOverride>,
        concurrency_cap: Option<u32>,
        auto_retry: Option<bool>,
        context_budget_tokens: Option<u32>,
    ) {
        if let Some(name) = name {
            self.name = name;
        }
        if let Some(preferred_tier) = preferred_tier {
            self.config.preferred_tier = preferred_tier;
        }
        if let Some(concurrency_cap) = concurrency_cap {
            self.config.concurrency_cap = concurrency_cap.max(1);
        }
        if let Some(auto_retry) = auto_retry {
            self.config.auto_retry = auto_retry;
        }
        if let Some(context_budget_tokens) = context_budget_tokens {
            self.config.context_budget_tokens = context_budget_tokens;
        }
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_agent_is_idle_with_no_task() {
        let a = Agent::new("coder-01", AgentType::Coder);
        assert!(a.is_idle());
        assert!(a.assignment_invariant_holds());
    }

    #[test]
    fn mark_busy_then_idle_round_trips_invariant() {
        let mut a = Agent::new("coder-01", AgentType::Coder);
        let task_id = Uuid::new_v4();
        a.mark_busy(task_id);
        assert!(a.assignment_invariant_holds());
        assert_eq!(a.current_task_id, Some(task_id));
        a.mark_idle();
        assert!(a.assignment_invariant_holds());
        assert!(a.current_task_id.is_none());
    }

    #[test]
    fn stuck_synonym_parses_to_paused() {
        assert_eq!(AgentStatus::from_str("stuck"), Some(AgentStatus::Paused));
        assert_eq!(AgentStatus::Paused.as_str(), "paused");
    }

    #[test]
    fn manual_pause_then_resume_returns_to_busy_when_still_assigned() {
        let mut a = Agent::new("coder-01", AgentType::Coder);
        let task_id = Uuid::new_v4();
        a.mark_busy(task_id);
        a.mark_paused();
        assert_eq!(a.status, AgentStatus::Paused);
        assert_eq!(a.current_task_id, Some(task_id));
        a.mark_resumed();
        assert_eq!(a.status, AgentStatus::Busy);
    }

    #[test]
    fn offline_then_online_clears_assignment() {
        let mut a = Agent::new("coder-01", AgentType::Coder);
        a.mark_busy(Uuid::new_v4());
        a.mark_offline();
        assert_eq!(a.status, AgentStatus::Offline);
        assert!(a.current_task_id.is_none());
        a.mark_online();
        assert_eq!(a.status, AgentStatus::Idle);
    }
}
