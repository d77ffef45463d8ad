//! Lifecycle event envelope published by the `EventBus`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

/// Monotonically increasing per-process sequence number. Lets WebSocket
/// clients request a replay cursor on reconnect; no ordering guarantee is
/// made *across* entities, only per-entity FIFO in publish order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU64);

impl SequenceCounter {
    pub fn next(&self) -> SequenceNumber {
        SequenceNumber(self.0.fetch_add(1, Ordering::SeqCst))
    }
}

/// The discriminated set of lifecycle events the orchestrator publishes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    TaskCreated { task_id: Uuid },
    TaskUpdated { task_id: Uuid, status: String },
    TaskDeleted { task_id: Uuid },
    AgentStatusChanged { agent_id: Uuid, status: String },
    AgentDeleted { agent_id: Uuid },
    AgentCoolingDown { agent_id: Uuid, rest_ms: u64 },
    ResourceAcquired { tier: String, task_id: Uuid },
    ResourceReleased { tier: String, task_id: Uuid },
    ExecutionStep { task_id: Uuid, detail: String },
    ChatMessageChunk { conversation_id: Uuid, chunk: String },
    ChatMessageComplete { conversation_id: Uuid },
    ChatMessageError { conversation_id: Uuid, error: String },
    CostUpdated { daily_spent_cents: f64 },
    Alert { message: String, severity: String },
    MetricsUpdated,
}

impl EventKind {
    /// The entity this event is keyed by, for per-entity FIFO ordering and
    /// external pub/sub channel naming (e.g. `task:{id}:updates`).
    pub fn entity_key(&self) -> String {
        match self {
            Self::TaskCreated { task_id }
            | Self::TaskUpdated { task_id, .. }
            | Self::TaskDeleted { task_id }
            | Self::ExecutionStep { task_id, .. } => format!("task:{task_id}"),
            Self::AgentStatusChanged { agent_id, .. }
            | Self::AgentDeleted { agent_id }
            | Self::AgentCoolingDown { agent_id, .. } => format!("agent:{agent_id}"),
            Self::ResourceAcquired { task_id, .. } | Self::ResourceReleased { task_id, .. } => {
                format!("task:{task_id}")
            }
            Self::ChatMessageChunk { conversation_id, .. }
            | Self::ChatMessageComplete { conversation_id }
            | Self::ChatMessageError { conversation_id, .. } => {
                format!("conversation:{conversation_id}")
            }
            Self::CostUpdated { .. } => "budget".to_string(),
            Self::Alert { .. } => "alert".to_string(),
            Self::MetricsUpdated => "metrics".to_string(),
        }
    }

    /// WebSocket subscription room this event belongs to beyond the
    /// catch-all `all` room. Task-scoped events get `task:{id}`; anything
    /// without a natural single-task owner (agent, budget, alert, chat) has
    /// no dedicated room and only reaches clients subscribed to `all`.
    pub fn room(&self) -> Option<String> {
        self.task_id().map(|id| format!("task:{id}"))
    }

    /// The task this event is about, if any — used to resolve `mission:{id}`
    /// room membership via that task's parent mission.
    pub fn task_id(&self) -> Option<Uuid> {
        match self {
            Self::TaskCreated { task_id }
            | Self::TaskUpdated { task_id, .. }
            | Self::TaskDeleted { task_id }
            | Self::ExecutionStep { task_id, .. }
            | Self::ResourceAcquired { task_id, .. }
            | Self::ResourceReleased { task_id, .. } => Some(*task_id),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnifiedEvent {
    pub sequence: SequenceNumber,
    pub timestamp_utc: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: EventKind,
}
