//! Event Bus: fan-out of lifecycle events to local subscribers and,
//! optionally, an external pub/sub bridge.
//!
//! Built on `tokio::sync::broadcast`. Delivery to local subscribers is
//! best-effort: a lagging receiver drops the oldest events rather than
//! blocking publishers.

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::warn;
use uuid::Uuid;

use crate::domain::models::{EventKind, ResourceTier, SequenceCounter, UnifiedEvent};
use crate::domain::ports::ExternalEventSink;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<UnifiedEvent>,
    sequence: Arc<SequenceCounter>,
    bridge: Option<Arc<dyn ExternalEventSink>>,
}

impl EventBus {
    pub fn new(bridge: Option<Arc<dyn ExternalEventSink>>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            sequence: Arc::new(SequenceCounter::default()),
            bridge,
        }
    }

    pub fn new_for_test() -> Self {
        Self::new(None)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UnifiedEvent> {
        self.sender.subscribe()
    }

    /// Publish an event: assign it the next sequence number, broadcast to
    /// local subscribers, and mirror to the external bridge if configured.
    /// Per-entity ordering is FIFO in publish order; no ordering is
    /// guaranteed across distinct entities.
    pub async fn publish(&self, kind: EventKind) {
        let event = UnifiedEvent {
            sequence: self.sequence.next(),
            timestamp_utc: chrono::Utc::now(),
            kind,
        };
        // A broadcast send error just means there are currently no
        // subscribers; that's a normal, non-fatal condition.
        let _ = self.sender.send(event.clone());

        if let Some(bridge) = &self.bridge {
            if let Err(err) = bridge.publish(&event).await {
                warn!(error = %err, "failed to mirror event to external pub/sub bridge");
            }
        }
    }

    pub async fn publish_task_created(&self, task_id: Uuid) {
        self.publish(EventKind::TaskCreated { task_id }).await;
    }

    pub async fn publish_task_updated(&self, task_id: Uuid, status: &str) {
        self.publish(EventKind::TaskUpdated { task_id, status: status.to_string() }).await;
    }

    pub async fn publish_task_deleted(&self, task_id: Uuid) {
        self.publish(EventKind::TaskDeleted { task_id }).await;
    }

    pub async fn publish_agent_status_changed(&self, agent_id: Uuid, status: &str) {
        self.publish(EventKind::AgentStatusChanged { agent_id, status: status.to_string() }).await;
    }

    pub async fn publish_agent_deleted(&self, agent_id: Uuid) {
        self.publish(EventKind::AgentDeleted { agent_id }).await;
    }

    pub async fn publish_agent_cooling_down(&self, agent_id: Uuid, rest_ms: u64) {
        self.publish(EventKind::AgentCoolingDown { agent_id, rest_ms }).await;
    }

    pub async fn publish_resource_acquired(&self, tier: ResourceTier, task_id: Uuid) {
        self.publish(EventKind::ResourceAcquired { tier: tier.as_str().to_string(), task_id }).await;
    }

    pub async fn publish_resource_released(&self, tier: ResourceTier, task_id: Uuid) {
        self.publish(EventKind::ResourceReleased { tier: tier.as_str().to_string(), task_id }).await;
    }

    pub async fn publish_cost_updated(&self, daily_spent_cents: f64) {
        self.publish(EventKind::CostUpdated { daily_spent_cents }).await;
    }

    pub async fn publish_alert(&self, message: impl Into<String>, severity: impl Into<String>) {
        self.publish(EventKind::Alert { message: message.into(), severity: severity.into() }).await;
    }

    pub async fn publish_chat_chunk(&self, conversation_id: Uuid, chunk: impl Into<String>) {
        self.publish(EventKind::ChatMessageChunk { conversation_id, chunk: chunk.into() }).await;
    }

    pub async fn publish_chat_complete(&self, conversation_id: Uuid) {
        self.publish(EventKind::ChatMessageComplete { conversation_id }).await;
    }

    pub async fn publish_chat_error(&self, conversation_id: Uuid, error: impl Into<String>) {
        self.publish(EventKind::ChatMessageError { conversation_id, error: error.into() }).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new_for_test();
        let mut rx = bus.subscribe();
        bus.publish_task_created(Uuid::new_v4()).await;
        let event = rx.recv().await.unwrap();
        assert!(matches!(event.kind, EventKind::TaskCreated { .. }));
    }

    #[tokio::test]
    async fn sequence_numbers_increase_monotonically() {
        let bus = EventBus::new_for_test();
        let mut rx = bus.subscribe();
        bus.publish_task_created(Uuid::new_v4()).await;
        bus.publish_task_created(Uuid::new_v4()).await;
        let a = rx.recv().await.unwrap();
        let b = rx.recv().await.unwrap();
        assert!(b.sequence.0 > a.sequence.0);
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_panic() {
        let bus = EventBus::new_for_test();
        bus.publish_task_created(Uuid::new_v4()).await;
    }
}
