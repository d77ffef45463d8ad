//! Port for mirroring events to an external pub/sub bridge. The bridge
//! itself (a message broker) is out of scope; this trait is the seam the
//! Event Bus publishes through when `PubsubConfig::enabled` is set.

use async_trait::async_trait;

use super::errors::OrchestratorResult;
use crate::domain::models::UnifiedEvent;

#[async_trait]
pub trait ExternalEventSink: Send + Sync {
    /// Mirror one event to the external channel keyed by
    /// `event.kind.entity_key()`. Best-effort: implementations should log
    /// and swallow transient failures rather than propagate them, since
    /// the bridge is a secondary delivery path.
    async fn publish(&self, event: &UnifiedEvent) -> OrchestratorResult<()>;
}
