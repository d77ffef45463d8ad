//! No-op external event sink, used when `PubsubConfig::enabled` is false.

use async_trait::async_trait;

use crate::domain::models::UnifiedEvent;
use crate::domain::ports::{ExternalEventSink, OrchestratorResult};

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

#[async_trait]
impl ExternalEventSink for NoopEventSink {
    async fn publish(&self, _event: &UnifiedEvent) -> OrchestratorResult<()> {
        Ok(())
    }
}
