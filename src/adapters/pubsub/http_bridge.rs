//! Bridges events to an external pub/sub endpoint over HTTP POST.
//!
//! Best-effort by contract (`ExternalEventSink::publish`): a failed POST is
//! logged and swallowed rather than propagated, since this is a secondary
//! delivery path and must never block or fail the primary event bus.

use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use std::time::Duration;
use tracing::warn;

use crate::domain::models::UnifiedEvent;
use crate::domain::ports::{ExternalEventSink, OrchestratorResult};

pub struct HttpBridgeEventSink {
    http_client: ReqwestClient,
    endpoint: String,
}

impl HttpBridgeEventSink {
    pub fn new(endpoint: String) -> Self {
        let http_client = ReqwestClient::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build pubsub http client");
        Self { http_client, endpoint }
    }
}

#[async_trait]
impl ExternalEventSink for HttpBridgeEventSink {
    async fn publish(&self, event: &UnifiedEvent) -> OrchestratorResult<()> {
        if let Err(e) = self.http_client.post(&self.endpoint).json(event).send().await {
            warn!(error = %e, endpoint = %self.endpoint, "pubsub bridge publish failed");
        }
        Ok(())
    }
}
