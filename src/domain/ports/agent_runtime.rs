//! Port to the external agent runtime — the out-of-scope process that
//! actually invokes language models. Reached over HTTP/JSON.

use async_trait::async_trait;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use uuid::Uuid;

use super::errors::OrchestratorResult;

/// A live chat reply, delivered as a stream of text deltas so the caller can
/// forward each one to subscribers as it arrives rather than buffering the
/// whole response.
pub type ChatStream = Pin<Box<dyn Stream<Item = OrchestratorResult<String>> + Send>>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    pub task_id: Uuid,
    pub agent_id: Uuid,
    pub task_description: String,
    pub expected_output: Option<String>,
    pub use_cloud: bool,
    pub model: Option<String>,
    pub allow_fallback: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecuteMetrics {
    pub api_credits_used: f64,
    pub time_spent_ms: i64,
    pub iterations: u32,
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub execution_id: Uuid,
    pub output: Option<serde_json::Value>,
    pub metrics: ExecuteMetrics,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub local: bool,
    pub cloud: bool,
    pub remote: Option<bool>,
}

/// Outbound client to the external agent runtime. Every method enforces
/// its own absolute deadline (see `AgentsRuntimeConfig`); none retries
/// silently — retry policy is a Queue-level decision.
#[async_trait]
pub trait AgentRuntimeClient: Send + Sync {
    async fn execute(&self, req: ExecuteRequest) -> OrchestratorResult<ExecuteResponse>;
    async fn abort(&self, task_id: Uuid) -> OrchestratorResult<()>;
    async fn health(&self) -> OrchestratorResult<HealthResponse>;
    /// Open a streaming chat turn for `conversation_id`. Each stream item is
    /// one text delta as the upstream model produces it.
    async fn chat(&self, conversation_id: Uuid, message: &str) -> OrchestratorResult<ChatStream>;
}

/// Second-opinion complexity assessor, consulted by the Task Router.
/// A concrete adapter may route this through the same agent runtime using
/// a small cloud model, or return `Ok(None)` when unavailable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticAssessment {
    pub complexity: u8,
    pub reasoning: String,
    pub factors: Vec<String>,
}

#[async_trait]
pub trait SemanticComplexityAssessor: Send + Sync {
    async fn assess(&self, description: &str) -> OrchestratorResult<Option<SemanticAssessment>>;
}

/// Decomposition of a mission prompt into an ordered list of subtask specs.
#[async_trait]
pub trait MissionDecomposer: Send + Sync {
    async fn decompose(
        &self,
        prompt: &str,
        language: &str,
    ) -> OrchestratorResult<Vec<crate::domain::models::SubtaskSpec>>;
}
