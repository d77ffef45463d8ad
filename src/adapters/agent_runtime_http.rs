//! HTTP client for the external agent runtime, plus an in-memory test
//! double used by service unit tests.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as ReqwestClient;
use uuid::Uuid;

use crate::adapters::sse_stream::SseEventStream;
use crate::domain::models::SubtaskSpec;
use crate::domain::ports::{
    AgentRuntimeClient, ChatStream, ExecuteMetrics, ExecuteRequest, ExecuteResponse, HealthResponse,
    MissionDecomposer, OrchestratorError, OrchestratorResult, SemanticAssessment,
    SemanticComplexityAssessor,
};

/// HTTP client for the external agent runtime. Every call carries its own
/// absolute deadline rather than relying on the shared client timeout, so a
/// slow execute doesn't also blow the budget for an unrelated health check.
pub struct HttpAgentRuntime {
    http_client: ReqwestClient,
    base_url: String,
    execute_timeout: Duration,
    health_timeout: Duration,
}

impl HttpAgentRuntime {
    pub fn new(base_url: String, execute_timeout: Duration, health_timeout: Duration) -> OrchestratorResult<Self> {
        let http_client = ReqwestClient::builder()
            .pool_max_idle_per_host(10)
            .tcp_nodelay(true)
            .build()
            .map_err(|e| OrchestratorError::Internal(format!("failed to build http client: {e}")))?;
        Ok(Self {
            http_client,
            base_url,
            execute_timeout,
            health_timeout,
        })
    }
}

#[async_trait]
impl AgentRuntimeClient for HttpAgentRuntime {
    async fn execute(&self, req: ExecuteRequest) -> OrchestratorResult<ExecuteResponse> {
        let url = format!("{}/execute", self.base_url);
        let fut = self.http_client.post(&url).json(&req).send();
        let response = tokio::time::timeout(self.execute_timeout, fut)
            .await
            .map_err(|_| OrchestratorError::Upstream("execute request timed out".to_string()))?
            .map_err(|e| OrchestratorError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::Upstream(format!(
                "agent runtime returned status {}",
                response.status()
            )));
        }
        response
            .json::<ExecuteResponse>()
            .await
            .map_err(|e| OrchestratorError::Upstream(format!("malformed execute response: {e}")))
    }

    async fn abort(&self, task_id: Uuid) -> OrchestratorResult<()> {
        let url = format!("{}/tasks/{}/abort", self.base_url, task_id);
        let fut = self.http_client.post(&url).send();
        let response = tokio::time::timeout(self.execute_timeout, fut)
            .await
            .map_err(|_| OrchestratorError::Upstream("abort request timed out".to_string()))?
            .map_err(|e| OrchestratorError::Upstream(e.to_string()))?;
        if !response.status().is_success() {
            return Err(OrchestratorError::Upstream(format!(
                "agent runtime returned status {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn health(&self) -> OrchestratorResult<HealthResponse> {
        let url = format!("{}/health", self.base_url);
        let fut = self.http_client.get(&url).send();
        let response = tokio::time::timeout(self.health_timeout, fut)
            .await
            .map_err(|_| OrchestratorError::Upstream("health check timed out".to_string()))?
            .map_err(|e| OrchestratorError::Upstream(e.to_string()))?;
        response
            .json::<HealthResponse>()
            .await
            .map_err(|e| OrchestratorError::Upstream(format!("malformed health response: {e}")))
    }

    async fn chat(&self, conversation_id: Uuid, message: &str) -> OrchestratorResult<ChatStream> {
        let url = format!("{}/chat", self.base_url);
        let response = self
            .http_client
            .post(&url)
            .json(&ChatRequestBody { conversation_id, message })
            .send()
            .await
            .map_err(|e| OrchestratorError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::Upstream(format!(
                "agent runtime returned status {} from chat",
                response.status()
            )));
        }

        let events = SseEventStream::new(response.bytes_stream());
        let deltas = events.filter_map(|event| async move {
            match event {
                Ok(e) if e.event_type == "content_block_delta" => e
                    .data
                    .get("delta")
                    .and_then(|d| d.get("text"))
                    .and_then(|t| t.as_str())
                    .map(|s| Ok(s.to_string())),
                Ok(_) => None,
                Err(err) => Some(Err(err)),
            }
        });
        Ok(Box::pin(deltas))
    }
}

#[derive(serde::Serialize)]
struct ChatRequestBody<'a> {
    conversation_id: Uuid,
    message: &'a str,
}

#[derive(serde::Serialize)]
struct DecomposeRequest<'a> {
    prompt: &'a str,
    language: &'a str,
}

#[derive(serde::Deserialize)]
struct DecomposeResponse {
    subtasks: Vec<SubtaskSpec>,
}

#[async_trait]
impl MissionDecomposer for HttpAgentRuntime {
    async fn decompose(&self, prompt: &str, language: &str) -> OrchestratorResult<Vec<SubtaskSpec>> {
        let url = format!("{}/decompose", self.base_url);
        let fut = self.http_client.post(&url).json(&DecomposeRequest { prompt, language }).send();
        let response = tokio::time::timeout(self.execute_timeout, fut)
            .await
            .map_err(|_| OrchestratorError::Upstream("decompose request timed out".to_string()))?
            .map_err(|e| OrchestratorError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(OrchestratorError::Upstream(format!(
                "agent runtime returned status {} from decompose",
                response.status()
            )));
        }
        let parsed: DecomposeResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::Upstream(format!("malformed decompose response: {e}")))?;
        Ok(parsed.subtasks)
    }
}

#[derive(serde::Serialize)]
struct AssessComplexityRequest<'a> {
    description: &'a str,
}

#[async_trait]
impl SemanticComplexityAssessor for HttpAgentRuntime {
    async fn assess(&self, description: &str) -> OrchestratorResult<Option<SemanticAssessment>> {
        let url = format!("{}/assess-complexity", self.base_url);
        let fut = self.http_client.post(&url).json(&AssessComplexityRequest { description }).send();
        let response = match tokio::time::timeout(self.health_timeout, fut).await {
            Ok(Ok(resp)) => resp,
            // A slow or unavailable semantic assessor degrades to the
            // router's heuristic score rather than blocking the task.
            Ok(Err(_)) | Err(_) => return Ok(None),
        };
        if !response.status().is_success() {
            return Ok(None);
        }
        Ok(response.json::<SemanticAssessment>().await.ok())
    }
}

/// Scripted agent runtime for service tests: responses are queued in order
/// and popped on each `execute` call. Panics (via the unwrap on an empty
/// queue) if a test under-provisions responses, which is intentional — a
/// service calling `execute` more times than the test expects is itself
/// a bug worth surfacing.
pub struct StaticAgentRuntime {
    responses: Mutex<VecDeque<OrchestratorResult<ExecuteResponse>>>,
}

impl StaticAgentRuntime {
    pub fn new() -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
        }
    }

    pub fn success(output: serde_json::Value, time_spent_ms: i64, input_tokens: u64, output_tokens: u64) -> Self {
        let rt = Self::new();
        rt.push_success(output, time_spent_ms, input_tokens, output_tokens);
        rt
    }

    pub fn failure(error_message: impl Into<String>) -> Self {
        let rt = Self::new();
        rt.push_failure(error_message);
        rt
    }

    pub fn push_success(&self, output: serde_json::Value, time_spent_ms: i64, input_tokens: u64, output_tokens: u64) {
        self.responses.lock().unwrap().push_back(Ok(ExecuteResponse {
            success: true,
            execution_id: Uuid::new_v4(),
            output: Some(output),
            metrics: ExecuteMetrics {
                api_credits_used: 0.0,
                time_spent_ms,
                iterations: 1,
                input_tokens: Some(input_tokens),
                output_tokens: Some(output_tokens),
            },
            error: None,
        }));
    }

    pub fn push_failure(&self, error_message: impl Into<String>) {
        self.responses.lock().unwrap().push_back(Ok(ExecuteResponse {
            success: false,
            execution_id: Uuid::new_v4(),
            output: None,
            metrics: ExecuteMetrics::default(),
            error: Some(error_message.into()),
        }));
    }
}

impl Default for StaticAgentRuntime {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AgentRuntimeClient for StaticAgentRuntime {
    async fn execute(&self, _req: ExecuteRequest) -> OrchestratorResult<ExecuteResponse> {
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(OrchestratorError::Upstream("no scripted response queued".to_string())))
    }

    async fn abort(&self, _task_id: Uuid) -> OrchestratorResult<()> {
        Ok(())
    }

    async fn health(&self) -> OrchestratorResult<HealthResponse> {
        Ok(HealthResponse {
            status: "ok".to_string(),
            local: true,
            cloud: true,
            remote: None,
        })
    }

    async fn chat(&self, _conversation_id: Uuid, message: &str) -> OrchestratorResult<ChatStream> {
        let reply = format!("echo: {message}");
        Ok(Box::pin(futures::stream::iter(vec![Ok(reply)])))
    }
}
