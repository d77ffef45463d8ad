//! Ports: the trait boundaries between domain/services and the outside
//! world (persistence, the external agent runtime, the pub/sub bridge).
//! Concrete implementations live under `adapters`.

pub mod agent_runtime;
pub mod errors;
pub mod event_sink;
pub mod store;

pub use agent_runtime::{
    AgentRuntimeClient, ChatStream, ExecuteMetrics, ExecuteRequest, ExecuteResponse, HealthResponse,
    MissionDecomposer, SemanticAssessment, SemanticComplexityAssessor,
};
pub use errors::{OrchestratorError, OrchestratorResult};
pub use event_sink::ExternalEventSink;
pub use store::{
    AgentRepository, BudgetRepository, ExecutionLogRepository, FileLockRepository,
    MissionRepository, TaskFilter, TaskRepository,
};
