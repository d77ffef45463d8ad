//! Shared state handed to every HTTP handler.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::domain::models::AppConfig;
use crate::domain::ports::{AgentRepository, ExecutionLogRepository, MissionRepository, TaskRepository};
use crate::services::{
    AsyncValidationPipeline, BudgetLedger, ChatService, EventBus, MissionOrchestrator, RateTable,
    StuckTaskRecovery, TaskQueueService,
};

#[derive(Clone)]
pub struct AppState {
    pub tasks: Arc<dyn TaskRepository>,
    pub agents: Arc<dyn AgentRepository>,
    pub execution_logs: Arc<dyn ExecutionLogRepository>,
    pub missions: Arc<dyn MissionRepository>,
    pub queue: Arc<TaskQueueService>,
    pub mission_orchestrator: Arc<MissionOrchestrator>,
    pub validation: Arc<AsyncValidationPipeline>,
    pub stuck_recovery: Arc<StuckTaskRecovery>,
    pub chat: Arc<ChatService>,
    pub budget: BudgetLedger,
    pub events: EventBus,
    pub rate_table: RateTable,
    pub config: Arc<AppConfig>,
    /// Root shutdown token; cloned per in-flight dispatch so a server
    /// shutdown cancels any execution still waiting on the agent runtime.
    pub cancel: CancellationToken,
}
