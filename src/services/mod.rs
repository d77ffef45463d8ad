//! Application services: the orchestrator's business logic, independent of
//! transport (HTTP) and storage (SQLite) concerns.

pub mod async_validation;
pub mod budget_ledger;
pub mod chat_service;
pub mod cost_calculator;
pub mod event_bus;
pub mod file_lock_manager;
pub mod mission_orchestrator;
pub mod rate_governor;
pub mod resource_pool;
pub mod stuck_task_recovery;
pub mod task_queue_service;
pub mod task_router;

pub use async_validation::{
    AsyncValidationPipeline, CommandRunner, ShellCommandRunner, ValidationRecord, ValidationState,
    ValidationStatus,
};
pub use budget_ledger::BudgetLedger;
pub use chat_service::ChatService;
pub use cost_calculator::{aggregate, cost_cents, CostSummary, ModelRate, RateTable};
pub use event_bus::EventBus;
pub use file_lock_manager::FileLockManager;
pub use mission_orchestrator::MissionOrchestrator;
pub use rate_governor::{resolve_tier, RateGovernor, RateGovernorConfig};
pub use resource_pool::ResourcePool;
pub use stuck_task_recovery::StuckTaskRecovery;
pub use task_queue_service::{DispatchOverrides, TaskQueueService};
pub use task_router::TaskRouter;
