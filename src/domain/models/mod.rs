//! Domain model types: the pure data shapes the rest of the crate operates on.

pub mod agent;
pub mod budget;
pub mod config;
pub mod event;
pub mod execution_log;
pub mod file_lock;
pub mod mission;
pub mod pricing;
pub mod rate_window;
pub mod resource;
pub mod task;

pub use agent::{Agent, AgentConfig, AgentStatus, AgentType, TierOverride};
pub use budget::{BudgetConfig, BudgetHistoryEntry, BudgetState};
pub use config::{
    AgentsRuntimeConfig, AppConfig, CoolingConfig, DatabaseConfig, LogFormat, LoggingConfig,
    PricingConfig, PubsubConfig, RateLimitConfig, ReviewConfig, ServerConfig, StuckTaskConfig,
    ValidationConfig,
};
pub use event::{EventKind, SequenceCounter, SequenceNumber, UnifiedEvent};
pub use execution_log::{ExecutionAction, ExecutionLog};
pub use file_lock::FileLock;
pub use mission::{Mission, MissionAggregates, MissionStatus, SubtaskSpec};
pub use pricing::ModelRate;
pub use rate_window::{RateWindow, Tier, TierLimits, UsageEntry};
pub use resource::{ResourceSlot, ResourceTier};
pub use task::{ComplexitySource, Task, TaskStatus, TaskType};
