//! SQLite adapters implementing the Store Gateway ports.

pub mod agent_repo;
pub mod budget_repo;
pub mod execution_log_repo;
pub mod file_lock_repo;
pub mod mission_repo;
pub mod pool;
pub mod task_repo;

pub use agent_repo::SqliteAgentRepository;
pub use budget_repo::SqliteBudgetRepository;
pub use execution_log_repo::SqliteExecutionLogRepository;
pub use file_lock_repo::SqliteFileLockRepository;
pub use mission_repo::SqliteMissionRepository;
pub use pool::DatabasePool;
pub use task_repo::SqliteTaskRepository;
