//! Error kinds shared across services, adapters, and the HTTP façade.
//!
//! The façade maps every variant to a stable `{error, message}` JSON body;
//! see `api::error`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("{0} not found: {1}")]
    NotFound(&'static str, Uuid),

    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("admission denied: {0}")]
    AdmissionDenied(String),

    #[error("budget exceeded: {0}")]
    BudgetExceeded(String),

    #[error("rate limited")]
    RateLimited,

    #[error("upstream agent runtime error: {0}")]
    Upstream(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;
