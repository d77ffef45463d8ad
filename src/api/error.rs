//! Maps `OrchestratorError` to a stable `{error, message}` JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::ports::OrchestratorError;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

pub struct ApiError(pub OrchestratorError);

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind) = match &self.0 {
            OrchestratorError::NotFound(_, _) => (StatusCode::NOT_FOUND, "not_found"),
            OrchestratorError::InvalidTransition(_) => (StatusCode::BAD_REQUEST, "invalid_transition"),
            OrchestratorError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
            OrchestratorError::AdmissionDenied(_) => (StatusCode::CONFLICT, "admission_denied"),
            OrchestratorError::BudgetExceeded(_) => (StatusCode::PAYMENT_REQUIRED, "budget_exceeded"),
            OrchestratorError::RateLimited => (StatusCode::TOO_MANY_REQUESTS, "rate_limited"),
            OrchestratorError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream_error"),
            OrchestratorError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            OrchestratorError::Forbidden(_) => (StatusCode::FORBIDDEN, "forbidden"),
            OrchestratorError::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            OrchestratorError::Serialization(_) => (StatusCode::BAD_REQUEST, "serialization_error"),
            OrchestratorError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };
        let body = ErrorBody { error: kind.to_string(), message: self.0.to_string() };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn not_found_maps_to_404() {
        let err = ApiError(OrchestratorError::NotFound("task", Uuid::new_v4()));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn budget_exceeded_maps_to_402() {
        let err = ApiError(OrchestratorError::BudgetExceeded("daily cap".to_string()));
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::PAYMENT_REQUIRED);
    }
}
