//! API-key middleware. A no-op when `ServerConfig::api_key` is unset, so
//! local development needs no credentials.

use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::middleware::Next;
use axum::response::Response;

use crate::api::state::AppState;

pub async fn require_api_key(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(expected) = &state.config.server.api_key else {
        return Ok(next.run(req).await);
    };

    let provided = req.headers().get("x-api-key").and_then(|v| v.to_str().ok());

    match provided {
        Some(token) if token == expected => Ok(next.run(req).await),
        None => Err(StatusCode::UNAUTHORIZED),
        Some(_) => Err(StatusCode::FORBIDDEN),
    }
}
