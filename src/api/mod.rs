//! HTTP + WebSocket façade over the orchestrator's services.

pub mod agents;
pub mod auth;
pub mod budget;
pub mod chat;
pub mod cost_metrics;
pub mod error;
pub mod execute;
pub mod missions;
pub mod queue;
pub mod state;
pub mod tasks;
pub mod validation;
pub mod ws;

use axum::http::StatusCode;
use axum::middleware;
use axum::routing::get;
use axum::Router;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

pub use state::AppState;

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// Assemble the full router: every submodule's routes, CORS scoped to the
/// configured origins (or wide open in dev when none are listed), request
/// tracing, and the API-key gate when one is configured.
pub fn build_router(state: AppState) -> Router {
    let cors = if state.config.server.cors_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = state
            .config
            .server
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    let protected = Router::new()
        .merge(tasks::router())
        .merge(agents::router())
        .merge(queue::router())
        .merge(execute::router())
        .merge(chat::router())
        .merge(budget::router())
        .merge(cost_metrics::router())
        .merge(validation::router())
        .merge(missions::router())
        .merge(ws::router())
        .layer(middleware::from_fn_with_state(state.clone(), auth::require_api_key));

    Router::new()
        .route("/health", get(health_check))
        .merge(protected)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
