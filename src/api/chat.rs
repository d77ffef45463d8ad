//! Chat turns. The reply streams through the event bus (observed over the
//! WebSocket `conversation:{id}` room or `all`), so this route only confirms
//! the turn was accepted and kicks off the streaming task in the background —
//! mirroring the non-blocking retry pattern used by the validation routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::api::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub conversation_id: Uuid,
    pub message: String,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/chat", post(send_chat))
}

async fn send_chat(State(state): State<AppState>, Json(req): Json<ChatRequest>) -> StatusCode {
    let chat = state.chat.clone();
    tokio::spawn(async move {
        if let Err(err) = chat.send(req.conversation_id, &req.message).await {
            tracing::warn!(error = %err, conversation_id = %req.conversation_id, "chat turn failed");
        }
    });
    StatusCode::ACCEPTED
}
