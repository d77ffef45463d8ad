//! WebSocket event stream: forwards `UnifiedEvent`s published on the event
//! bus to connected clients as JSON text frames, scoped to the room the
//! client subscribed to (`task:{id}`, `mission:{id}`, or `all`).

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::api::state::AppState;
use crate::domain::models::UnifiedEvent;

#[derive(Debug, Deserialize)]
pub struct WsQueryParams {
    /// `task:{id}`, `mission:{id}`, or `all` (default when omitted).
    #[serde(default)]
    pub room: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new().route("/api/v1/ws/events", get(ws_events))
}

async fn ws_events(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WsQueryParams>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params.room))
}

async fn handle_socket(mut socket: WebSocket, state: AppState, room: Option<String>) {
    let mut receiver = state.events.subscribe();
    loop {
        tokio::select! {
            result = receiver.recv() => {
                match result {
                    Ok(event) => {
                        if !in_room(&state, &event, room.as_deref()).await {
                            continue;
                        }
                        let json = serde_json::to_string(&event).unwrap_or_default();
                        if socket.send(Message::Text(json)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        let warning = format!("{{\"type\":\"lagged\",\"missed_events\":{n}}}");
                        if socket.send(Message::Text(warning)).await.is_err() {
                            break;
                        }
                    }
                }
            }
            msg = socket.recv() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        if socket.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    _ => {}
                }
            }
        }
    }
}

/// `None` or `"all"` subscribes to everything. `task:{id}` matches exactly.
/// `mission:{id}` resolves the event's task (if any) to its parent mission
/// and matches on that, since no event carries a mission id directly.
async fn in_room(state: &AppState, event: &UnifiedEvent, room: Option<&str>) -> bool {
    let Some(room) = room else { return true };
    if room == "all" {
        return true;
    }
    if let Some(event_room) = event.kind.room() {
        if event_room == room {
            return true;
        }
    }
    if let Some(mission_id) = room.strip_prefix("mission:").and_then(|s| Uuid::parse_str(s).ok()) {
        if let Some(task_id) = event.kind.task_id() {
            if let Ok(Some(task)) = state.tasks.get(task_id).await {
                return task.parent_task_id == Some(mission_id);
            }
        }
    }
    false
}
