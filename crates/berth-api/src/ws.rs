//! WebSocket push adapter.
//!
//! Clients subscribe with `?topics=browser.*,proxy.*` and receive matching
//! bus events as JSON text frames. A slow client loses events at the bus
//! (bounded mailbox) rather than ever stalling producers.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::Response;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct EventsQuery {
    /// Comma-separated topic patterns; empty means everything.
    pub topics: Option<String>,
}

pub async fn events_upgrade(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
    ws: WebSocketUpgrade,
) -> Response {
    let patterns: Vec<String> = query
        .topics
        .unwrap_or_default()
        .split(',')
        .filter(|t| !t.trim().is_empty())
        .map(|t| t.trim().to_string())
        .collect();
    ws.on_upgrade(move |socket| push_events(socket, state, patterns))
}

async fn push_events(mut socket: WebSocket, state: AppState, patterns: Vec<String>) {
    let mut subscription = state.plane.subscribe(patterns);
    debug!("ws event subscriber connected");
    loop {
        tokio::select! {
            event = subscription.next() => {
                let Some(event) = event else { break };
                let Ok(payload) = serde_json::to_string(&event) else {
                    warn!(topic = %event.topic, "failed to serialize event");
                    continue;
                };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = socket.send(Message::Pong(data)).await;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        debug!(error = %e, "ws receive error");
                        break;
                    }
                }
            }
        }
    }
    debug!(dropped = subscription.dropped(), "ws event subscriber disconnected");
}
