//! WebSocket route handler
//!
//! Streams price updates from the broadcaster as flat JSON objects
//! (`{"bitcoin": 64250.5, ...}`).

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::AppState;

/// Create WebSocket routes
pub fn routes() -> Router<AppState> {
    Router::new().route("/ws", get(ws_handler))
}

/// WebSocket upgrade handler
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    info!("WebSocket upgrade request received");
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an established WebSocket connection
async fn handle_socket(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let (subscriber_id, mut updates) = state.broadcaster.subscribe();
    info!("{} connected", subscriber_id);

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(update) = update else { break };

                let text = match serde_json::to_string(&update) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!("Failed to serialize price update: {}", e);
                        continue;
                    }
                };

                if sender.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            incoming = receiver.next() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {
                        // The feed is push-only; client messages are ignored
                    }
                    Some(Err(e)) => {
                        debug!("{} socket error: {}", subscriber_id, e);
                        break;
                    }
                }
            }
        }
    }

    state.broadcaster.unsubscribe(subscriber_id);
}
