//! WebSocket upgrade handler and per-connection socket loops.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::state::AppState;

use super::connection::{ConnectionId, ConnectionState};
use super::message::{ClientMessage, ServerMessage};

pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(state.config.ws_send_buffer);

    let id = ConnectionId::generate();
    state.registry.register(ConnectionState::new(id, tx));
    debug!(connection = %id, "live-feed client connected");

    // Writer: drain the outbound queue onto the socket
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let json = match serde_json::to_string(&message) {
                Ok(json) => json,
                Err(e) => {
                    warn!(error = %e, "failed to serialize live-feed message");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Reader: handle subscription changes until the client goes away
    while let Some(Ok(message)) = ws_rx.next().await {
        match message {
            Message::Text(text) => handle_client_message(&state, id, text.as_str()),
            Message::Close(_) => break,
            _ => {}
        }
    }

    state.registry.unregister(id);
    writer.abort();
    debug!(connection = %id, "live-feed client disconnected");
}

fn handle_client_message(state: &AppState, id: ConnectionId, text: &str) {
    let message: ClientMessage = match serde_json::from_str(text) {
        Ok(message) => message,
        Err(e) => {
            debug!(connection = %id, error = %e, "ignoring malformed client message");
            state.registry.with_connection(id, |conn| {
                let _ = conn.sender.try_send(ServerMessage::Error {
                    message: "malformed message".to_string(),
                });
            });
            return;
        }
    };

    match message {
        ClientMessage::Subscribe { channels, vehicles } => {
            state.registry.with_connection(id, |conn| {
                conn.subscribe(&channels, &vehicles);
                let _ = conn.sender.try_send(ServerMessage::Subscribed {
                    channels: conn.subscriptions.iter().copied().collect(),
                });
            });
        }
        ClientMessage::Unsubscribe { channels, vehicles } => {
            state.registry.with_connection(id, |conn| {
                conn.unsubscribe(&channels, &vehicles);
            });
        }
        ClientMessage::Ping { timestamp } => {
            state.registry.with_connection(id, |conn| {
                let _ = conn.sender.try_send(ServerMessage::Pong { timestamp });
            });
        }
    }
}
