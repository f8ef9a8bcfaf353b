//! WebSocket handling for visibility change notifications

use std::sync::Arc;

use arbor_core::ViewSettings;
use arbor_visibility::ViewportSignal;
use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::ServerState;

/// WebSocket message types for client-server communication
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    /// Server sends the current view on connect
    View { view: ViewSettings },
    /// Server reports one burst of viewport changes
    VisibilityChanged { signals: Vec<ViewportSignal> },
    /// Server reports that the scene was reloaded
    SceneReloaded { generation: u64, entities: usize },
    /// Client asks for the current view again
    RequestView,
    Ping,
    Pong,
    Error { message: String },
}

/// Handle WebSocket upgrade requests
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<ServerState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Handle an individual WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    info!("New WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let mut rx = state.events_tx.subscribe();

    let view = WsMessage::View {
        view: state.view.settings(),
    };
    match serde_json::to_string(&view) {
        Ok(json) => {
            if sender.send(Message::Text(json)).await.is_err() {
                warn!("Failed to send initial view to WebSocket client");
                return;
            }
        }
        Err(e) => warn!("Failed to serialize view message: {}", e),
    }

    // Client requests are answered through the broadcast channel
    let state_clone = Arc::clone(&state);
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    debug!("Received WebSocket message: {}", text);
                    match serde_json::from_str::<WsMessage>(&text) {
                        Ok(ws_msg) => handle_client_message(ws_msg, &state_clone),
                        Err(e) => warn!("Failed to parse WebSocket message: {}", e),
                    }
                }
                Message::Close(_) => {
                    debug!("WebSocket client disconnected");
                    break;
                }
                _ => {}
            }
        }
    });

    let mut send_task = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if sender.send(Message::Text(msg)).await.is_err() {
                        debug!("Failed to send message to WebSocket client");
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {
                    warn!("WebSocket client lagged behind");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });

    // Wait for either task to complete
    tokio::select! {
        _ = (&mut send_task) => {
            recv_task.abort();
        }
        _ = (&mut recv_task) => {
            send_task.abort();
        }
    }

    info!("WebSocket connection closed");
}

/// Handle messages received from the WebSocket client
fn handle_client_message(msg: WsMessage, state: &ServerState) {
    let reply = match msg {
        WsMessage::RequestView => WsMessage::View {
            view: state.view.settings(),
        },
        WsMessage::Ping => WsMessage::Pong,
        other => {
            debug!("Ignoring client message: {:?}", other);
            return;
        }
    };
    if let Ok(json) = serde_json::to_string(&reply) {
        let _ = state.broadcast(json);
    }
}
