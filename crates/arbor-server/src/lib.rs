//! HTTP + WebSocket server

pub mod handlers;
pub mod router;
pub mod websocket;


use std::sync::Arc;

use arbor_hierarchy::HierarchyCache;
use arbor_visibility::{ViewState, VisibilityEngine};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::websocket::WsMessage;

const EVENT_CAPACITY: usize = 100;

/// Address the server binds to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7890,
        }
    }
}

/// Shared state behind every route
pub struct ServerState {
    pub engine: Arc<VisibilityEngine>,
    pub view: Arc<ViewState>,
    pub cache: Arc<HierarchyCache>,
    /// JSON messages pushed to every WebSocket client
    pub events_tx: broadcast::Sender<String>,
    forwarder: JoinHandle<()>,
}

impl std::fmt::Debug for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerState")
            .field("engine", &self.engine)
            .field("view", &self.view)
            .field("clients", &self.events_tx.receiver_count())
            .finish()
    }
}

impl ServerState {
    /// Build the engine over `view` and `cache`; must be called within a tokio runtime.
    pub fn new(view: Arc<ViewState>, cache: Arc<HierarchyCache>) -> Self {
        let engine = Arc::new(VisibilityEngine::new(view.clone(), cache.clone()));
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let forwarder = forward_visibility_changes(&engine, events_tx.clone());
        Self {
            engine,
            view,
            cache,
            events_tx,
            forwarder,
        }
    }

    /// Send a message to all connected WebSocket clients
    pub fn broadcast(&self, message: String) -> Result<usize, broadcast::error::SendError<String>> {
        self.events_tx.send(message)
    }
}

impl Drop for ServerState {
    fn drop(&mut self) {
        self.forwarder.abort();
    }
}

/// Relay coalesced visibility changes to the WebSocket channel.
fn forward_visibility_changes(
    engine: &VisibilityEngine,
    events_tx: broadcast::Sender<String>,
) -> JoinHandle<()> {
    let mut changes = engine.on_visibility_changed();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(change) => {
                    let message = WsMessage::VisibilityChanged {
                        signals: change.signals,
                    };
                    match serde_json::to_string(&message) {
                        // No clients connected is fine
                        Ok(json) => {
                            let _ = events_tx.send(json);
                        }
                        Err(e) => debug!("Failed to serialize visibility change: {}", e),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("Visibility forwarder skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

/// The visibility server
pub struct ArborServer {
    state: Arc<ServerState>,
    config: ServerConfig,
}

impl ArborServer {
    pub fn new(state: ServerState, config: ServerConfig) -> Self {
        Self {
            state: Arc::new(state),
            config,
        }
    }

    pub fn state(&self) -> Arc<ServerState> {
        Arc::clone(&self.state)
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Bind and serve until the process is stopped.
    pub async fn start(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("Arbor server listening on http://{}", listener.local_addr()?);

        let app = router::create_router(self.state);
        axum::serve(listener, app).await?;
        Ok(())
    }
}
