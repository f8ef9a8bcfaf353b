//! Axum router setup for the Arbor server

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post, put},
};
use tower_http::cors::CorsLayer;

use crate::{
    ServerState,
    handlers::{
        clear_filter, get_status, get_view, health_check, invalidate, set_filter, set_visibility,
        subject_models,
    },
    websocket::ws_handler,
};

/// Create the axum router with all routes
pub fn create_router(state: Arc<ServerState>) -> Router {
    Router::new()
        // WebSocket endpoint for change notifications
        .route("/ws", get(ws_handler))
        // REST API endpoints
        .route("/api/health", get(health_check))
        .route("/api/view", get(get_view))
        .route("/api/status", post(get_status))
        .route("/api/visibility", post(set_visibility))
        .route("/api/filter", put(set_filter).delete(clear_filter))
        .route("/api/subjects/:id/models", get(subject_models))
        .route("/api/invalidate", post(invalidate))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
