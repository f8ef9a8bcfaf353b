//! REST API handlers for the Arbor server

use std::sync::Arc;

use arbor_core::{Id, QueryError, TreeNode, ViewSettings, VisibilityStatus};
use arbor_visibility::{FilteredHierarchy, FilteredNode, VisibilityError};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::ServerState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Debug, Deserialize)]
pub struct SetVisibilityRequest {
    pub node: TreeNode,
    pub visible: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectModelsResponse {
    pub subject_id: Id,
    pub model_ids: Vec<Id>,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct InvalidateResponse {
    pub generation: u64,
}

/// Failure returned as `{"error": ...}`
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// The hierarchy source failed
    Upstream(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(e: QueryError) -> Self {
        ApiError::Upstream(e.to_string())
    }
}

impl From<VisibilityError> for ApiError {
    fn from(e: VisibilityError) -> Self {
        ApiError::Upstream(e.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            ApiError::BadRequest(message) | ApiError::Upstream(message) => message,
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    let health = HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    };
    Json(health)
}

/// Current display state of the view
pub async fn get_view(State(state): State<Arc<ServerState>>) -> Json<ViewSettings> {
    Json(state.view.settings())
}

/// Visibility status of one node; query failures come back as a disabled status
pub async fn get_status(
    State(state): State<Arc<ServerState>>,
    Json(node): Json<TreeNode>,
) -> Json<VisibilityStatus> {
    Json(state.engine.status(&node).await)
}

pub async fn set_visibility(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<SetVisibilityRequest>,
) -> Result<StatusCode, ApiError> {
    state
        .engine
        .set_visible(&request.node, request.visible)
        .await
        .inspect_err(|e| warn!("Visibility change for {:?} failed: {}", request.node.key, e))?;
    Ok(StatusCode::NO_CONTENT)
}

/// Restrict subject aggregation to a filtered tree
pub async fn set_filter(
    State(state): State<Arc<ServerState>>,
    Json(roots): Json<Vec<FilteredNode>>,
) -> StatusCode {
    state.engine.set_filtered_scope(Some(FilteredHierarchy::from_roots(roots)));
    StatusCode::NO_CONTENT
}

pub async fn clear_filter(State(state): State<Arc<ServerState>>) -> StatusCode {
    state.engine.set_filtered_scope(None);
    StatusCode::NO_CONTENT
}

pub async fn subject_models(
    State(state): State<Arc<ServerState>>,
    Path(id): Path<String>,
) -> Result<Json<SubjectModelsResponse>, ApiError> {
    let subject_id: Id = id.parse().map_err(|e| ApiError::BadRequest(format!("{}", e)))?;
    let model_ids = state.cache.subject_models(subject_id).await?;
    Ok(Json(SubjectModelsResponse { subject_id, model_ids }))
}

/// Drop every cached hierarchy fact
pub async fn invalidate(State(state): State<Arc<ServerState>>) -> Json<InvalidateResponse> {
    state.cache.invalidate();
    let generation = state.cache.generation();
    info!("Cache invalidated over HTTP (generation {})", generation);
    Json(InvalidateResponse { generation })
}
