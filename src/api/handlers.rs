use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};

use crate::build::BuildRun;

use super::AppState;
use super::errors::AppError;

// --- Request/Response types ---

#[derive(Deserialize)]
pub struct TriggerRequest {
    /// Kind of content change, e.g. "create", "update", "delete".
    pub action: String,
    #[serde(default)]
    pub article_id: String,
}

#[derive(Serialize)]
pub struct TriggerResponse {
    pub accepted: bool,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub builds_enabled: bool,
}

// --- Handlers ---

/// GET /api/build/status
pub async fn build_status(State(state): State<Arc<AppState>>) -> Json<BuildRun> {
    Json(state.store.snapshot())
}

/// POST /api/build/trigger
///
/// Always answers 202 for a well-formed request; whether a build actually
/// ran is only visible through the status endpoint.
pub async fn trigger_build(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TriggerRequest>,
) -> Result<(StatusCode, Json<TriggerResponse>), AppError> {
    let action = req.action.trim();
    if action.is_empty() {
        return Err(AppError::BadRequest("'action' is required".to_string()));
    }

    state.trigger.trigger(action, req.article_id.trim());

    Ok((StatusCode::ACCEPTED, Json(TriggerResponse { accepted: true })))
}

/// GET /health
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        builds_enabled: state.trigger.is_enabled(),
    })
}
