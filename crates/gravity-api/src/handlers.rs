//! Route handler functions for all API endpoints.
//!
//! Handlers validate the request shape, delegate to the session manager
//! and map its errors through [`ApiError`].

use std::time::Duration;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use gravity_action::PendingAction;
use gravity_chat::{ConfirmResponse, SessionSummary, SubmitResponse, Turn};
use gravity_connector::ConnectorStatus;

use crate::error::ApiError;
use crate::state::AppState;

const MAX_SESSION_ID_LEN: usize = 128;

// =============================================================================
// Request and response types
// =============================================================================

#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfirmRequest {
    pub action_id: String,
    pub approved: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TurnsResponse {
    pub session_id: String,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionsResponse {
    pub sessions: Vec<SessionSummary>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub uptime_secs: u64,
    pub collection: String,
    /// `None` when the collection cannot be read.
    pub indexed_points: Option<usize>,
    pub connectors: Vec<ConnectorStatus>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ProbeResponse {
    pub status: String,
}

fn check_session_id(session_id: &str) -> Result<(), ApiError> {
    let valid = !session_id.is_empty()
        && session_id.len() <= MAX_SESSION_ID_LEN
        && session_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(ApiError::BadRequest(format!(
            "session id must be 1-{} characters of [A-Za-z0-9._-]",
            MAX_SESSION_ID_LEN
        )))
    }
}

// =============================================================================
// Sessions
// =============================================================================

/// POST /sessions/{session_id}/messages
pub async fn submit_message(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    payload: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<Json<SubmitResponse>, ApiError> {
    check_session_id(&session_id)?;
    let Json(request) = payload?;
    let response = state
        .sessions
        .submit_message(&session_id, &request.message)
        .await?;
    Ok(Json(response))
}

/// POST /sessions/{session_id}/actions/confirm
pub async fn confirm_action(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    payload: Result<Json<ConfirmRequest>, JsonRejection>,
) -> Result<Json<ConfirmResponse>, ApiError> {
    check_session_id(&session_id)?;
    let Json(request) = payload?;
    if request.action_id.trim().is_empty() {
        return Err(ApiError::BadRequest("action_id must not be empty".into()));
    }
    let response = state
        .sessions
        .confirm_action(&session_id, request.action_id.trim(), request.approved)
        .await?;
    Ok(Json(response))
}

/// GET /sessions/{session_id}/turns
pub async fn session_turns(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<TurnsResponse>, ApiError> {
    let turns = state
        .sessions
        .history(&session_id)?
        .ok_or_else(|| ApiError::NotFound(format!("session {} not found", session_id)))?;
    Ok(Json(TurnsResponse { session_id, turns }))
}

/// GET /sessions/{session_id}/actions/{action_id}
pub async fn get_action(
    State(state): State<AppState>,
    Path((session_id, action_id)): Path<(String, String)>,
) -> Result<Json<PendingAction>, ApiError> {
    state
        .sessions
        .pending_action(&session_id, &action_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("action {} not found", action_id)))
}

/// GET /sessions
pub async fn list_sessions(
    State(state): State<AppState>,
) -> Result<Json<SessionsResponse>, ApiError> {
    let sessions = state.sessions.list_sessions()?;
    Ok(Json(SessionsResponse { sessions }))
}

// =============================================================================
// Probes
// =============================================================================

/// GET /health - always 200; `status` is "degraded" when the collection
/// cannot be read or a connector does not answer its ping.
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let collection = state.config.vector.collection.clone();
    let indexed_points = state
        .store
        .collection_info(&collection)
        .await
        .ok()
        .map(|info| info.points_count);

    let timeout = Duration::from_millis(state.config.retrieval.source_timeout_ms);
    let connectors = state.registry.probe(timeout).await;

    let healthy = indexed_points.is_some() && connectors.iter().all(|c| c.connected);
    let status = if healthy { "ok" } else { "degraded" };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        collection,
        indexed_points,
        connectors,
    })
}

/// GET /ready - 200 once the vector collection exists.
pub async fn ready(State(state): State<AppState>) -> Result<Json<ProbeResponse>, ApiError> {
    state
        .store
        .collection_info(&state.config.vector.collection)
        .await
        .map_err(|e| ApiError::ServiceUnavailable(e.to_string()))?;
    Ok(Json(ProbeResponse {
        status: "ready".to_string(),
    }))
}

/// GET /live
pub async fn live() -> (StatusCode, Json<ProbeResponse>) {
    (
        StatusCode::OK,
        Json(ProbeResponse {
            status: "alive".to_string(),
        }),
    )
}
