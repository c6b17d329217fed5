//! HTTP endpoints: catch-up reads, event ingress, and health.
//!
//! The WebSocket channel is delivery-only; reconciliation happens over plain
//! HTTP so a device can page through its gap with simple requests:
//!
//! ```text
//! GET  /workspaces/{id}/events?since=10&limit=500   catch-up page
//! POST /workspaces/{id}/events                      publish (append + push)
//! GET  /health                                      liveness + broker flavor
//! ```
//!
//! Both workspace routes require a bearer token whose claims cover the
//! workspace in the path. The identity fields of a published event come from
//! the token, never from the request body.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

use beacon_core::{
    validate_since_sequence, EventDraft, WorkspaceEvent, DEFAULT_CATCHUP_LIMIT, MAX_CATCHUP_LIMIT,
};
use beacon_sync::ContextGuard;

use crate::auth::{extract_bearer_token, Claims};
use crate::error::HubError;
use crate::state::AppState;

// =============================================================================
// Request/Response Types
// =============================================================================

/// Query parameters for the catch-up endpoint.
#[derive(Debug, Deserialize)]
pub struct CatchUpParams {
    /// Replay events with sequence strictly greater than this. Defaults to 0
    /// (the whole log).
    #[serde(default)]
    pub since: i64,

    /// Page size cap.
    pub limit: Option<i64>,
}

/// Body of a publish request. Identity comes from the token.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub event_type: String,
    pub entity_type: String,
    pub entity_id: String,
    pub payload: String,
}

/// Health response body.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub broker: &'static str,
    pub heartbeat_interval_secs: u64,
    pub live_sessions: usize,
    pub database: &'static str,
}

// =============================================================================
// Handlers
// =============================================================================

/// GET /workspaces/{workspace_id}/events - catch-up page, ordered by
/// sequence, bounded by `limit`.
pub async fn catch_up(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
    Query(params): Query<CatchUpParams>,
    headers: HeaderMap,
) -> Result<Json<Vec<WorkspaceEvent>>, HubError> {
    let claims = authorize(&state, &headers, &workspace_id)?;
    let _ctx = ContextGuard::bind(&workspace_id, &claims.device_id);

    validate_since_sequence(params.since)
        .map_err(|e| HubError::BadRequest(format!("since: {e}")))?;

    let limit = params
        .limit
        .unwrap_or(DEFAULT_CATCHUP_LIMIT)
        .clamp(1, MAX_CATCHUP_LIMIT);

    let events = state
        .db
        .events()
        .range_after(&workspace_id, params.since, limit)
        .await?;

    debug!(
        workspace_id,
        since = params.since,
        returned = events.len(),
        "Catch-up page served"
    );

    Ok(Json(events))
}

/// POST /workspaces/{workspace_id}/events - append and push one event.
pub async fn publish(
    State(state): State<Arc<AppState>>,
    Path(workspace_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<PublishRequest>,
) -> Result<impl IntoResponse, HubError> {
    let claims = authorize(&state, &headers, &workspace_id)?;
    let _ctx = ContextGuard::bind(&workspace_id, &claims.device_id);

    let draft = EventDraft::new(
        body.event_type,
        body.entity_type,
        body.entity_id,
        body.payload,
        claims.device_id.clone(),
        claims.sub.clone(),
    );

    let event = state.publisher.publish(&workspace_id, &draft).await?;

    Ok((StatusCode::CREATED, Json(event)))
}

/// GET /health - liveness, resolved broker flavor, and database reachability.
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let database = if state.db.health_check().await {
        "ok"
    } else {
        "degraded"
    };

    Json(HealthResponse {
        status: "ok",
        broker: state.broker.flavor(),
        heartbeat_interval_secs: state.broker.heartbeat_interval_secs(),
        live_sessions: state.presence.session_count(),
        database,
    })
}

// =============================================================================
// Auth Helper
// =============================================================================

/// Checks the bearer token and its workspace claim.
fn authorize(
    state: &AppState,
    headers: &HeaderMap,
    workspace_id: &str,
) -> Result<Claims, HubError> {
    let header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| HubError::AuthFailed("Missing Authorization header".into()))?;

    let token = extract_bearer_token(header)
        .ok_or_else(|| HubError::AuthFailed("Expected a bearer token".into()))?;

    state.jwt.authorize_workspace(token, workspace_id)
}
