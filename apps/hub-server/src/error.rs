//! Hub error types and their HTTP mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Errors surfaced by the hub's HTTP and WebSocket layers.
#[derive(Debug, Error)]
pub enum HubError {
    /// Configuration problem at startup.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication or authorization failure.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The request is malformed.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Requested resource does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Database failure.
    #[error("Database error: {0}")]
    Database(#[from] beacon_db::DbError),

    /// Sync engine failure.
    #[error("Sync error: {0}")]
    Sync(#[from] beacon_sync::SyncError),

    /// Anything else.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl HubError {
    /// Stable machine-readable code for the response body.
    pub fn code(&self) -> &'static str {
        match self {
            HubError::Config(_) => "CONFIG",
            HubError::AuthFailed(_) => "AUTH_FAILED",
            HubError::BadRequest(_) => "BAD_REQUEST",
            HubError::NotFound(_) => "NOT_FOUND",
            HubError::Database(_) => "DATABASE",
            HubError::Sync(_) => "SYNC",
            HubError::Internal(_) => "INTERNAL",
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            HubError::AuthFailed(_) => StatusCode::UNAUTHORIZED,
            HubError::BadRequest(_) => StatusCode::BAD_REQUEST,
            HubError::NotFound(_) => StatusCode::NOT_FOUND,
            HubError::Sync(beacon_sync::SyncError::InvalidMessage(_)) => StatusCode::BAD_REQUEST,
            HubError::Sync(beacon_sync::SyncError::Auth(_)) => StatusCode::UNAUTHORIZED,
            HubError::Config(_)
            | HubError::Database(_)
            | HubError::Sync(_)
            | HubError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = Json(json!({
            "error": self.code(),
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            HubError::AuthFailed("nope".into()).status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            HubError::BadRequest("bad".into()).status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            HubError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_sync_error_mapping() {
        let err = HubError::Sync(beacon_sync::SyncError::Auth("expired".into()));
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);

        let err = HubError::Sync(beacon_sync::SyncError::InvalidMessage("junk".into()));
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
