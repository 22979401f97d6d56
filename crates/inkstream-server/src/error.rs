//! Error types for the server.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use inkstream_core::{DriveError, LifecycleError, StoreError};

/// Server error type.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Resource not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Bad request.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// The stream was already claimed by another drive.
    #[error("Conflict: {0}")]
    AlreadyDriven(String),

    /// Database/storage error.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => ServerError::NotFound(format!("Stream {}", id)),
            StoreError::StreamClosed { .. } | StoreError::Fenced(_) => {
                ServerError::AlreadyDriven(e.to_string())
            }
            other => ServerError::Storage(other.to_string()),
        }
    }
}

impl From<LifecycleError> for ServerError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::NotFound(id) => ServerError::NotFound(format!("Stream {}", id)),
            LifecycleError::AlreadyDriven { .. } => ServerError::AlreadyDriven(e.to_string()),
            LifecycleError::InvalidTransition { .. } => ServerError::Internal(e.to_string()),
            LifecycleError::Store(inner) => inner.into(),
        }
    }
}

impl From<DriveError> for ServerError {
    fn from(e: DriveError) -> Self {
        match e {
            DriveError::NotFound(id) => ServerError::NotFound(format!("Stream {}", id)),
            DriveError::AlreadyDriven { .. } => ServerError::AlreadyDriven(e.to_string()),
            DriveError::Storage { .. } => ServerError::Storage(e.to_string()),
            DriveError::Lifecycle(inner) => inner.into(),
        }
    }
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ServerError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ServerError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ServerError::AlreadyDriven(_) => (StatusCode::CONFLICT, "already_driven"),
            ServerError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
            ServerError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
        };

        let message = self.to_string();

        match &self {
            ServerError::Storage(_) | ServerError::Internal(_) => {
                tracing::error!(status = %status, code, error = %message, "Server error");
            }
            _ => {
                tracing::warn!(status = %status, code, error = %message, "Client error");
            }
        }

        let body = ErrorResponse {
            code: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use inkstream_core::{StreamId, StreamStatus};

    #[test]
    fn test_already_driven_maps_to_conflict() {
        let err: ServerError = DriveError::AlreadyDriven {
            stream_id: StreamId::from_string("s1"),
            status: StreamStatus::Streaming,
        }
        .into();
        assert_eq!(err.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_store_not_found_maps_to_404() {
        let err: ServerError = StoreError::NotFound("s1".to_string()).into();
        assert!(matches!(err, ServerError::NotFound(_)));
        assert_eq!(err.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_storage_failure_maps_to_500() {
        let err: ServerError = DriveError::Storage {
            stream_id: StreamId::from_string("s1"),
            source: StoreError::Corrupt("bad row".to_string()),
        }
        .into();
        assert_eq!(
            err.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
