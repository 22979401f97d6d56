//! Health check endpoint.
//!
//! Reports the crate version and whether the stream store answers queries.
//! An unreachable store turns the response into `503` so load balancers stop
//! routing drives to this instance.

use axum::{Json, Router, extract::State, http::StatusCode, routing::get};
use serde::{Deserialize, Serialize};

use crate::state::AppState;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` or `degraded`.
    pub status: String,
    pub version: String,
    /// `ok`, or the storage error.
    pub storage: String,
}

pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (code, status, storage) = match state.lifecycle.store().ping().await {
        Ok(()) => (StatusCode::OK, "ok", "ok".to_string()),
        Err(e) => {
            tracing::warn!(error = %e, "Health check: stream store unreachable");
            (StatusCode::SERVICE_UNAVAILABLE, "degraded", e.to_string())
        }
    };

    (
        code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            storage,
        }),
    )
}

/// Create health check routes.
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
