//! HTTP API server for inkstream.
//!
//! # Endpoints
//!
//! - `POST /api/v1/streams` create a pending stream
//! - `POST /api/v1/streams/{id}/drive` drive it, receiving increments as SSE
//! - `GET /api/v1/streams/{id}` durable body (text, reasoning, status)
//! - `GET /api/v1/streams/{id}/status`
//! - `GET /api/v1/streams/{id}/chunks?after=N` committed chunks past a sequence
//! - `GET /health`

pub mod config;
pub mod error;
pub mod generators;
pub mod logging;
pub mod routes;
pub mod state;

pub use config::ServerConfig;
pub use error::{ErrorResponse, Result, ServerError};
pub use generators::{ConfiguredGenerators, GeneratorFactory};
pub use logging::request_logging_middleware;
pub use state::AppState;

use std::future::Future;
use std::net::SocketAddr;

use axum::{Router, http::HeaderValue, middleware};
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

/// The inkstream HTTP server.
pub struct Server {
    state: AppState,
}

impl Server {
    /// Create a server from a pre-built application state.
    pub fn from_state(state: AppState) -> Self {
        Self { state }
    }

    /// Build the router with all routes and middleware.
    pub fn router(&self) -> Router {
        let mut router = Router::new()
            .merge(routes::health_routes())
            .nest("/api/v1", self.api_routes())
            .layer(middleware::from_fn_with_state(
                self.state.clone(),
                request_logging_middleware,
            ))
            .layer(TraceLayer::new_for_http());

        if let Some(cors) = cors_layer(&self.state.config.cors_origins) {
            router = router.layer(cors);
        }

        router.with_state(self.state.clone())
    }

    /// API routes (v1).
    fn api_routes(&self) -> Router<AppState> {
        use axum::routing::{get, post};

        Router::new()
            .route("/streams", post(routes::create_stream_handler))
            .route("/streams/{id}", get(routes::get_stream_handler))
            .route("/streams/{id}/status", get(routes::get_status_handler))
            .route("/streams/{id}/chunks", get(routes::list_chunks_handler))
            .route("/streams/{id}/drive", post(routes::drive_stream_handler))
    }

    /// Run the server on the configured address until the process exits.
    pub async fn run(self) -> Result<()> {
        let addr = self.state.config.bind_address;
        self.run_on(addr).await
    }

    /// Run the server on a specific address (useful for testing).
    pub async fn run_on(self, addr: SocketAddr) -> Result<()> {
        self.run_with_shutdown(addr, std::future::pending()).await
    }

    /// Run until `shutdown` resolves, then drain in-flight requests.
    pub async fn run_with_shutdown(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let router = self.router();

        info!("Starting server on {}", addr);

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Internal(format!("Failed to bind: {}", e)))?;

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ServerError::Internal(format!("Server error: {}", e)))?;

        Ok(())
    }

    /// Get the configured bind address.
    pub fn bind_address(&self) -> SocketAddr {
        self.state.config.bind_address
    }
}

/// CORS for the configured origins. `None` when the list is empty.
fn cors_layer(origins: &[String]) -> Option<CorsLayer> {
    if origins.is_empty() {
        return None;
    }

    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    Some(
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(allowed))
            .allow_methods(Any)
            .allow_headers(Any),
    )
}
