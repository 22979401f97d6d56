//! Application state shared across handlers.

use std::sync::Arc;

use inkstream_core::{DriveConfig, Driver, SharedStreamStore, StreamLifecycle, StreamReader};

use crate::config::ServerConfig;
use crate::generators::GeneratorFactory;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Creation and status transitions.
    pub lifecycle: StreamLifecycle,

    /// Runs generators against claimed streams.
    pub driver: Driver,

    /// Durable reconstruction for observers.
    pub reader: StreamReader,

    /// Picks the generator for each drive.
    pub generators: Arc<dyn GeneratorFactory>,

    /// Server configuration.
    pub config: Arc<ServerConfig>,
}

impl AppState {
    /// Create a new application state over `store`.
    pub fn new(
        store: SharedStreamStore,
        drive: DriveConfig,
        generators: impl GeneratorFactory + 'static,
        config: ServerConfig,
    ) -> Self {
        let lifecycle = StreamLifecycle::new(Arc::clone(&store));
        Self {
            driver: Driver::new(lifecycle.clone(), drive),
            lifecycle,
            reader: StreamReader::new(store),
            generators: Arc::new(generators),
            config: Arc::new(config),
        }
    }
}
