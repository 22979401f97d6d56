//! CLI command handlers.

pub mod body;
pub mod chunks;
pub mod config;
pub mod create;
pub mod drive;
pub mod serve;
pub mod status;
pub mod sweep;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;

use inkstream_config::{InkstreamConfig, LoadedConfig};
use inkstream_core::{
    DriveConfig, FlushPolicy, SentenceBoundary, SharedStreamStore, SweeperConfig,
};
use inkstream_store::SqliteStreamStore;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Merged configuration and where it came from.
    pub loaded: LoadedConfig,
    /// Directory holding the database.
    pub data_dir: PathBuf,
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
}

impl Context {
    pub fn config(&self) -> &InkstreamConfig {
        &self.loaded.config
    }

    /// Open the configured SQLite store.
    pub fn open_store(&self) -> Result<SharedStreamStore> {
        let path = self.config().storage().database_path(&self.data_dir);
        if self.verbose {
            eprintln!("Database: {}", path.display());
        }
        Ok(Arc::new(SqliteStreamStore::open(&path)?))
    }
}

/// Drive timeout and flush policy from `[drive]` and `[flush]`.
pub fn drive_config(config: &InkstreamConfig) -> Result<DriveConfig> {
    let flush = config.flush();
    let policy = FlushPolicy::default()
        .with_max_buffer_bytes(flush.max_buffer_bytes)
        .with_max_buffer_age(flush.max_buffer_age())
        .with_boundary(SentenceBoundary::new(flush.terminator_chars()?));

    Ok(DriveConfig::default()
        .with_timeout(config.drive().timeout())
        .with_flush(policy))
}

pub fn sweeper_config(config: &InkstreamConfig) -> SweeperConfig {
    let sweeper = config.sweeper();
    SweeperConfig::default()
        .with_interval(sweeper.interval())
        .with_stale_after(sweeper.stale_after())
}

/// Print a value as pretty JSON.
pub fn print_json(value: &impl serde::Serialize) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
