//! Configuration system for inkstream.
//!
//! Provides TOML-based configuration with:
//! - Optional sections with defaults (`[server]`, `[storage]`, `[flush]`,
//!   `[drive]`, `[sweeper]`, `[generator]`)
//! - Config file layering (user config + project-local overrides)
//! - Range validation with warnings for suspicious combinations

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, data_dir, load_config, load_config_file,
    load_config_with_options, save_config, user_config_dir, user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
