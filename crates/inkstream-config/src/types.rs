//! Configuration types.
//!
//! Every section is optional. Absent sections take their defaults; a section
//! present in a later layer replaces the whole section from earlier layers.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Default port for the HTTP server.
pub const DEFAULT_PORT: u16 = 8787;

/// Default bind address.
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Default database file name, relative to the data dir.
pub const DEFAULT_DATABASE: &str = "inkstream.db";

// ─────────────────────────────────────────────────────────────────────────────
// Root
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InkstreamConfig {
    pub server: Option<ServerSection>,
    pub storage: Option<StorageSection>,
    pub flush: Option<FlushSection>,
    pub drive: Option<DriveSection>,
    pub sweeper: Option<SweeperSection>,
    pub generator: Option<GeneratorSection>,
}

impl InkstreamConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    pub fn merge(&mut self, other: InkstreamConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.storage.is_some() {
            self.storage = other.storage;
        }
        if other.flush.is_some() {
            self.flush = other.flush;
        }
        if other.drive.is_some() {
            self.drive = other.drive;
        }
        if other.sweeper.is_some() {
            self.sweeper = other.sweeper;
        }
        if other.generator.is_some() {
            self.generator = other.generator;
        }
    }

    /// Copy of this config with every section filled in.
    pub fn effective(&self) -> InkstreamConfig {
        InkstreamConfig {
            server: Some(self.server()),
            storage: Some(self.storage()),
            flush: Some(self.flush()),
            drive: Some(self.drive()),
            sweeper: Some(self.sweeper()),
            generator: Some(self.generator()),
        }
    }

    pub fn server(&self) -> ServerSection {
        self.server.clone().unwrap_or_default()
    }

    pub fn storage(&self) -> StorageSection {
        self.storage.clone().unwrap_or_default()
    }

    pub fn flush(&self) -> FlushSection {
        self.flush.clone().unwrap_or_default()
    }

    pub fn drive(&self) -> DriveSection {
        self.drive.clone().unwrap_or_default()
    }

    pub fn sweeper(&self) -> SweeperSection {
        self.sweeper.clone().unwrap_or_default()
    }

    pub fn generator(&self) -> GeneratorSection {
        self.generator.clone().unwrap_or_default()
    }

    /// Check value ranges. Returns warnings for suspicious but legal settings.
    pub fn validate(&self) -> Result<Vec<String>> {
        let mut warnings = Vec::new();

        let flush = self.flush();
        if flush.max_buffer_bytes == 0 {
            return Err(ConfigError::invalid(
                "flush.max_buffer_bytes",
                "must be greater than zero",
            ));
        }
        flush.terminator_chars()?;

        let drive = self.drive();
        if drive.timeout_secs == 0 {
            return Err(ConfigError::invalid(
                "drive.timeout_secs",
                "must be greater than zero",
            ));
        }

        let sweeper = self.sweeper();
        if sweeper.enabled {
            if sweeper.interval_secs == 0 {
                return Err(ConfigError::invalid(
                    "sweeper.interval_secs",
                    "must be greater than zero",
                ));
            }
            if sweeper.stale_after_secs <= drive.timeout_secs {
                warnings.push(format!(
                    "sweeper.stale_after_secs ({}) does not exceed drive.timeout_secs ({}); \
                     quiet drives may be swept while still running",
                    sweeper.stale_after_secs, drive.timeout_secs
                ));
            }
        }

        Ok(warnings)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Address to bind to.
    pub bind: String,
    /// Port to listen on.
    pub port: u16,
    /// Enable request logging.
    pub request_logging: bool,
    /// Allowed CORS origins. Empty disables CORS.
    pub cors_origins: Vec<String>,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.to_string(),
            port: DEFAULT_PORT,
            request_logging: true,
            cors_origins: Vec::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage
// ─────────────────────────────────────────────────────────────────────────────

/// Storage configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// SQLite database path. Relative paths resolve against the data dir.
    pub database: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database: PathBuf::from(DEFAULT_DATABASE),
        }
    }
}

impl StorageSection {
    /// Absolute database path given the data dir.
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        if self.database.is_absolute() {
            self.database.clone()
        } else {
            data_dir.join(&self.database)
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Flush
// ─────────────────────────────────────────────────────────────────────────────

/// Chunk flush policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlushSection {
    pub max_buffer_bytes: usize,
    /// 0 disables age-based flushing.
    pub max_buffer_age_ms: u64,
    /// Sentence terminators, one character each.
    pub terminators: Vec<String>,
}

impl Default for FlushSection {
    fn default() -> Self {
        Self {
            max_buffer_bytes: 1024,
            max_buffer_age_ms: 2000,
            terminators: [".", "!", "?", "\n"].iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl FlushSection {
    pub fn max_buffer_age(&self) -> Option<Duration> {
        (self.max_buffer_age_ms > 0).then(|| Duration::from_millis(self.max_buffer_age_ms))
    }

    pub fn terminator_chars(&self) -> Result<Vec<char>> {
        self.terminators
            .iter()
            .map(|t| {
                let mut chars = t.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => Ok(c),
                    _ => Err(ConfigError::invalid(
                        "flush.terminators",
                        format!("'{}' is not a single character", t.escape_default()),
                    )),
                }
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Drive
// ─────────────────────────────────────────────────────────────────────────────

/// Drive configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveSection {
    /// Generation time budget.
    pub timeout_secs: u64,
    /// Capacity of the live event channel per drive.
    pub live_buffer: usize,
}

impl Default for DriveSection {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            live_buffer: 256,
        }
    }
}

impl DriveSection {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sweeper
// ─────────────────────────────────────────────────────────────────────────────

/// Stale-stream sweeper configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweeperSection {
    pub enabled: bool,
    pub interval_secs: u64,
    pub stale_after_secs: u64,
}

impl Default for SweeperSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 60,
            stale_after_secs: 600,
        }
    }
}

impl SweeperSection {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generator
// ─────────────────────────────────────────────────────────────────────────────

/// Which generator drives streams.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GeneratorKind {
    /// Echo the stream input back word by word.
    #[default]
    Echo,
    /// OpenAI-compatible chat completions.
    Openai,
}

impl std::fmt::Display for GeneratorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GeneratorKind::Echo => write!(f, "echo"),
            GeneratorKind::Openai => write!(f, "openai"),
        }
    }
}

/// Generator configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneratorSection {
    pub kind: GeneratorKind,
    pub base_url: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub system_prompt: Option<String>,
    /// Pause between words for the echo generator.
    pub word_delay_ms: u64,
}

impl Default for GeneratorSection {
    fn default() -> Self {
        Self {
            kind: GeneratorKind::Echo,
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            system_prompt: Some("You are a helpful assistant.".to_string()),
            word_delay_ms: 40,
        }
    }
}

impl GeneratorSection {
    pub fn word_delay(&self) -> Option<Duration> {
        (self.word_delay_ms > 0).then(|| Duration::from_millis(self.word_delay_ms))
    }
}
