//! Server configuration.

use std::net::{Ipv4Addr, SocketAddr};

use inkstream_config::{DEFAULT_PORT, ServerSection};

/// Default capacity of the per-drive live event channel.
pub const DEFAULT_LIVE_BUFFER: usize = 256;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to.
    pub bind_address: SocketAddr,

    /// Enable request logging.
    pub request_logging: bool,

    /// CORS allowed origins (empty = no CORS).
    pub cors_origins: Vec<String>,

    /// Events buffered between a drive and its SSE response before the
    /// drive's live sink waits on the client.
    pub live_buffer: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: SocketAddr::from((Ipv4Addr::LOCALHOST, DEFAULT_PORT)),
            request_logging: true,
            cors_origins: Vec::new(),
            live_buffer: DEFAULT_LIVE_BUFFER,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[server]` config section.
    ///
    /// An unparsable `bind` falls back to localhost.
    pub fn from_section(section: &ServerSection) -> Self {
        let bind_address = format!("{}:{}", section.bind, section.port)
            .parse()
            .unwrap_or_else(|_| {
                tracing::warn!(bind = %section.bind, "Invalid bind address, using localhost");
                SocketAddr::from((Ipv4Addr::LOCALHOST, section.port))
            });

        Self {
            bind_address,
            request_logging: section.request_logging,
            cors_origins: section.cors_origins.clone(),
            live_buffer: DEFAULT_LIVE_BUFFER,
        }
    }

    /// Set the bind address.
    pub fn with_bind_address(mut self, addr: SocketAddr) -> Self {
        self.bind_address = addr;
        self
    }

    /// Enable or disable request logging.
    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }

    /// Set CORS allowed origins.
    pub fn with_cors_origins(mut self, origins: Vec<String>) -> Self {
        self.cors_origins = origins;
        self
    }

    pub fn with_live_buffer(mut self, capacity: usize) -> Self {
        self.live_buffer = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_section() {
        let section = ServerSection {
            bind: "0.0.0.0".to_string(),
            port: 9000,
            request_logging: false,
            cors_origins: vec!["http://localhost:5173".to_string()],
        };
        let config = ServerConfig::from_section(&section);
        assert_eq!(config.bind_address, "0.0.0.0:9000".parse().unwrap());
        assert!(!config.request_logging);
        assert_eq!(config.cors_origins.len(), 1);
    }

    #[test]
    fn test_bad_bind_falls_back_to_localhost() {
        let section = ServerSection {
            bind: "not an address".to_string(),
            ..ServerSection::default()
        };
        let config = ServerConfig::from_section(&section);
        assert!(config.bind_address.ip().is_loopback());
        assert_eq!(config.bind_address.port(), DEFAULT_PORT);
    }
}
