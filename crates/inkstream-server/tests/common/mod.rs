//! Common test utilities for integration tests.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use tempfile::TempDir;
use tokio::task::JoinHandle;
use tokio::time::timeout;

use inkstream_config::GeneratorSection;
use inkstream_core::DriveConfig;
use inkstream_server::{AppState, ConfiguredGenerators, Server, ServerConfig};
use inkstream_store::SqliteStreamStore;

/// A test server that runs in the background over a temp SQLite database.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client configured for this server.
    pub client: Client,
    /// Handle to the server task.
    _handle: JoinHandle<()>,
    /// Temporary directory holding the database.
    pub temp_dir: TempDir,
}

impl TestServer {
    /// Start a server with the echo generator and no word delay.
    pub async fn start() -> Result<Self> {
        Self::start_with_delay(0).await
    }

    /// Start a server whose echo generator pauses `word_delay_ms` between words.
    pub async fn start_with_delay(word_delay_ms: u64) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let addr = find_available_port().await?;

        let store = SqliteStreamStore::open(&temp_dir.path().join("streams.db"))?;
        let generators = ConfiguredGenerators::new(GeneratorSection {
            word_delay_ms,
            ..GeneratorSection::default()
        });
        let config = ServerConfig::new()
            .with_bind_address(addr)
            .with_request_logging(false);
        let state = AppState::new(Arc::new(store), DriveConfig::default(), generators, config);

        let server = Server::from_state(state);
        let handle = tokio::spawn(async move {
            let _ = server.run_on(addr).await;
        });

        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            _handle: handle,
            temp_dir,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.get(format!("{}{}", self.base_url(), path))
    }

    pub fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client.post(format!("{}{}", self.base_url(), path))
    }

    /// Create a stream and return its id.
    pub async fn create_stream(&self, input: &str) -> Result<String> {
        let resp = self
            .post("/api/v1/streams")
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await?;
        anyhow::ensure!(resp.status().as_u16() == 201, "create returned {}", resp.status());
        let body: serde_json::Value = resp.json().await?;
        body["stream_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| anyhow::anyhow!("missing stream_id"))
    }
}

/// Find an available port for the test server.
async fn find_available_port() -> Result<SocketAddr> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr)
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/health", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(e),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
