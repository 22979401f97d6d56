//! Serve command - runs the HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Args;
use tokio_util::sync::CancellationToken;

use inkstream_core::{SharedStreamStore, StreamLifecycle, Sweeper};
use inkstream_server::{AppState, ConfiguredGenerators, Server, ServerConfig};
use inkstream_store::MemoryStreamStore;

use super::{Context, drive_config, sweeper_config};

/// Arguments for the serve command.
///
/// CLI arguments override config file values.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub bind: Option<String>,

    /// Keep streams in memory only; nothing survives a restart
    #[arg(long)]
    pub ephemeral: bool,

    /// Disable the abandoned-stream sweeper
    #[arg(long)]
    pub no_sweeper: bool,
}

pub async fn run(args: ServeArgs, ctx: &Context) -> Result<()> {
    let config = ctx.config();

    for source in ctx.loaded.loaded_from() {
        println!("Loaded config: {}", source.display());
    }

    let store: SharedStreamStore = if args.ephemeral {
        println!("Storage: in-memory (ephemeral)");
        Arc::new(MemoryStreamStore::new())
    } else {
        let store = ctx.open_store()?;
        println!(
            "Storage: {}",
            config.storage().database_path(&ctx.data_dir).display()
        );
        store
    };

    let mut section = config.server();
    if let Some(bind) = args.bind {
        section.bind = bind;
    }
    if let Some(port) = args.port {
        section.port = port;
    }
    let addr: SocketAddr = format!("{}:{}", section.bind, section.port)
        .parse()
        .with_context(|| format!("Invalid bind address {}:{}", section.bind, section.port))?;
    let server_config = ServerConfig::from_section(&section)
        .with_bind_address(addr)
        .with_live_buffer(config.drive().live_buffer);

    let generators = ConfiguredGenerators::new(config.generator());
    println!("Generator: {}", generators.kind());

    let state = AppState::new(
        Arc::clone(&store),
        drive_config(config)?,
        generators,
        server_config,
    );

    let shutdown = CancellationToken::new();
    let sweeper = if config.sweeper().enabled && !args.no_sweeper {
        let sweeper = Sweeper::new(StreamLifecycle::new(store), sweeper_config(config));
        Some(sweeper.spawn(shutdown.clone()))
    } else {
        None
    };

    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Shutdown requested");
        }
        signal.cancel();
    });

    println!("Listening on http://{}", addr);
    let server = Server::from_state(state);
    let stopped = shutdown.clone();
    let result = server
        .run_with_shutdown(addr, async move { stopped.cancelled().await })
        .await;

    shutdown.cancel();
    if let Some(handle) = sweeper {
        let _ = handle.await;
    }

    result?;
    Ok(())
}
