//! Inkstream - persistent text streaming
//!
//! Main entry point for the inkstream server and CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{body, chunks, config, create, drive, serve, status, sweep};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Inkstream - persistent text streaming
#[derive(Parser)]
#[command(name = "inkstream")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// User config directory (default: platform config dir)
    #[arg(long, global = true, env = "INKSTREAM_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the HTTP server
    Serve(serve::ServeArgs),

    /// Create a pending stream
    Create(create::CreateArgs),

    /// Drive a pending stream, printing text as it is generated
    Drive(drive::DriveArgs),

    /// Print the committed text of a stream
    Body(body::BodyArgs),

    /// Show a stream's status
    Status(status::StatusArgs),

    /// List committed chunks
    Chunks(chunks::ChunksArgs),

    /// Finalize abandoned streams once
    Sweep(sweep::SweepArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Console (human-readable, stderr) + rotating JSON file
    let filter = if cli.verbose {
        "inkstream=debug,inkstream_core=debug,inkstream_store=debug,inkstream_llm=debug,inkstream_server=debug,info"
    } else {
        "inkstream=info,inkstream_core=info,inkstream_server=info,warn"
    };

    let log_dir = cli
        .config_dir
        .clone()
        .or_else(inkstream_config::user_config_dir)
        .map(|d| d.join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"));
    let file_appender = tracing_appender::rolling::daily(&log_dir, "inkstream.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    use tracing_subscriber::prelude::*;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(tracing_subscriber::EnvFilter::new(filter)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .with_filter(tracing_subscriber::EnvFilter::new(
                    "inkstream=trace,inkstream_core=trace,inkstream_store=debug,inkstream_llm=trace,inkstream_server=trace,info",
                )),
        )
        .init();

    let loaded =
        inkstream_config::load_config_with_options(None, cli.config_dir.as_deref())?;
    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }

    let ctx = commands::Context {
        loaded,
        data_dir: inkstream_config::data_dir(),
        json_output: cli.json,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Serve(args) => serve::run(args, &ctx).await,
        Commands::Create(args) => create::run(args, &ctx).await,
        Commands::Drive(args) => drive::run(args, &ctx).await,
        Commands::Body(args) => body::run(args, &ctx).await,
        Commands::Status(args) => status::run(args, &ctx).await,
        Commands::Chunks(args) => chunks::run(args, &ctx).await,
        Commands::Sweep(args) => sweep::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}
