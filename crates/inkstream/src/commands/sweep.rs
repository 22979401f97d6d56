//! Sweep command - one pass of the abandoned-stream sweeper.

use anyhow::Result;
use clap::Args;

use inkstream_core::{StreamLifecycle, Sweeper};

use super::{Context, print_json, sweeper_config};

/// Arguments for the sweep command.
#[derive(Args, Debug)]
pub struct SweepArgs {
    /// Idle seconds before a streaming stream counts as abandoned (overrides config)
    #[arg(long)]
    pub stale_after: Option<u64>,
}

pub async fn run(args: SweepArgs, ctx: &Context) -> Result<()> {
    let mut config = sweeper_config(ctx.config());
    if let Some(secs) = args.stale_after {
        config = config.with_stale_after(std::time::Duration::from_secs(secs));
    }

    let sweeper = Sweeper::new(StreamLifecycle::new(ctx.open_store()?), config);
    let report = sweeper.sweep_once().await?;

    if ctx.json_output {
        return print_json(&report);
    }

    if report.finalized.is_empty() {
        println!("No abandoned streams");
    } else {
        for id in &report.finalized {
            println!("timeout  {}", id);
        }
    }
    Ok(())
}
