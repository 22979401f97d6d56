//! Create command - allocates a pending stream.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use inkstream_core::StreamLifecycle;

use super::{Context, print_json};

/// Arguments for the create command.
#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Input for the generator (e.g. a prompt)
    #[arg(short, long)]
    pub input: Option<String>,
}

pub async fn run(args: CreateArgs, ctx: &Context) -> Result<()> {
    let lifecycle = StreamLifecycle::new(ctx.open_store()?);
    let stream_id = lifecycle.create_with_input(args.input).await?;

    if ctx.json_output {
        print_json(&json!({ "stream_id": stream_id, "status": "pending" }))?;
    } else {
        println!("{}", stream_id);
    }
    Ok(())
}
