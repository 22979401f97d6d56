//! Status command.

use anyhow::Result;
use clap::Args;
use serde_json::json;

use inkstream_core::{StreamId, StreamLifecycle};

use super::{Context, print_json};

/// Arguments for the status command.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Stream id
    pub id: String,
}

pub async fn run(args: StatusArgs, ctx: &Context) -> Result<()> {
    let lifecycle = StreamLifecycle::new(ctx.open_store()?);
    let stream_id = StreamId::from_string(args.id);
    let status = lifecycle.status(&stream_id).await?;

    if ctx.json_output {
        print_json(&json!({ "stream_id": stream_id, "status": status }))?;
    } else {
        println!("{}", status);
    }
    Ok(())
}
