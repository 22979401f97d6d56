//! Chunks command - lists committed chunks, optionally after a sequence.

use anyhow::Result;
use clap::Args;

use inkstream_core::{StreamId, StreamReader};

use super::{Context, print_json};

/// Arguments for the chunks command.
#[derive(Args, Debug)]
pub struct ChunksArgs {
    /// Stream id
    pub id: String,

    /// Only chunks with a greater sequence number
    #[arg(long)]
    pub after: Option<u64>,
}

pub async fn run(args: ChunksArgs, ctx: &Context) -> Result<()> {
    let reader = StreamReader::new(ctx.open_store()?);
    let delta = reader
        .read_since(&StreamId::from_string(args.id), args.after)
        .await?;

    if ctx.json_output {
        return print_json(&delta);
    }

    for chunk in &delta.chunks {
        println!("{:>4}  {:?}", chunk.sequence, chunk.payload.text);
    }
    println!("status: {}", delta.status);
    Ok(())
}
