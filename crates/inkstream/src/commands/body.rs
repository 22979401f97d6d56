//! Body command - prints the durable text of a stream.

use anyhow::Result;
use clap::Args;

use inkstream_core::{StreamId, StreamReader};

use super::{Context, print_json};

/// Arguments for the body command.
#[derive(Args, Debug)]
pub struct BodyArgs {
    /// Stream id
    pub id: String,

    /// Print reasoning instead of text
    #[arg(long)]
    pub reasoning: bool,
}

pub async fn run(args: BodyArgs, ctx: &Context) -> Result<()> {
    let reader = StreamReader::new(ctx.open_store()?);
    let body = reader.get_body(&StreamId::from_string(args.id)).await?;

    if ctx.json_output {
        return print_json(&body);
    }

    if args.reasoning {
        println!("{}", body.reasoning);
    } else {
        println!("{}", body.text);
    }
    if ctx.verbose {
        eprintln!("status: {} ({} chunk(s))", body.status, body.chunk_count);
    }
    Ok(())
}
