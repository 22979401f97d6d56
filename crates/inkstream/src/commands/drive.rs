//! Drive command - generates a stream, writing text to stdout as it arrives.

use anyhow::Result;
use clap::Args;

use inkstream_core::{
    BoxedTransport, Driver, NullTransport, StreamId, StreamLifecycle, StreamStatus,
    WriterTransport,
};
use inkstream_server::{ConfiguredGenerators, GeneratorFactory};

use super::{Context, drive_config, print_json};

/// Arguments for the drive command.
#[derive(Args, Debug)]
pub struct DriveArgs {
    /// Stream id
    pub id: String,

    /// Also print reasoning as it arrives
    #[arg(long)]
    pub reasoning: bool,
}

pub async fn run(args: DriveArgs, ctx: &Context) -> Result<()> {
    let config = ctx.config();
    let store = ctx.open_store()?;
    let stream_id = StreamId::from_string(args.id);

    let record = store.get_stream(&stream_id).await?;
    let generator = ConfiguredGenerators::new(config.generator()).build(&record)?;

    let driver = Driver::new(StreamLifecycle::new(store), drive_config(config)?);
    let transport: BoxedTransport = if ctx.json_output {
        Box::new(NullTransport)
    } else {
        Box::new(WriterTransport::new(tokio::io::stdout()).with_reasoning(args.reasoning))
    };

    let outcome = driver.drive(&stream_id, transport, generator).await?;

    if ctx.json_output {
        print_json(&outcome)?;
    } else if ctx.verbose {
        eprintln!(
            "{} chunk(s), {} byte(s) committed",
            outcome.chunks_committed, outcome.bytes_committed
        );
    }

    if outcome.status != StreamStatus::Done {
        anyhow::bail!("Stream {} finished as {}", outcome.stream_id, outcome.status);
    }
    Ok(())
}
