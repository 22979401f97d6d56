//! Append/flush engine: runs one drive end to end.
//!
//! # Architecture
//!
//! ```text
//!                          ┌──────────────┐
//!                    ┌────►│  live sink   │──► LiveTransport (per increment)
//! TextGenerator ─► Appender└──────────────┘
//!                    │     ┌──────────────┐
//!                    └────►│ persist sink │──► ChunkBuffer ──► StreamStore
//!                          └──────────────┘        (coalesced chunks)
//! ```
//!
//! The two sinks are independent tasks. A slow or broken live transport never
//! delays commits, and a commit never waits on the live client. The driver
//! owns the generator future and is the only component that finalizes status.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use inkstream_store::{
    ChunkPayload, SharedStreamStore, StoreError, StreamId, StreamStatus,
};

use crate::error::{DriveError, GenerationError, Result};
use crate::flush::{ChunkBuffer, FlushPolicy};
use crate::generator::{Appender, BoxedGenerator, Increment};
use crate::lifecycle::{DriveToken, StreamLifecycle};
use crate::transport::{BoxedTransport, DriveEnd};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Configuration for drives.
#[derive(Debug, Clone)]
pub struct DriveConfig {
    /// Total time budget for the generator.
    pub timeout: Duration,
    pub flush: FlushPolicy,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            flush: FlushPolicy::default(),
        }
    }
}

impl DriveConfig {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_flush(mut self, flush: FlushPolicy) -> Self {
        self.flush = flush;
        self
    }
}

/// Summary of a completed drive.
#[derive(Debug, Clone, Serialize)]
pub struct DriveOutcome {
    pub stream_id: StreamId,
    /// Terminal status the stream holds after the drive.
    pub status: StreamStatus,
    pub chunks_committed: u64,
    pub bytes_committed: usize,
    /// Whether the live transport failed at some point.
    pub transport_failed: bool,
    /// Generator failure detail, if generation failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generator_error: Option<String>,
}

#[derive(Debug, Default, Clone, Copy)]
struct PersistReport {
    chunks: u64,
    bytes: usize,
}

enum GenerationEnd {
    Finished,
    Failed(GenerationError),
    TimedOut,
    /// The persist sink failed; generation was abandoned.
    Aborted,
}

// ─────────────────────────────────────────────────────────────────────────────
// Driver
// ─────────────────────────────────────────────────────────────────────────────

/// Runs generators against streams.
#[derive(Clone)]
pub struct Driver {
    lifecycle: StreamLifecycle,
    config: Arc<DriveConfig>,
}

impl Driver {
    pub fn new(lifecycle: StreamLifecycle, config: DriveConfig) -> Self {
        Self {
            lifecycle,
            config: Arc::new(config),
        }
    }

    pub fn lifecycle(&self) -> &StreamLifecycle {
        &self.lifecycle
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    /// Claim `id` and run `generator` against it.
    ///
    /// Fails synchronously with `AlreadyDriven` or `NotFound` before anything
    /// is generated. Generator failure and timeout are reported through the
    /// outcome's status; only storage failures are returned as errors.
    pub async fn drive(
        &self,
        id: &StreamId,
        transport: BoxedTransport,
        generator: BoxedGenerator,
    ) -> Result<DriveOutcome> {
        let token = self.lifecycle.begin_drive(id).await?;
        self.run(token, transport, generator).await
    }

    /// Run a drive for an already claimed stream.
    pub async fn run(
        &self,
        token: DriveToken,
        transport: BoxedTransport,
        mut generator: BoxedGenerator,
    ) -> Result<DriveOutcome> {
        let stream_id = token.stream_id().clone();

        let (live_tx, live_rx) = mpsc::unbounded_channel();
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        let appender = Appender::new(live_tx, persist_tx);
        let storage_failed = CancellationToken::new();

        let live_task = tokio::spawn(live_sink(stream_id.clone(), transport, live_rx));
        let persist_task = tokio::spawn(persist_sink(
            Arc::clone(self.lifecycle.store()),
            stream_id.clone(),
            token.fence().to_string(),
            self.config.flush.clone(),
            persist_rx,
            storage_failed.clone(),
        ));

        let generation = tokio::time::timeout(
            self.config.timeout,
            generator.generate(appender.clone()),
        );
        let ended = tokio::select! {
            result = generation => match result {
                Ok(Ok(())) => GenerationEnd::Finished,
                Ok(Err(e)) => GenerationEnd::Failed(e),
                Err(_) => GenerationEnd::TimedOut,
            },
            _ = storage_failed.cancelled() => GenerationEnd::Aborted,
        };
        // The generator future is gone; stop accepting output from clones
        appender.close();
        drop(generator);

        let (status, generator_error) = match ended {
            GenerationEnd::Finished => (StreamStatus::Done, None),
            GenerationEnd::Failed(e) => {
                warn!(stream_id = %stream_id, error = %e, "Generator failed");
                (StreamStatus::Error, Some(e.to_string()))
            }
            GenerationEnd::TimedOut => {
                warn!(
                    stream_id = %stream_id,
                    timeout_secs = self.config.timeout.as_secs_f64(),
                    "Drive timed out"
                );
                (StreamStatus::Timeout, None)
            }
            GenerationEnd::Aborted => (StreamStatus::Error, None),
        };

        // Final flush happens in the persist sink once its channel closes
        let persisted = match persist_task.await {
            Ok(result) => result,
            Err(e) => Err(StoreError::from(e)),
        };

        let report = match persisted {
            Ok(report) => report,
            Err(source) => {
                error!(stream_id = %stream_id, error = %source, "Persisting stream failed");
                if let Err(e) = self.lifecycle.finalize(&stream_id, StreamStatus::Error).await {
                    error!(stream_id = %stream_id, error = %e, "Could not mark failed stream as error");
                }
                let end = DriveEnd::new(StreamStatus::Error).with_error("storage failure");
                close_live(&stream_id, live_task, &end).await;
                return Err(DriveError::Storage { stream_id, source });
            }
        };

        let final_status = match self.lifecycle.finalize(&stream_id, status).await {
            Ok(final_status) => final_status,
            Err(e) => {
                let end = DriveEnd::new(StreamStatus::Error).with_error("storage failure");
                close_live(&stream_id, live_task, &end).await;
                return Err(e.into());
            }
        };

        let mut end = DriveEnd::new(final_status);
        if let Some(message) = &generator_error {
            end = end.with_error(message.clone());
        }
        let transport_failed = close_live(&stream_id, live_task, &end).await;

        info!(
            stream_id = %stream_id,
            status = %final_status,
            chunks = report.chunks,
            bytes = report.bytes,
            transport_failed,
            "Drive finished"
        );

        Ok(DriveOutcome {
            stream_id,
            status: final_status,
            chunks_committed: report.chunks,
            bytes_committed: report.bytes,
            transport_failed,
            generator_error,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sinks
// ─────────────────────────────────────────────────────────────────────────────

/// Forward increments to the transport until the appender closes.
///
/// After the first failed write the transport is abandoned and the rest of the
/// feed is drained without writing. Returns the transport if still usable.
async fn live_sink(
    stream_id: StreamId,
    mut transport: BoxedTransport,
    mut rx: mpsc::UnboundedReceiver<Increment>,
) -> Option<BoxedTransport> {
    let mut healthy = true;
    while let Some(increment) = rx.recv().await {
        if !healthy {
            continue;
        }
        if let Err(e) = transport.write(&increment).await {
            warn!(stream_id = %stream_id, error = %e, "Live transport failed, continuing without it");
            healthy = false;
        }
    }
    healthy.then_some(transport)
}

/// Wait for the live sink to drain and send the end of the drive.
///
/// Returns whether the transport failed.
async fn close_live(
    stream_id: &StreamId,
    live_task: tokio::task::JoinHandle<Option<BoxedTransport>>,
    end: &DriveEnd,
) -> bool {
    match live_task.await {
        Ok(Some(mut transport)) => match transport.close(end).await {
            Ok(()) => false,
            Err(e) => {
                warn!(stream_id = %stream_id, error = %e, "Failed to close live transport");
                true
            }
        },
        Ok(None) => true,
        Err(e) => {
            warn!(stream_id = %stream_id, error = %e, "Live sink task failed");
            true
        }
    }
}

async fn persist_sink(
    store: SharedStreamStore,
    stream_id: StreamId,
    fence: String,
    policy: FlushPolicy,
    rx: mpsc::UnboundedReceiver<Increment>,
    failed: CancellationToken,
) -> std::result::Result<PersistReport, StoreError> {
    let result = persist_loop(&store, &stream_id, &fence, policy, rx).await;
    if result.is_err() {
        failed.cancel();
    }
    result
}

async fn persist_loop(
    store: &SharedStreamStore,
    stream_id: &StreamId,
    fence: &str,
    policy: FlushPolicy,
    mut rx: mpsc::UnboundedReceiver<Increment>,
) -> std::result::Result<PersistReport, StoreError> {
    let mut buffer = ChunkBuffer::new(policy);
    let mut report = PersistReport::default();

    loop {
        let deadline = buffer.deadline();
        tokio::select! {
            increment = rx.recv() => match increment {
                Some(Increment::Text(text)) => buffer.push_text(&text),
                Some(Increment::Reasoning(text)) => buffer.push_reasoning(&text),
                None => break,
            },
            _ = wait_until(deadline) => {
                if let Some(payload) = buffer.take_expired(Instant::now()) {
                    commit(store, stream_id, fence, payload, &mut report).await?;
                }
                continue;
            }
        }

        while let Some(payload) = buffer.take_ready() {
            commit(store, stream_id, fence, payload, &mut report).await?;
        }
    }

    if let Some(payload) = buffer.take_all() {
        commit(store, stream_id, fence, payload, &mut report).await?;
    }
    Ok(report)
}

async fn commit(
    store: &SharedStreamStore,
    stream_id: &StreamId,
    fence: &str,
    payload: ChunkPayload,
    report: &mut PersistReport,
) -> std::result::Result<(), StoreError> {
    let bytes = payload.len();
    let chunk = store.append_chunk(stream_id, fence, payload).await?;
    report.chunks += 1;
    report.bytes += bytes;
    debug!(stream_id = %stream_id, sequence = chunk.sequence, bytes, "Chunk committed");
    Ok(())
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
