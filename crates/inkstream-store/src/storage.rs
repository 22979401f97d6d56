//! Storage abstraction for streams and their chunks.
//!
//! # Architecture
//!
//! ```text
//! StreamStore (trait)          - Stream rows + append-only chunk log
//!     └── SqliteStreamStore    - Default SQLite implementation
//!     └── MemoryStreamStore    - In-memory implementation for tests and demos
//! ```
//!
//! Implementations must make [`StreamStore::compare_and_set_status`] and
//! [`StreamStore::append_chunk`] atomic with respect to each other: a chunk is
//! only committed while the stream is `streaming` under the presented fence,
//! and its sequence is exactly one past the previous chunk.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::Result;
use crate::types::{CasOutcome, Chunk, ChunkPayload, StreamId, StreamRecord, StreamSnapshot, StreamStatus};

#[async_trait]
pub trait StreamStore: Send + Sync {
    /// Insert a new stream row. The record's id must be unused.
    async fn insert_stream(&self, record: &StreamRecord) -> Result<()>;

    /// Fetch a stream row. Returns `NotFound` for unknown ids.
    async fn get_stream(&self, id: &StreamId) -> Result<StreamRecord>;

    /// Atomically move a stream to `next` if its current status is one of
    /// `expected`.
    ///
    /// `fence` replaces the stored drive fence when the transition is applied
    /// and is `Some`; `None` leaves the stored fence untouched.
    async fn compare_and_set_status(
        &self,
        id: &StreamId,
        expected: &[StreamStatus],
        next: StreamStatus,
        fence: Option<&str>,
    ) -> Result<CasOutcome>;

    /// Commit one chunk at the next sequence number.
    ///
    /// Fails with `StreamClosed` when the stream is not `streaming` and with
    /// `Fenced` when `fence` does not match the current drive.
    async fn append_chunk(&self, id: &StreamId, fence: &str, payload: ChunkPayload)
    -> Result<Chunk>;

    /// Chunks with `sequence > after` (all chunks when `after` is `None`),
    /// in sequence order.
    async fn list_chunks(&self, id: &StreamId, after: Option<u64>) -> Result<Vec<Chunk>>;

    /// Stream row and chunks (`sequence > after`) read in one transaction.
    async fn snapshot(&self, id: &StreamId, after: Option<u64>) -> Result<StreamSnapshot>;

    /// Streams in `status` whose `updated_at` is older than `before`.
    async fn list_stale(&self, status: StreamStatus, before: DateTime<Utc>)
    -> Result<Vec<StreamRecord>>;

    /// Check that the backing storage answers queries.
    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

/// A store that can be shared across tasks.
pub type SharedStreamStore = Arc<dyn StreamStore>;
