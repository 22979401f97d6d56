//! Durable storage for persistent text streams.
//!
//! A stream is a row with a lifecycle status plus an append-only log of
//! chunks. This crate owns the storage contract and ships a SQLite
//! implementation and an in-memory one.

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod storage;
pub mod types;

pub use error::{Result, StoreError};
pub use memory::MemoryStreamStore;
pub use sqlite::SqliteStreamStore;
pub use storage::{SharedStreamStore, StreamStore};
pub use types::{
    CasOutcome, Chunk, ChunkPayload, StreamId, StreamRecord, StreamSnapshot, StreamStatus,
};
