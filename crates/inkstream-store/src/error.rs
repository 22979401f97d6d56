use thiserror::Error;

use crate::types::StreamStatus;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("Stream not found: {0}")]
    NotFound(String),

    /// The commit carried a fence that does not match the stream's current drive.
    #[error("Stale drive fence for stream {0}")]
    Fenced(String),

    /// A chunk commit was attempted while the stream was not `streaming`.
    #[error("Stream {stream_id} is {status}, chunks can no longer be committed")]
    StreamClosed {
        stream_id: String,
        status: StreamStatus,
    },

    /// Stored data could not be interpreted.
    #[error("Corrupt stream data: {0}")]
    Corrupt(String),

    /// A blocking storage task panicked or was cancelled.
    #[error("Storage task failed: {0}")]
    Task(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::FromSqlConversionFailure(column, _, source) => {
                StoreError::Corrupt(format!("column {}: {}", column, source))
            }
            other => StoreError::Database(other),
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(e: tokio::task::JoinError) -> Self {
        StoreError::Task(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
