use thiserror::Error;

use inkstream_store::{StoreError, StreamId, StreamStatus};

/// Errors from stream lifecycle operations.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Stream not found: {0}")]
    NotFound(StreamId),

    /// `begin_drive` lost the check-and-set: the stream is already streaming or finished.
    #[error("Stream {stream_id} is already {status}")]
    AlreadyDriven {
        stream_id: StreamId,
        status: StreamStatus,
    },

    #[error("Invalid transition for stream {stream_id}: {from} -> {to}")]
    InvalidTransition {
        stream_id: StreamId,
        from: StreamStatus,
        to: StreamStatus,
    },

    #[error("Storage error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for LifecycleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => LifecycleError::NotFound(StreamId::from_string(id)),
            other => LifecycleError::Store(other),
        }
    }
}

/// Errors that end a drive.
///
/// Generator failures and timeouts are not errors here: they are reported
/// through the terminal status of [`DriveOutcome`](crate::DriveOutcome).
#[derive(Debug, Error)]
pub enum DriveError {
    #[error("Stream not found: {0}")]
    NotFound(StreamId),

    #[error("Stream {stream_id} is already {status}")]
    AlreadyDriven {
        stream_id: StreamId,
        status: StreamStatus,
    },

    /// A chunk commit or status transition failed. Fatal to the drive.
    #[error("Storage failure while driving {stream_id}: {source}")]
    Storage {
        stream_id: StreamId,
        #[source]
        source: StoreError,
    },

    #[error(transparent)]
    Lifecycle(LifecycleError),
}

impl From<LifecycleError> for DriveError {
    fn from(e: LifecycleError) -> Self {
        match e {
            LifecycleError::NotFound(id) => DriveError::NotFound(id),
            LifecycleError::AlreadyDriven { stream_id, status } => {
                DriveError::AlreadyDriven { stream_id, status }
            }
            other => DriveError::Lifecycle(other),
        }
    }
}

/// Failure writing to a live transport.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Live connection closed")]
    Closed,

    #[error("Live transport IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure reported by a text generator.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("Generation failed: {0}")]
    Failed(String),

    /// The drive has ended; further output is discarded.
    #[error("Appender is closed")]
    Closed,

    #[error("Generator backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl GenerationError {
    pub fn failed(msg: impl Into<String>) -> Self {
        GenerationError::Failed(msg.into())
    }

    pub fn backend(e: impl std::error::Error + Send + Sync + 'static) -> Self {
        GenerationError::Backend(Box::new(e))
    }
}

pub type LifecycleResult<T> = std::result::Result<T, LifecycleError>;

pub type Result<T> = std::result::Result<T, DriveError>;
