//! Persistent text streaming.
//!
//! A stream is generated once and consumed two ways: a single driving client
//! receives every increment live, and any observer can rebuild the text from
//! durably committed chunks at any time.
//!
//! - [`StreamLifecycle`]: creation and status transitions, single-writer gate
//! - [`Driver`]: runs a [`TextGenerator`], fanning output to a
//!   [`LiveTransport`] and the chunk store
//! - [`StreamReader`]: durable reconstruction for observers
//! - [`Sweeper`]: recovers streams abandoned by crashed drivers

pub mod engine;
pub mod error;
pub mod flush;
pub mod generator;
pub mod lifecycle;
pub mod reader;
pub mod sweeper;
pub mod transport;

pub use engine::{DriveConfig, DriveOutcome, Driver};
pub use error::{
    DriveError, GenerationError, LifecycleError, LifecycleResult, Result, TransportError,
};
pub use flush::{BoundaryDetector, ChunkBuffer, FlushPolicy, SentenceBoundary};
pub use generator::{
    Appender, BoxedGenerator, Increment, IncrementStream, ScriptedGenerator, StreamGenerator,
    TextGenerator,
};
pub use lifecycle::{DriveToken, StreamLifecycle};
pub use reader::{ChunkDelta, StreamBody, StreamReader};
pub use sweeper::{SweepReport, Sweeper, SweeperConfig};
pub use transport::{
    BoxedTransport, ChannelTransport, DriveEnd, LiveEvent, LiveTransport, NullTransport,
    WriterTransport,
};

// Storage types callers need alongside the core API
pub use inkstream_store::{
    SharedStreamStore, StoreError, StreamId, StreamStatus, StreamStore,
};
