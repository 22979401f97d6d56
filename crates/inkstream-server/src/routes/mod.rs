//! API routes.

pub mod health;
pub mod streams;

pub use health::health_routes;
pub use streams::{
    ChunksQuery, CreateStreamRequest, StreamStatusResponse, create_stream_handler,
    drive_stream_handler, get_status_handler, get_stream_handler, list_chunks_handler,
};
