//! Stream endpoints.
//!
//! Creation, the single live drive (SSE), and durable reads for observers.

use std::convert::Infallible;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use inkstream_core::{
    ChannelTransport, ChunkDelta, LiveEvent, StreamBody, StreamId, StreamStatus,
};

use crate::error::{Result, ServerError};
use crate::state::AppState;

// ─────────────────────────────────────────────────────────────────────────────
// Request/Response types
// ─────────────────────────────────────────────────────────────────────────────

/// Request to create a stream.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CreateStreamRequest {
    /// Input handed to the generator when the stream is driven.
    #[serde(default)]
    pub input: Option<String>,
}

/// A stream id with its current status.
#[derive(Debug, Serialize, Deserialize)]
pub struct StreamStatusResponse {
    pub stream_id: StreamId,
    pub status: StreamStatus,
}

/// Query for incremental chunk reads.
#[derive(Debug, Default, Deserialize)]
pub struct ChunksQuery {
    /// Only chunks with a sequence greater than this.
    pub after: Option<u64>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// POST /api/v1/streams
pub async fn create_stream_handler(
    State(state): State<AppState>,
    Json(request): Json<CreateStreamRequest>,
) -> Result<(StatusCode, Json<StreamStatusResponse>)> {
    let stream_id = state.lifecycle.create_with_input(request.input).await?;

    Ok((
        StatusCode::CREATED,
        Json(StreamStatusResponse {
            stream_id,
            status: StreamStatus::Pending,
        }),
    ))
}

/// GET /api/v1/streams/{id}
pub async fn get_stream_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StreamBody>> {
    let body = state.reader.get_body(&StreamId::from_string(id)).await?;
    Ok(Json(body))
}

/// GET /api/v1/streams/{id}/status
pub async fn get_status_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<StreamStatusResponse>> {
    let stream_id = StreamId::from_string(id);
    let status = state.lifecycle.status(&stream_id).await?;
    Ok(Json(StreamStatusResponse { stream_id, status }))
}

/// GET /api/v1/streams/{id}/chunks?after=N
pub async fn list_chunks_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<ChunksQuery>,
) -> Result<Json<ChunkDelta>> {
    let delta = state
        .reader
        .read_since(&StreamId::from_string(id), query.after)
        .await?;
    Ok(Json(delta))
}

/// POST /api/v1/streams/{id}/drive
///
/// Claims the stream and streams its generation back as SSE events
/// (`text`, `reasoning`, then one `done` or `error`). The drive runs in its
/// own task: a client that disconnects stops receiving events but the stream
/// is still generated and committed.
pub async fn drive_stream_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let stream_id = StreamId::from_string(id);

    let record = state.lifecycle.store().get_stream(&stream_id).await?;
    if record.status != StreamStatus::Pending {
        return Err(ServerError::AlreadyDriven(format!(
            "Stream {} is already {}",
            stream_id, record.status
        )));
    }

    // Build before claiming so a bad request leaves the stream pending
    let generator = state.generators.build(&record)?;
    let token = state.lifecycle.begin_drive(&stream_id).await?;

    let (transport, mut events) = ChannelTransport::channel(state.config.live_buffer);
    let driver = state.driver.clone();
    let drive_id = stream_id.clone();
    tokio::spawn(async move {
        match driver.run(token, Box::new(transport), generator).await {
            Ok(outcome) if outcome.transport_failed => {
                info!(stream_id = %drive_id, status = %outcome.status, "Drive finished without its client");
            }
            Ok(_) => {}
            Err(e) => error!(stream_id = %drive_id, error = %e, "Drive failed"),
        }
    });

    let sse_stream = async_stream::stream! {
        while let Some(event) = events.recv().await {
            let terminal = event.is_terminal();
            yield Ok(sse_event(&stream_id, &event));
            if terminal {
                break;
            }
        }
        debug!(stream_id = %stream_id, "Live feed closed");
    };

    Ok(Sse::new(sse_stream).keep_alive(KeepAlive::default()))
}

/// Frame a live event for SSE. An event that fails to encode becomes an
/// `error` frame instead of an empty one.
fn sse_event(stream_id: &StreamId, event: &LiveEvent) -> Event {
    match Event::default().event(event.name()).json_data(event) {
        Ok(frame) => frame,
        Err(e) => {
            warn!(stream_id = %stream_id, event = event.name(), error = %e, "Failed to encode live event");
            Event::default().event("error").data("failed to encode live event")
        }
    }
}
