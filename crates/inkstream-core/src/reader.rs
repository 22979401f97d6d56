//! Reconstruction of stream text from committed chunks.

use serde::{Deserialize, Serialize};
use tracing::warn;

use inkstream_store::{Chunk, Result, SharedStreamStore, StreamId, StreamStatus};

/// Durable view of a stream: everything committed so far plus its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamBody {
    pub stream_id: StreamId,
    pub text: String,
    pub reasoning: String,
    pub status: StreamStatus,
    pub chunk_count: usize,
    pub last_sequence: Option<u64>,
}

/// Chunks committed after a known sequence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkDelta {
    pub stream_id: StreamId,
    pub status: StreamStatus,
    pub chunks: Vec<Chunk>,
}

impl ChunkDelta {
    pub fn last_sequence(&self) -> Option<u64> {
        self.chunks.last().map(|c| c.sequence)
    }
}

/// Read-only access for observers.
#[derive(Clone)]
pub struct StreamReader {
    store: SharedStreamStore,
}

impl StreamReader {
    pub fn new(store: SharedStreamStore) -> Self {
        Self { store }
    }

    /// Full text, reasoning and status, read in one snapshot.
    pub async fn get_body(&self, id: &StreamId) -> Result<StreamBody> {
        let snapshot = self.store.snapshot(id, None).await?;
        check_sequence(id, None, &snapshot.chunks);

        let mut text = String::new();
        let mut reasoning = String::new();
        for chunk in &snapshot.chunks {
            text.push_str(&chunk.payload.text);
            if let Some(r) = &chunk.payload.reasoning {
                reasoning.push_str(r);
            }
        }

        Ok(StreamBody {
            stream_id: snapshot.record.id,
            text,
            reasoning,
            status: snapshot.record.status,
            chunk_count: snapshot.chunks.len(),
            last_sequence: snapshot.chunks.last().map(|c| c.sequence),
        })
    }

    /// Chunks with `sequence > after` plus the current status.
    ///
    /// `after = None` returns every chunk.
    pub async fn read_since(&self, id: &StreamId, after: Option<u64>) -> Result<ChunkDelta> {
        let snapshot = self.store.snapshot(id, after).await?;
        check_sequence(id, after, &snapshot.chunks);

        Ok(ChunkDelta {
            stream_id: snapshot.record.id,
            status: snapshot.record.status,
            chunks: snapshot.chunks,
        })
    }
}

/// Warn on gaps. The read still succeeds.
fn check_sequence(id: &StreamId, after: Option<u64>, chunks: &[Chunk]) {
    let mut expected = after.map_or(0, |seq| seq + 1);
    for chunk in chunks {
        if chunk.sequence != expected {
            warn!(
                stream_id = %id,
                expected,
                found = chunk.sequence,
                "Sequence gap in committed chunks"
            );
        }
        expected = chunk.sequence + 1;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use inkstream_store::{ChunkPayload, MemoryStreamStore};

    use super::*;
    use crate::lifecycle::StreamLifecycle;

    async fn setup() -> (StreamLifecycle, StreamReader) {
        let store: SharedStreamStore = Arc::new(MemoryStreamStore::new());
        (
            StreamLifecycle::new(Arc::clone(&store)),
            StreamReader::new(store),
        )
    }

    #[tokio::test]
    async fn test_pending_stream_has_empty_body() {
        let (lc, reader) = setup().await;
        let id = lc.create().await.unwrap();

        let body = reader.get_body(&id).await.unwrap();
        assert_eq!(body.text, "");
        assert_eq!(body.reasoning, "");
        assert_eq!(body.status, StreamStatus::Pending);
        assert_eq!(body.chunk_count, 0);
        assert_eq!(body.last_sequence, None);
    }

    #[tokio::test]
    async fn test_body_concatenates_in_order() {
        let (lc, reader) = setup().await;
        let id = lc.create().await.unwrap();
        let token = lc.begin_drive(&id).await.unwrap();
        let store = lc.store();

        store
            .append_chunk(&id, token.fence(), ChunkPayload::text("Hello. ").with_reasoning("a"))
            .await
            .unwrap();
        store
            .append_chunk(&id, token.fence(), ChunkPayload::text("World"))
            .await
            .unwrap();

        let body = reader.get_body(&id).await.unwrap();
        assert_eq!(body.text, "Hello. World");
        assert_eq!(body.reasoning, "a");
        assert_eq!(body.status, StreamStatus::Streaming);
        assert_eq!(body.chunk_count, 2);
        assert_eq!(body.last_sequence, Some(1));

        lc.finalize(&id, StreamStatus::Done).await.unwrap();
        let body = reader.get_body(&id).await.unwrap();
        assert_eq!(body.status, StreamStatus::Done);
        assert_eq!(body.text, "Hello. World");
    }

    #[tokio::test]
    async fn test_read_since_returns_tail() {
        let (lc, reader) = setup().await;
        let id = lc.create().await.unwrap();
        let token = lc.begin_drive(&id).await.unwrap();
        for text in ["a", "b", "c"] {
            lc.store()
                .append_chunk(&id, token.fence(), ChunkPayload::text(text))
                .await
                .unwrap();
        }

        let delta = reader.read_since(&id, Some(0)).await.unwrap();
        assert_eq!(delta.status, StreamStatus::Streaming);
        assert_eq!(
            delta.chunks.iter().map(|c| c.payload.text.as_str()).collect::<Vec<_>>(),
            vec!["b", "c"]
        );
        assert_eq!(delta.last_sequence(), Some(2));

        let empty = reader.read_since(&id, Some(2)).await.unwrap();
        assert!(empty.chunks.is_empty());
        assert_eq!(empty.last_sequence(), None);
    }

    #[tokio::test]
    async fn test_unknown_stream() {
        let (_lc, reader) = setup().await;
        let err = reader.get_body(&StreamId::new()).await.unwrap_err();
        assert!(matches!(err, inkstream_store::StoreError::NotFound(_)));
    }
}
