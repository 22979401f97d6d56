//! In-memory stream store.
//!
//! Nothing survives the process. Used by tests and by `--ephemeral` servers.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::storage::StreamStore;
use crate::types::{
    CasOutcome, Chunk, ChunkPayload, StreamId, StreamRecord, StreamSnapshot, StreamStatus,
};
use crate::{Result, StoreError};

#[derive(Debug)]
struct Entry {
    record: StreamRecord,
    chunks: Vec<Chunk>,
}

/// Stream store that keeps every stream in a single locked map.
#[derive(Debug, Default)]
pub struct MemoryStreamStore {
    streams: Mutex<HashMap<StreamId, Entry>>,
}

impl MemoryStreamStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of streams currently held.
    pub fn len(&self) -> usize {
        self.streams.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.lock().is_empty()
    }
}

fn chunks_after(chunks: &[Chunk], after: Option<u64>) -> Vec<Chunk> {
    match after {
        Some(seq) => chunks.iter().filter(|c| c.sequence > seq).cloned().collect(),
        None => chunks.to_vec(),
    }
}

#[async_trait]
impl StreamStore for MemoryStreamStore {
    async fn insert_stream(&self, record: &StreamRecord) -> Result<()> {
        let mut map = self.streams.lock();
        if map.contains_key(&record.id) {
            return Err(StoreError::Corrupt(format!(
                "stream {} already exists",
                record.id
            )));
        }
        map.insert(
            record.id.clone(),
            Entry {
                record: record.clone(),
                chunks: Vec::new(),
            },
        );
        Ok(())
    }

    async fn get_stream(&self, id: &StreamId) -> Result<StreamRecord> {
        self.streams
            .lock()
            .get(id)
            .map(|e| e.record.clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn compare_and_set_status(
        &self,
        id: &StreamId,
        expected: &[StreamStatus],
        next: StreamStatus,
        fence: Option<&str>,
    ) -> Result<CasOutcome> {
        let mut map = self.streams.lock();
        let entry = map
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        let current = entry.record.status;
        if !expected.contains(&current) {
            return Ok(CasOutcome::Conflict { current });
        }

        entry.record.status = next;
        if let Some(fence) = fence {
            entry.record.drive_fence = Some(fence.to_string());
        }
        entry.record.updated_at = Utc::now();
        Ok(CasOutcome::Applied { previous: current })
    }

    async fn append_chunk(
        &self,
        id: &StreamId,
        fence: &str,
        payload: ChunkPayload,
    ) -> Result<Chunk> {
        let mut map = self.streams.lock();
        let entry = map
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;

        if entry.record.status != StreamStatus::Streaming {
            return Err(StoreError::StreamClosed {
                stream_id: id.to_string(),
                status: entry.record.status,
            });
        }
        if entry.record.drive_fence.as_deref() != Some(fence) {
            return Err(StoreError::Fenced(id.to_string()));
        }

        let now = Utc::now();
        let chunk = Chunk {
            stream_id: id.clone(),
            sequence: entry.chunks.len() as u64,
            payload,
            created_at: now,
        };
        entry.chunks.push(chunk.clone());
        entry.record.updated_at = now;
        Ok(chunk)
    }

    async fn list_chunks(&self, id: &StreamId, after: Option<u64>) -> Result<Vec<Chunk>> {
        let map = self.streams.lock();
        let entry = map
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(chunks_after(&entry.chunks, after))
    }

    async fn snapshot(&self, id: &StreamId, after: Option<u64>) -> Result<StreamSnapshot> {
        let map = self.streams.lock();
        let entry = map
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok(StreamSnapshot {
            record: entry.record.clone(),
            chunks: chunks_after(&entry.chunks, after),
        })
    }

    async fn list_stale(
        &self,
        status: StreamStatus,
        before: DateTime<Utc>,
    ) -> Result<Vec<StreamRecord>> {
        let map = self.streams.lock();
        let mut stale: Vec<StreamRecord> = map
            .values()
            .filter(|e| e.record.status == status && e.record.updated_at < before)
            .map(|e| e.record.clone())
            .collect();
        stale.sort_by(|a, b| a.updated_at.cmp(&b.updated_at));
        Ok(stale)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_lifecycle() {
        let store = MemoryStreamStore::new();
        let record = StreamRecord::new_pending(None);
        store.insert_stream(&record).await.unwrap();
        assert_eq!(store.len(), 1);

        let outcome = store
            .compare_and_set_status(
                &record.id,
                &[StreamStatus::Pending],
                StreamStatus::Streaming,
                Some("fence"),
            )
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CasOutcome::Applied {
                previous: StreamStatus::Pending
            }
        );

        let first = store
            .append_chunk(&record.id, "fence", ChunkPayload::text("a"))
            .await
            .unwrap();
        let second = store
            .append_chunk(&record.id, "fence", ChunkPayload::text("b"))
            .await
            .unwrap();
        assert_eq!((first.sequence, second.sequence), (0, 1));

        let snapshot = store.snapshot(&record.id, Some(0)).await.unwrap();
        assert_eq!(snapshot.chunks.len(), 1);
        assert_eq!(snapshot.chunks[0].payload.text, "b");
    }

    #[tokio::test]
    async fn test_memory_store_rejects_duplicate_insert() {
        let store = MemoryStreamStore::new();
        let record = StreamRecord::new_pending(None);
        store.insert_stream(&record).await.unwrap();
        assert!(store.insert_stream(&record).await.is_err());
    }

    #[tokio::test]
    async fn test_memory_store_fencing() {
        let store = MemoryStreamStore::new();
        let record = StreamRecord::new_pending(None);
        store.insert_stream(&record).await.unwrap();

        let err = store
            .append_chunk(&record.id, "fence", ChunkPayload::text("x"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StreamClosed {
                status: StreamStatus::Pending,
                ..
            }
        ));

        store
            .compare_and_set_status(
                &record.id,
                &[StreamStatus::Pending],
                StreamStatus::Streaming,
                Some("fence"),
            )
            .await
            .unwrap();
        let err = store
            .append_chunk(&record.id, "stale", ChunkPayload::text("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Fenced(_)));
    }
}
