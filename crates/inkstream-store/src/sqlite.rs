//! SQLite-backed stream store.
//!
//! Uses WAL mode so observers can read while a driver commits. Every mutating
//! operation runs inside an `IMMEDIATE` transaction, which makes status
//! check-and-set and chunk sequence assignment atomic even when several
//! processes share the database file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{Connection, OpenFlags, OptionalExtension, TransactionBehavior, params};
use tracing::{debug, info};

use crate::storage::StreamStore;
use crate::types::{
    CasOutcome, Chunk, ChunkPayload, StreamId, StreamRecord, StreamSnapshot, StreamStatus,
};
use crate::{Result, StoreError};

/// Current schema version, tracked in `PRAGMA user_version`.
const SCHEMA_VERSION: i32 = 1;

/// Stream store backed by a single SQLite connection.
///
/// Blocking database work is moved off the async runtime with
/// `spawn_blocking`; the connection itself is serialized by a mutex.
#[derive(Clone)]
pub struct SqliteStreamStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteStreamStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteStreamStore").finish_non_exhaustive()
    }
}

impl SqliteStreamStore {
    /// Open (or create) the database at `path` and bring the schema up to date.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self::from_connection(conn)?;
        info!("Stream store opened at {:?}", path);
        Ok(store)
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.busy_timeout(std::time::Duration::from_secs(5))?;
        create_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking thread pool.
    async fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock();
            f(&mut guard)
        })
        .await?
    }
}

fn create_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        debug!("Schema up to date (version {})", current_version);
        return Ok(());
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS streams (
            id TEXT PRIMARY KEY,
            status TEXT NOT NULL,
            input TEXT,
            drive_fence TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        -- Sweeper scans by status and age
        CREATE INDEX IF NOT EXISTS idx_streams_status_updated
            ON streams(status, updated_at);

        CREATE TABLE IF NOT EXISTS chunks (
            stream_id TEXT NOT NULL REFERENCES streams(id),
            sequence INTEGER NOT NULL,
            text TEXT NOT NULL,
            reasoning TEXT,
            created_at TEXT NOT NULL,
            PRIMARY KEY (stream_id, sequence)
        );
        "#,
    )
    .map_err(|e| StoreError::Migration(e.to_string()))?;

    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    info!("Schema created (version {})", SCHEMA_VERSION);
    Ok(())
}

#[async_trait]
impl StreamStore for SqliteStreamStore {
    async fn insert_stream(&self, record: &StreamRecord) -> Result<()> {
        let record = record.clone();
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO streams (id, status, input, drive_fence, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    record.id.as_str(),
                    record.status.as_str(),
                    record.input,
                    record.drive_fence,
                    fmt_dt(&record.created_at),
                    fmt_dt(&record.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn get_stream(&self, id: &StreamId) -> Result<StreamRecord> {
        let id = id.clone();
        self.with_conn(move |conn| load_stream(conn, &id)).await
    }

    async fn compare_and_set_status(
        &self,
        id: &StreamId,
        expected: &[StreamStatus],
        next: StreamStatus,
        fence: Option<&str>,
    ) -> Result<CasOutcome> {
        let id = id.clone();
        let expected = expected.to_vec();
        let fence = fence.map(String::from);

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let current = load_stream(&tx, &id)?.status;

            if !expected.contains(&current) {
                return Ok(CasOutcome::Conflict { current });
            }

            tx.execute(
                "UPDATE streams SET status = ?1, drive_fence = COALESCE(?2, drive_fence), updated_at = ?3
                 WHERE id = ?4",
                params![next.as_str(), fence, fmt_dt(&Utc::now()), id.as_str()],
            )?;
            tx.commit()?;

            Ok(CasOutcome::Applied { previous: current })
        })
        .await
    }

    async fn append_chunk(
        &self,
        id: &StreamId,
        fence: &str,
        payload: ChunkPayload,
    ) -> Result<Chunk> {
        let id = id.clone();
        let fence = fence.to_string();

        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let record = load_stream(&tx, &id)?;

            if record.status != StreamStatus::Streaming {
                return Err(StoreError::StreamClosed {
                    stream_id: id.to_string(),
                    status: record.status,
                });
            }
            if record.drive_fence.as_deref() != Some(fence.as_str()) {
                return Err(StoreError::Fenced(id.to_string()));
            }

            let sequence: i64 = tx.query_row(
                "SELECT COALESCE(MAX(sequence) + 1, 0) FROM chunks WHERE stream_id = ?1",
                params![id.as_str()],
                |row| row.get(0),
            )?;

            let now = Utc::now();
            let now_str = fmt_dt(&now);
            tx.execute(
                "INSERT INTO chunks (stream_id, sequence, text, reasoning, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![id.as_str(), sequence, payload.text, payload.reasoning, now_str],
            )?;
            tx.execute(
                "UPDATE streams SET updated_at = ?1 WHERE id = ?2",
                params![now_str, id.as_str()],
            )?;
            tx.commit()?;

            Ok(Chunk {
                stream_id: id,
                sequence: sequence as u64,
                payload,
                created_at: now,
            })
        })
        .await
    }

    async fn list_chunks(&self, id: &StreamId, after: Option<u64>) -> Result<Vec<Chunk>> {
        let id = id.clone();
        self.with_conn(move |conn| {
            // Unknown ids are an error, not an empty list
            load_stream(conn, &id)?;
            load_chunks(conn, &id, after)
        })
        .await
    }

    async fn snapshot(&self, id: &StreamId, after: Option<u64>) -> Result<StreamSnapshot> {
        let id = id.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let record = load_stream(&tx, &id)?;
            let chunks = load_chunks(&tx, &id, after)?;
            tx.commit()?;
            Ok(StreamSnapshot { record, chunks })
        })
        .await
    }

    async fn list_stale(
        &self,
        status: StreamStatus,
        before: DateTime<Utc>,
    ) -> Result<Vec<StreamRecord>> {
        self.with_conn(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id, status, input, drive_fence, created_at, updated_at
                 FROM streams WHERE status = ?1 AND updated_at < ?2 ORDER BY updated_at",
            )?;
            let iter = stmt.query_map(params![status.as_str(), fmt_dt(&before)], row_to_stream)?;
            let mut rows = Vec::new();
            for r in iter {
                rows.push(r?);
            }
            Ok(rows)
        })
        .await
    }

    async fn ping(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT COUNT(*) FROM streams", [], |row| row.get::<_, i64>(0))?;
            Ok(())
        })
        .await
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Fixed-width UTC timestamps so that string comparison orders correctly.
fn fmt_dt(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp. A bad value fails the row as a conversion error,
/// which surfaces as [`StoreError::Corrupt`].
fn parse_dt(row: &rusqlite::Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn load_stream(conn: &Connection, id: &StreamId) -> Result<StreamRecord> {
    conn.query_row(
        "SELECT id, status, input, drive_fence, created_at, updated_at
         FROM streams WHERE id = ?1",
        params![id.as_str()],
        row_to_stream,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(id.to_string()))
}

fn load_chunks(conn: &Connection, id: &StreamId, after: Option<u64>) -> Result<Vec<Chunk>> {
    let after = after.map_or(-1, |seq| seq as i64);
    let mut stmt = conn.prepare(
        "SELECT sequence, text, reasoning, created_at
         FROM chunks WHERE stream_id = ?1 AND sequence > ?2 ORDER BY sequence",
    )?;
    let iter = stmt.query_map(params![id.as_str(), after], |row| {
        Ok(Chunk {
            stream_id: id.clone(),
            sequence: row.get::<_, i64>(0)? as u64,
            payload: ChunkPayload {
                text: row.get(1)?,
                reasoning: row.get(2)?,
            },
            created_at: parse_dt(row, 3)?,
        })
    })?;

    let mut chunks = Vec::new();
    for c in iter {
        chunks.push(c?);
    }
    Ok(chunks)
}

fn row_to_stream(row: &rusqlite::Row<'_>) -> rusqlite::Result<StreamRecord> {
    let status: String = row.get(1)?;
    let status = status
        .parse::<StreamStatus>()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(1, Type::Text, Box::new(e)))?;

    Ok(StreamRecord {
        id: StreamId::from_string(row.get::<_, String>(0)?),
        status,
        input: row.get(2)?,
        drive_fence: row.get(3)?,
        created_at: parse_dt(row, 4)?,
        updated_at: parse_dt(row, 5)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_store() -> SqliteStreamStore {
        SqliteStreamStore::open_in_memory().expect("failed to open in-memory store")
    }

    async fn streaming(store: &SqliteStreamStore, fence: &str) -> StreamId {
        let record = StreamRecord::new_pending(None);
        store.insert_stream(&record).await.unwrap();
        let outcome = store
            .compare_and_set_status(
                &record.id,
                &[StreamStatus::Pending],
                StreamStatus::Streaming,
                Some(fence),
            )
            .await
            .unwrap();
        assert!(outcome.is_applied());
        record.id
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = test_store();
        let record = StreamRecord::new_pending(Some("write a haiku".into()));
        store.insert_stream(&record).await.unwrap();

        let fetched = store.get_stream(&record.id).await.unwrap();
        assert_eq!(fetched.id, record.id);
        assert_eq!(fetched.status, StreamStatus::Pending);
        assert_eq!(fetched.input.as_deref(), Some("write a haiku"));
        assert!(fetched.drive_fence.is_none());
    }

    #[tokio::test]
    async fn test_not_found() {
        let store = test_store();
        let err = store.get_stream(&StreamId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let err = store.list_chunks(&StreamId::new(), None).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_ping() {
        let store = test_store();
        store.ping().await.unwrap();

        store.conn.lock().execute("DROP TABLE chunks", []).unwrap();
        store.conn.lock().execute("DROP TABLE streams", []).unwrap();
        assert!(store.ping().await.is_err());
    }

    #[tokio::test]
    async fn test_append_to_unknown_stream() {
        let store = test_store();
        let id = StreamId::new();

        let err = store
            .append_chunk(&id, "f1", ChunkPayload::text("orphan"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));

        let count: i64 = store
            .conn
            .lock()
            .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_unparseable_timestamp_is_corrupt() {
        let store = test_store();
        let id = streaming(&store, "f1").await;
        store
            .conn
            .lock()
            .execute(
                "UPDATE streams SET updated_at = '0000-not-a-timestamp' WHERE id = ?1",
                params![id.as_str()],
            )
            .unwrap();

        let err = store.get_stream(&id).await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));

        let err = store
            .list_stale(StreamStatus::Streaming, Utc::now())
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[tokio::test]
    async fn test_compare_and_set_conflict() {
        let store = test_store();
        let id = streaming(&store, "f1").await;

        let outcome = store
            .compare_and_set_status(&id, &[StreamStatus::Pending], StreamStatus::Streaming, Some("f2"))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            CasOutcome::Conflict {
                current: StreamStatus::Streaming
            }
        );

        // Fence was not replaced by the losing attempt
        let record = store.get_stream(&id).await.unwrap();
        assert_eq!(record.drive_fence.as_deref(), Some("f1"));
    }

    #[tokio::test]
    async fn test_chunk_sequences_are_contiguous() {
        let store = test_store();
        let id = streaming(&store, "fence").await;

        for text in ["one. ", "two. ", "three"] {
            store
                .append_chunk(&id, "fence", ChunkPayload::text(text))
                .await
                .unwrap();
        }

        let chunks = store.list_chunks(&id, None).await.unwrap();
        let sequences: Vec<u64> = chunks.iter().map(|c| c.sequence).collect();
        assert_eq!(sequences, vec![0, 1, 2]);

        let tail = store.list_chunks(&id, Some(0)).await.unwrap();
        assert_eq!(tail.len(), 2);
        assert_eq!(tail[0].payload.text, "two. ");
    }

    #[tokio::test]
    async fn test_append_rejects_wrong_fence() {
        let store = test_store();
        let id = streaming(&store, "fence").await;

        let err = store
            .append_chunk(&id, "other", ChunkPayload::text("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Fenced(_)));
        assert!(store.list_chunks(&id, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_append_rejected_after_terminal() {
        let store = test_store();
        let id = streaming(&store, "fence").await;
        store
            .compare_and_set_status(&id, &[StreamStatus::Streaming], StreamStatus::Done, None)
            .await
            .unwrap();

        let err = store
            .append_chunk(&id, "fence", ChunkPayload::text("late"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::StreamClosed {
                status: StreamStatus::Done,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_append_rejected_while_pending() {
        let store = test_store();
        let record = StreamRecord::new_pending(None);
        store.insert_stream(&record).await.unwrap();

        let err = store
            .append_chunk(&record.id, "fence", ChunkPayload::text("early"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StreamClosed { .. }));
    }

    #[tokio::test]
    async fn test_snapshot_includes_reasoning() {
        let store = test_store();
        let id = streaming(&store, "fence").await;
        store
            .append_chunk(
                &id,
                "fence",
                ChunkPayload::text("Answer.").with_reasoning("Let me think."),
            )
            .await
            .unwrap();

        let snapshot = store.snapshot(&id, None).await.unwrap();
        assert_eq!(snapshot.record.status, StreamStatus::Streaming);
        assert_eq!(snapshot.chunks.len(), 1);
        assert_eq!(
            snapshot.chunks[0].payload.reasoning.as_deref(),
            Some("Let me think.")
        );
    }

    #[tokio::test]
    async fn test_list_stale() {
        let store = test_store();
        let id = streaming(&store, "fence").await;
        let pending = StreamRecord::new_pending(None);
        store.insert_stream(&pending).await.unwrap();

        let future = Utc::now() + chrono::Duration::seconds(10);
        let stale = store
            .list_stale(StreamStatus::Streaming, future)
            .await
            .unwrap();
        assert_eq!(stale.len(), 1);
        assert_eq!(stale[0].id, id);

        let past = Utc::now() - chrono::Duration::seconds(10);
        assert!(
            store
                .list_stale(StreamStatus::Streaming, past)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_reopen_persists_data() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("streams.db");

        let id = {
            let store = SqliteStreamStore::open(&path).unwrap();
            let id = streaming(&store, "fence").await;
            store
                .append_chunk(&id, "fence", ChunkPayload::text("durable"))
                .await
                .unwrap();
            id
        };

        let store = SqliteStreamStore::open(&path).unwrap();
        let snapshot = store.snapshot(&id, None).await.unwrap();
        assert_eq!(snapshot.chunks[0].payload.text, "durable");
    }
}
