use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::StoreError;

// ─────────────────────────────────────────────────────────────────────────────
// Stream Identity
// ─────────────────────────────────────────────────────────────────────────────

/// Opaque identifier for a stream.
///
/// Rendered as 32 lowercase hex characters, so it embeds safely in URL paths,
/// query strings and storage keys. Callers must not parse it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StreamId(String);

impl StreamId {
    /// Allocate a fresh, globally unique id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    /// Wrap an id received from a caller (URL path, CLI argument, database row).
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for StreamId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        Self::from_string(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Stream Status
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle status of a stream.
///
/// The only legal forward transitions are `Pending -> Streaming` and
/// `Streaming -> {Done, Error, Timeout}`. Terminal states never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamStatus {
    Pending,
    Streaming,
    Done,
    Error,
    Timeout,
}

impl StreamStatus {
    /// All terminal statuses.
    pub const TERMINAL: [StreamStatus; 3] = [Self::Done, Self::Error, Self::Timeout];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Streaming => "streaming",
            Self::Done => "done",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }

    /// Whether no further transitions or chunk commits are allowed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Timeout)
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: StreamStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::Streaming) => true,
            (Self::Streaming, next) => next.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StreamStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "streaming" => Ok(Self::Streaming),
            "done" => Ok(Self::Done),
            "error" => Ok(Self::Error),
            "timeout" => Ok(Self::Timeout),
            other => Err(StoreError::Corrupt(format!("unknown stream status '{other}'"))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// The stored row for one stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamRecord {
    pub id: StreamId,
    pub status: StreamStatus,
    /// Caller-supplied generation input (e.g. a prompt). Opaque to the lifecycle.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Fence issued when the stream entered `streaming`. Never serialized.
    #[serde(skip)]
    pub drive_fence: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StreamRecord {
    /// A fresh `pending` record with a newly allocated id.
    pub fn new_pending(input: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: StreamId::new(),
            status: StreamStatus::Pending,
            input,
            drive_fence: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Content of one chunk: primary text plus the auxiliary reasoning channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkPayload {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl ChunkPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            reasoning: None,
        }
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = Some(reasoning.into());
        self
    }

    /// True when neither channel carries any content.
    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.reasoning.as_deref().is_none_or(str::is_empty)
    }

    /// Combined byte length of both channels.
    pub fn len(&self) -> usize {
        self.text.len() + self.reasoning.as_deref().map_or(0, str::len)
    }
}

/// An immutable, committed fragment of a stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub stream_id: StreamId,
    pub sequence: u64,
    #[serde(flatten)]
    pub payload: ChunkPayload,
    pub created_at: DateTime<Utc>,
}

/// A consistent read of a stream row and its chunks.
///
/// Both parts come from the same transaction, so the chunks never contradict
/// the status.
#[derive(Debug, Clone)]
pub struct StreamSnapshot {
    pub record: StreamRecord,
    pub chunks: Vec<Chunk>,
}

/// Result of a check-and-set on a stream's status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CasOutcome {
    /// The transition was applied; `previous` is the status it replaced.
    Applied { previous: StreamStatus },
    /// The current status was not among the expected ones; nothing changed.
    Conflict { current: StreamStatus },
}

impl CasOutcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, CasOutcome::Applied { .. })
    }
}
