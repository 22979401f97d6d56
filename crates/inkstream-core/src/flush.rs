//! Flush policy: when buffered text becomes a committed chunk.
//!
//! Text is committed when one of these holds:
//!
//! - the buffer contains a sentence boundary followed by more content
//!   (everything up to the last such boundary is committed, the rest is kept),
//! - the buffer reaches `max_buffer_bytes`,
//! - the oldest buffered text is older than `max_buffer_age`,
//! - the drive ends for any reason (final flush).
//!
//! Reasoning accumulates next to the text and is committed with whatever text
//! flushes, so both channels share chunk boundaries.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use inkstream_store::ChunkPayload;

// ─────────────────────────────────────────────────────────────────────────────
// Boundary Detection
// ─────────────────────────────────────────────────────────────────────────────

/// Finds the point up to which buffered text may be committed.
pub trait BoundaryDetector: Send + Sync {
    /// Byte offset just past the last committable boundary in `buf`, or
    /// `None` when no boundary with content after it exists.
    fn split_point(&self, buf: &str) -> Option<usize>;
}

/// Sentence boundary detector.
///
/// A terminator counts only when followed by whitespace (a `'\n'` terminator
/// is its own whitespace) and then by non-whitespace content. The split lands
/// after the whitespace run, so `"Hello world. This is"` splits into
/// `"Hello world. "` and `"This is"`. Decimals like `3.14` and URLs never
/// split.
#[derive(Debug, Clone)]
pub struct SentenceBoundary {
    terminators: Vec<char>,
}

impl SentenceBoundary {
    pub const DEFAULT_TERMINATORS: [char; 4] = ['.', '!', '?', '\n'];

    pub fn new(terminators: impl IntoIterator<Item = char>) -> Self {
        Self {
            terminators: terminators.into_iter().collect(),
        }
    }

    fn is_terminator(&self, c: char) -> bool {
        self.terminators.contains(&c)
    }
}

impl Default for SentenceBoundary {
    fn default() -> Self {
        Self::new(Self::DEFAULT_TERMINATORS)
    }
}

impl BoundaryDetector for SentenceBoundary {
    fn split_point(&self, buf: &str) -> Option<usize> {
        // Scanning right to left: nearest non-whitespace char to the right
        // of the current position, and whether the immediate right neighbour
        // is whitespace.
        let mut next_content: Option<usize> = None;
        let mut right_is_ws = false;

        for (idx, c) in buf.char_indices().rev() {
            if self.is_terminator(c)
                && (right_is_ws || c == '\n')
                && let Some(split) = next_content
            {
                return Some(split);
            }

            right_is_ws = c.is_whitespace();
            if !right_is_ws {
                next_content = Some(idx);
            }
        }
        None
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Policy
// ─────────────────────────────────────────────────────────────────────────────

/// Thresholds and boundary rule for coalescing increments into chunks.
#[derive(Clone)]
pub struct FlushPolicy {
    /// Flush the whole buffer once text plus reasoning reaches this many bytes.
    pub max_buffer_bytes: usize,
    /// Flush the whole buffer once its oldest content is this old.
    pub max_buffer_age: Option<Duration>,
    pub boundary: Arc<dyn BoundaryDetector>,
}

impl Default for FlushPolicy {
    fn default() -> Self {
        Self {
            max_buffer_bytes: 1024,
            max_buffer_age: Some(Duration::from_secs(2)),
            boundary: Arc::new(SentenceBoundary::default()),
        }
    }
}

impl fmt::Debug for FlushPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlushPolicy")
            .field("max_buffer_bytes", &self.max_buffer_bytes)
            .field("max_buffer_age", &self.max_buffer_age)
            .finish_non_exhaustive()
    }
}

impl FlushPolicy {
    pub fn with_max_buffer_bytes(mut self, bytes: usize) -> Self {
        self.max_buffer_bytes = bytes.max(1);
        self
    }

    /// `None` disables age-based flushing.
    pub fn with_max_buffer_age(mut self, age: Option<Duration>) -> Self {
        self.max_buffer_age = age;
        self
    }

    pub fn with_boundary(mut self, boundary: impl BoundaryDetector + 'static) -> Self {
        self.boundary = Arc::new(boundary);
        self
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Chunk Buffer
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory accumulation of not yet committed text and reasoning.
#[derive(Debug)]
pub struct ChunkBuffer {
    policy: FlushPolicy,
    text: String,
    reasoning: String,
    /// When the current buffered content started accumulating.
    since: Option<Instant>,
}

impl ChunkBuffer {
    pub fn new(policy: FlushPolicy) -> Self {
        Self {
            policy,
            text: String::new(),
            reasoning: String::new(),
            since: None,
        }
    }

    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        self.touch();
        self.text.push_str(text);
    }

    pub fn push_reasoning(&mut self, reasoning: &str) {
        if reasoning.is_empty() {
            return;
        }
        self.touch();
        self.reasoning.push_str(reasoning);
    }

    fn touch(&mut self) {
        if self.since.is_none() {
            self.since = Some(Instant::now());
        }
    }

    pub fn len(&self) -> usize {
        self.text.len() + self.reasoning.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty() && self.reasoning.is_empty()
    }

    /// Instant at which the buffer becomes due for an age flush.
    pub fn deadline(&self) -> Option<Instant> {
        let age = self.policy.max_buffer_age?;
        self.since.map(|since| since + age)
    }

    /// Take the next chunk the policy says is ready, if any.
    ///
    /// Call repeatedly until it returns `None`.
    pub fn take_ready(&mut self) -> Option<ChunkPayload> {
        if let Some(split) = self.policy.boundary.split_point(&self.text) {
            let head: String = self.text.drain(..split).collect();
            let reasoning = std::mem::take(&mut self.reasoning);
            // The remainder starts a fresh age window
            self.since = if self.is_empty() {
                None
            } else {
                Some(Instant::now())
            };
            return Some(make_payload(head, reasoning));
        }

        if self.len() >= self.policy.max_buffer_bytes {
            return self.take_all();
        }
        None
    }

    /// Take everything if the age deadline has passed.
    pub fn take_expired(&mut self, now: Instant) -> Option<ChunkPayload> {
        match self.deadline() {
            Some(deadline) if now >= deadline => self.take_all(),
            _ => None,
        }
    }

    /// Take the whole buffer. `None` when there is nothing to commit.
    pub fn take_all(&mut self) -> Option<ChunkPayload> {
        self.since = None;
        if self.is_empty() {
            return None;
        }
        let text = std::mem::take(&mut self.text);
        let reasoning = std::mem::take(&mut self.reasoning);
        Some(make_payload(text, reasoning))
    }
}

fn make_payload(text: String, reasoning: String) -> ChunkPayload {
    ChunkPayload {
        text,
        reasoning: (!reasoning.is_empty()).then_some(reasoning),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer() -> ChunkBuffer {
        ChunkBuffer::new(FlushPolicy::default().with_max_buffer_age(None))
    }

    #[test]
    fn test_split_keeps_trailing_whitespace_with_boundary() {
        let b = SentenceBoundary::default();
        let buf = "Hello world. This is";
        let split = b.split_point(buf).unwrap();
        assert_eq!(&buf[..split], "Hello world. ");
        assert_eq!(&buf[split..], "This is");
    }

    #[test]
    fn test_split_requires_following_content() {
        let b = SentenceBoundary::default();
        assert_eq!(b.split_point("Hello world."), None);
        assert_eq!(b.split_point("Hello world. "), None);
        assert_eq!(b.split_point("no boundary here"), None);
        assert_eq!(b.split_point(""), None);
    }

    #[test]
    fn test_split_ignores_decimals_and_urls() {
        let b = SentenceBoundary::default();
        assert_eq!(b.split_point("pi is 3.14159"), None);
        assert_eq!(b.split_point("see example.com/a?b=c"), None);
    }

    #[test]
    fn test_split_uses_last_boundary() {
        let b = SentenceBoundary::default();
        let buf = "One. Two! Three? Four";
        let split = b.split_point(buf).unwrap();
        assert_eq!(&buf[..split], "One. Two! Three? ");
    }

    #[test]
    fn test_split_on_newline() {
        let b = SentenceBoundary::default();
        let buf = "- item one\n- item two";
        let split = b.split_point(buf).unwrap();
        assert_eq!(&buf[..split], "- item one\n");

        let buf = "Done.\n\nNext";
        let split = b.split_point(buf).unwrap();
        assert_eq!(&buf[..split], "Done.\n\n");
    }

    #[test]
    fn test_split_handles_multibyte() {
        let b = SentenceBoundary::default();
        let buf = "Ça va. Très bien";
        let split = b.split_point(buf).unwrap();
        assert_eq!(&buf[..split], "Ça va. ");
    }

    #[test]
    fn test_custom_terminators() {
        let b = SentenceBoundary::new(['。']);
        let buf = "你好。 世界";
        let split = b.split_point(buf).unwrap();
        assert_eq!(&buf[split..], "世界");
        assert_eq!(b.split_point("Hello. World"), None);
    }

    #[test]
    fn test_buffer_flushes_at_boundary() {
        let mut buf = buffer();
        buf.push_text("Hello ");
        assert!(buf.take_ready().is_none());
        buf.push_text("world. This is");

        let chunk = buf.take_ready().unwrap();
        assert_eq!(chunk.text, "Hello world. ");
        assert!(buf.take_ready().is_none());

        let rest = buf.take_all().unwrap();
        assert_eq!(rest.text, "This is");
        assert!(buf.take_all().is_none());
    }

    #[test]
    fn test_buffer_flushes_at_size_threshold() {
        let mut buf = ChunkBuffer::new(
            FlushPolicy::default()
                .with_max_buffer_bytes(16)
                .with_max_buffer_age(None),
        );
        buf.push_text("aaaaaaaaaa");
        assert!(buf.take_ready().is_none());
        buf.push_text("bbbbbbbbbb");

        let chunk = buf.take_ready().unwrap();
        assert_eq!(chunk.text, "aaaaaaaaaabbbbbbbbbb");
        assert!(buf.is_empty());
    }

    #[test]
    fn test_reasoning_flushes_with_text() {
        let mut buf = buffer();
        buf.push_reasoning("Thinking about it.");
        buf.push_text("Yes. And");

        let chunk = buf.take_ready().unwrap();
        assert_eq!(chunk.text, "Yes. ");
        assert_eq!(chunk.reasoning.as_deref(), Some("Thinking about it."));

        let rest = buf.take_all().unwrap();
        assert_eq!(rest.text, "And");
        assert!(rest.reasoning.is_none());
    }

    #[test]
    fn test_reasoning_counts_toward_threshold() {
        let mut buf = ChunkBuffer::new(
            FlushPolicy::default()
                .with_max_buffer_bytes(8)
                .with_max_buffer_age(None),
        );
        buf.push_reasoning("hmmmmmmmmm");
        let chunk = buf.take_ready().unwrap();
        assert_eq!(chunk.text, "");
        assert_eq!(chunk.reasoning.as_deref(), Some("hmmmmmmmmm"));
    }

    #[test]
    fn test_empty_buffer_never_produces_chunk() {
        let mut buf = buffer();
        buf.push_text("");
        buf.push_reasoning("");
        assert!(buf.take_ready().is_none());
        assert!(buf.take_all().is_none());
        assert!(buf.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffer_expires_after_max_age() {
        let mut buf = ChunkBuffer::new(
            FlushPolicy::default().with_max_buffer_age(Some(Duration::from_millis(500))),
        );
        buf.push_text("slow");
        let deadline = buf.deadline().unwrap();

        assert!(buf.take_expired(Instant::now()).is_none());
        tokio::time::advance(Duration::from_millis(500)).await;
        assert!(Instant::now() >= deadline);

        let chunk = buf.take_expired(Instant::now()).unwrap();
        assert_eq!(chunk.text, "slow");
        assert!(buf.deadline().is_none());
    }
}
