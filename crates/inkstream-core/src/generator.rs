//! Text generators and the appender they write through.

use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::{Stream, StreamExt};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::error::GenerationError;

// ─────────────────────────────────────────────────────────────────────────────
// Increment
// ─────────────────────────────────────────────────────────────────────────────

/// One piece of generator output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Increment {
    /// Primary text.
    Text(String),
    /// Auxiliary reasoning text.
    Reasoning(String),
}

impl Increment {
    pub fn text(s: impl Into<String>) -> Self {
        Increment::Text(s.into())
    }

    pub fn reasoning(s: impl Into<String>) -> Self {
        Increment::Reasoning(s.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Increment::Text(s) | Increment::Reasoning(s) => s,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.as_str().is_empty()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Appender
// ─────────────────────────────────────────────────────────────────────────────

struct Sinks {
    live: mpsc::UnboundedSender<Increment>,
    persist: mpsc::UnboundedSender<Increment>,
}

/// Handle a generator uses to emit output during a drive.
///
/// Each append is forwarded to the live sink and the persist sink. Once the
/// drive closes the appender (generation ended, timed out or storage failed),
/// every clone rejects further output with [`GenerationError::Closed`].
#[derive(Clone)]
pub struct Appender {
    sinks: Arc<Mutex<Option<Sinks>>>,
}

impl Appender {
    pub(crate) fn new(
        live: mpsc::UnboundedSender<Increment>,
        persist: mpsc::UnboundedSender<Increment>,
    ) -> Self {
        Self {
            sinks: Arc::new(Mutex::new(Some(Sinks { live, persist }))),
        }
    }

    /// Append primary text.
    pub fn append(&self, text: impl Into<String>) -> Result<(), GenerationError> {
        self.push(Increment::Text(text.into()))
    }

    /// Append reasoning text.
    pub fn append_reasoning(&self, text: impl Into<String>) -> Result<(), GenerationError> {
        self.push(Increment::Reasoning(text.into()))
    }

    pub fn push(&self, increment: Increment) -> Result<(), GenerationError> {
        let guard = self.sinks.lock();
        let Some(sinks) = guard.as_ref() else {
            return Err(GenerationError::Closed);
        };
        if increment.is_empty() {
            return Ok(());
        }

        // The live sink may already have given up on its transport
        let _ = sinks.live.send(increment.clone());
        sinks
            .persist
            .send(increment)
            .map_err(|_| GenerationError::Closed)
    }

    pub fn is_closed(&self) -> bool {
        self.sinks.lock().is_none()
    }

    /// Drop both senders. Everything appended before this call is already
    /// queued for both sinks.
    pub(crate) fn close(&self) {
        self.sinks.lock().take();
    }
}

impl std::fmt::Debug for Appender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Appender")
            .field("closed", &self.is_closed())
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Generator Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Produces text for one drive.
///
/// `generate` runs until the generator is exhausted (`Ok`) or fails (`Err`).
/// The future may be dropped at any await point when the drive times out.
#[async_trait]
pub trait TextGenerator: Send {
    async fn generate(&mut self, appender: Appender) -> Result<(), GenerationError>;
}

/// A boxed generator as handed to the driver.
pub type BoxedGenerator = Box<dyn TextGenerator>;

// ─────────────────────────────────────────────────────────────────────────────
// Adapters
// ─────────────────────────────────────────────────────────────────────────────

/// Type alias for a boxed increment stream.
pub type IncrementStream =
    Pin<Box<dyn Stream<Item = Result<Increment, GenerationError>> + Send>>;

/// Drives any stream of increments through the appender.
pub struct StreamGenerator {
    stream: IncrementStream,
}

impl StreamGenerator {
    pub fn new(
        stream: impl Stream<Item = Result<Increment, GenerationError>> + Send + 'static,
    ) -> Self {
        Self {
            stream: Box::pin(stream),
        }
    }
}

#[async_trait]
impl TextGenerator for StreamGenerator {
    async fn generate(&mut self, appender: Appender) -> Result<(), GenerationError> {
        while let Some(item) = self.stream.next().await {
            appender.push(item?)?;
        }
        Ok(())
    }
}

/// Deterministic generator that replays a fixed script.
///
/// Used by tests and the `echo` generator. Optional per-item delay, a failure
/// after the script, or never finishing at all.
#[derive(Debug, Clone, Default)]
pub struct ScriptedGenerator {
    items: Vec<Increment>,
    delay: Option<Duration>,
    fail_with: Option<String>,
    hang: bool,
}

impl ScriptedGenerator {
    pub fn new(items: impl IntoIterator<Item = Increment>) -> Self {
        Self {
            items: items.into_iter().collect(),
            ..Default::default()
        }
    }

    /// Script of text increments only.
    pub fn from_text<I, S>(pieces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(pieces.into_iter().map(|s| Increment::Text(s.into())))
    }

    /// Echo `input` back word by word, keeping the original whitespace.
    pub fn echo(input: &str) -> Self {
        Self::from_text(split_words(input))
    }

    /// Sleep this long before each item.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail with this message after the script has been emitted.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.fail_with = Some(message.into());
        self
    }

    /// Never return after the script has been emitted.
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&mut self, appender: Appender) -> Result<(), GenerationError> {
        for item in self.items.drain(..) {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            appender.push(item)?;
        }

        if let Some(message) = self.fail_with.take() {
            return Err(GenerationError::Failed(message));
        }
        if self.hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }
}

/// Split text into words, each word carrying its trailing whitespace.
fn split_words(input: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut in_space = false;

    for c in input.chars() {
        if !c.is_whitespace() && in_space {
            words.push(std::mem::take(&mut current));
            in_space = false;
        }
        if c.is_whitespace() {
            in_space = true;
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appender() -> (
        Appender,
        mpsc::UnboundedReceiver<Increment>,
        mpsc::UnboundedReceiver<Increment>,
    ) {
        let (live_tx, live_rx) = mpsc::unbounded_channel();
        let (persist_tx, persist_rx) = mpsc::unbounded_channel();
        (Appender::new(live_tx, persist_tx), live_rx, persist_rx)
    }

    #[test]
    fn test_appender_fans_out() {
        let (appender, mut live, mut persist) = appender();
        appender.append("hello").unwrap();
        appender.append_reasoning("hmm").unwrap();

        assert_eq!(live.try_recv().unwrap(), Increment::text("hello"));
        assert_eq!(live.try_recv().unwrap(), Increment::reasoning("hmm"));
        assert_eq!(persist.try_recv().unwrap(), Increment::text("hello"));
        assert_eq!(persist.try_recv().unwrap(), Increment::reasoning("hmm"));
    }

    #[test]
    fn test_appender_survives_live_sink_loss() {
        let (appender, live, mut persist) = appender();
        drop(live);
        appender.append("still persisted").unwrap();
        assert_eq!(persist.try_recv().unwrap(), Increment::text("still persisted"));
    }

    #[test]
    fn test_closed_appender_rejects_all_clones() {
        let (appender, mut live, mut persist) = appender();
        let clone = appender.clone();
        appender.close();

        assert!(clone.is_closed());
        assert!(matches!(clone.append("late"), Err(GenerationError::Closed)));
        assert!(live.try_recv().is_err());
        assert!(persist.try_recv().is_err());
    }

    #[test]
    fn test_empty_increments_are_skipped() {
        let (appender, mut live, _persist) = appender();
        appender.append("").unwrap();
        assert!(live.try_recv().is_err());
    }

    #[test]
    fn test_split_words_keeps_whitespace() {
        let words = split_words("Hello  world.\nBye");
        assert_eq!(words, vec!["Hello  ", "world.\n", "Bye"]);
        assert_eq!(words.concat(), "Hello  world.\nBye");
        assert!(split_words("").is_empty());
    }

    #[tokio::test]
    async fn test_stream_generator_propagates_failure() {
        let (appender, mut live, _persist) = appender();
        let items = vec![
            Ok(Increment::text("a")),
            Err(GenerationError::failed("upstream broke")),
            Ok(Increment::text("never")),
        ];
        let mut generator = StreamGenerator::new(futures::stream::iter(items));

        let err = generator.generate(appender).await.unwrap_err();
        assert!(matches!(err, GenerationError::Failed(_)));
        assert_eq!(live.try_recv().unwrap(), Increment::text("a"));
        assert!(live.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_scripted_generator_failure() {
        let (appender, _live, mut persist) = appender();
        let mut generator = ScriptedGenerator::from_text(["x", "y"]).failing("boom");

        let err = generator.generate(appender).await.unwrap_err();
        assert_eq!(err.to_string(), "Generation failed: boom");
        assert_eq!(persist.try_recv().unwrap(), Increment::text("x"));
        assert_eq!(persist.try_recv().unwrap(), Increment::text("y"));
    }
}
