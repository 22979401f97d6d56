//! Live transports: the ephemeral, token-level path to the driving client.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use inkstream_store::StreamStatus;

use crate::error::TransportError;
use crate::generator::Increment;

/// How a drive ended, as reported to the live client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriveEnd {
    pub status: StreamStatus,
    /// Failure detail. Only ever sent to the live client, never persisted.
    pub error: Option<String>,
}

impl DriveEnd {
    pub fn new(status: StreamStatus) -> Self {
        Self {
            status,
            error: None,
        }
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Sink for the live, per-increment feed of one drive.
///
/// A failed write is reported to the driver, which stops using the transport.
/// Persistence is never affected.
#[async_trait]
pub trait LiveTransport: Send {
    async fn write(&mut self, increment: &Increment) -> Result<(), TransportError>;

    async fn close(&mut self, end: &DriveEnd) -> Result<(), TransportError>;
}

pub type BoxedTransport = Box<dyn LiveTransport>;

// ─────────────────────────────────────────────────────────────────────────────
// Channel Transport
// ─────────────────────────────────────────────────────────────────────────────

/// An event on the live channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LiveEvent {
    Text { text: String },
    Reasoning { text: String },
    /// The drive finished without error (`done` or `timeout`).
    Done { status: StreamStatus },
    /// The drive failed.
    Error { message: String },
}

impl LiveEvent {
    /// Event name for framings that carry one (SSE).
    pub fn name(&self) -> &'static str {
        match self {
            LiveEvent::Text { .. } => "text",
            LiveEvent::Reasoning { .. } => "reasoning",
            LiveEvent::Done { .. } => "done",
            LiveEvent::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, LiveEvent::Done { .. } | LiveEvent::Error { .. })
    }
}

impl From<&Increment> for LiveEvent {
    fn from(increment: &Increment) -> Self {
        match increment {
            Increment::Text(text) => LiveEvent::Text { text: text.clone() },
            Increment::Reasoning(text) => LiveEvent::Reasoning { text: text.clone() },
        }
    }
}

impl From<&DriveEnd> for LiveEvent {
    fn from(end: &DriveEnd) -> Self {
        match (&end.error, end.status) {
            (Some(message), _) => LiveEvent::Error {
                message: message.clone(),
            },
            (None, StreamStatus::Error) => LiveEvent::Error {
                message: "generation failed".to_string(),
            },
            (None, status) => LiveEvent::Done { status },
        }
    }
}

/// Forwards the live feed into a bounded mpsc channel.
///
/// A dropped receiver (client went away) surfaces as [`TransportError::Closed`].
pub struct ChannelTransport {
    tx: mpsc::Sender<LiveEvent>,
}

impl ChannelTransport {
    pub fn new(tx: mpsc::Sender<LiveEvent>) -> Self {
        Self { tx }
    }

    /// Create a transport and the receiving end of its channel.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<LiveEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl LiveTransport for ChannelTransport {
    async fn write(&mut self, increment: &Increment) -> Result<(), TransportError> {
        self.tx
            .send(LiveEvent::from(increment))
            .await
            .map_err(|_| TransportError::Closed)
    }

    async fn close(&mut self, end: &DriveEnd) -> Result<(), TransportError> {
        self.tx
            .send(LiveEvent::from(end))
            .await
            .map_err(|_| TransportError::Closed)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Null Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Discards the live feed. For headless drives.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTransport;

#[async_trait]
impl LiveTransport for NullTransport {
    async fn write(&mut self, _increment: &Increment) -> Result<(), TransportError> {
        Ok(())
    }

    async fn close(&mut self, _end: &DriveEnd) -> Result<(), TransportError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Writer Transport
// ─────────────────────────────────────────────────────────────────────────────

/// Writes live text to any async writer, e.g. stdout.
pub struct WriterTransport<W> {
    writer: W,
    show_reasoning: bool,
    wrote_any: bool,
}

impl<W> WriterTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            show_reasoning: false,
            wrote_any: false,
        }
    }

    /// Also write reasoning increments.
    pub fn with_reasoning(mut self, show: bool) -> Self {
        self.show_reasoning = show;
        self
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> LiveTransport for WriterTransport<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, increment: &Increment) -> Result<(), TransportError> {
        if let Increment::Reasoning(_) = increment
            && !self.show_reasoning
        {
            return Ok(());
        }
        self.writer.write_all(increment.as_str().as_bytes()).await?;
        self.writer.flush().await?;
        self.wrote_any = true;
        Ok(())
    }

    async fn close(&mut self, end: &DriveEnd) -> Result<(), TransportError> {
        if self.wrote_any {
            self.writer.write_all(b"\n").await?;
        }
        if let Some(error) = &end.error {
            let line = format!("[{}] {}\n", end.status, error);
            self.writer.write_all(line.as_bytes()).await?;
        }
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_channel_transport_events() {
        let (mut transport, mut rx) = ChannelTransport::channel(8);
        transport.write(&Increment::text("hi")).await.unwrap();
        transport.write(&Increment::reasoning("hmm")).await.unwrap();
        transport
            .close(&DriveEnd::new(StreamStatus::Done))
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap(), LiveEvent::Text { text: "hi".into() });
        assert_eq!(
            rx.recv().await.unwrap(),
            LiveEvent::Reasoning { text: "hmm".into() }
        );
        let end = rx.recv().await.unwrap();
        assert!(end.is_terminal());
        assert_eq!(
            end,
            LiveEvent::Done {
                status: StreamStatus::Done
            }
        );
    }

    #[tokio::test]
    async fn test_channel_transport_reports_closed_receiver() {
        let (mut transport, rx) = ChannelTransport::channel(1);
        drop(rx);
        let err = transport.write(&Increment::text("lost")).await.unwrap_err();
        assert!(matches!(err, TransportError::Closed));
    }

    #[test]
    fn test_end_event_mapping() {
        let failed = DriveEnd::new(StreamStatus::Error).with_error("model exploded");
        assert_eq!(
            LiveEvent::from(&failed),
            LiveEvent::Error {
                message: "model exploded".into()
            }
        );
        assert_eq!(LiveEvent::from(&DriveEnd::new(StreamStatus::Timeout)).name(), "done");
        assert_eq!(LiveEvent::from(&DriveEnd::new(StreamStatus::Error)).name(), "error");
    }

    #[test]
    fn test_live_event_json_shape() {
        let json = serde_json::to_value(LiveEvent::Done {
            status: StreamStatus::Timeout,
        })
        .unwrap();
        assert_eq!(json["type"], "done");
        assert_eq!(json["status"], "timeout");
    }

    #[tokio::test]
    async fn test_writer_transport_hides_reasoning_by_default() {
        let mut transport = WriterTransport::new(Vec::new());
        transport.write(&Increment::reasoning("secret")).await.unwrap();
        transport.write(&Increment::text("Hello")).await.unwrap();
        transport
            .close(&DriveEnd::new(StreamStatus::Done))
            .await
            .unwrap();

        let out = String::from_utf8(transport.into_inner()).unwrap();
        assert_eq!(out, "Hello\n");
    }

    #[tokio::test]
    async fn test_writer_transport_reports_error() {
        let mut transport = WriterTransport::new(Vec::new()).with_reasoning(true);
        transport.write(&Increment::reasoning("r")).await.unwrap();
        transport
            .close(&DriveEnd::new(StreamStatus::Error).with_error("boom"))
            .await
            .unwrap();

        let out = String::from_utf8(transport.into_inner()).unwrap();
        assert_eq!(out, "r\n[error] boom\n");
    }
}
