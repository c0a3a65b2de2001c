//! Event Sink Port (Driver Port)
//!
//! The transport a delivery loop writes newline-delimited lines to.

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Event sink error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SinkError {
    /// The receiving side went away.
    #[error("Event sink closed")]
    Closed,

    /// The transport cannot push lines incrementally.
    #[error("Event sink does not support incremental flushing")]
    FlushUnsupported,
}

/// Destination for stream lines.
#[async_trait]
pub trait EventSink: Send {
    /// Whether each line reaches the client as soon as it is sent.
    fn supports_flush(&self) -> bool;

    /// Write one line (already newline-terminated).
    async fn send(&mut self, line: String) -> Result<(), SinkError>;
}

/// Sink backed by a bounded channel; the receiver feeds a response body.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<String>,
}

impl ChannelSink {
    /// Create a sink and the receiver that drains it.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl EventSink for ChannelSink {
    fn supports_flush(&self) -> bool {
        true
    }

    async fn send(&mut self, line: String) -> Result<(), SinkError> {
        self.tx.send(line).await.map_err(|_| SinkError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn channel_sink_delivers_lines() {
        let (mut sink, mut rx) = ChannelSink::channel(4);

        sink.send("one\n".to_string()).await.unwrap();

        assert!(sink.supports_flush());
        assert_eq!(rx.recv().await.as_deref(), Some("one\n"));
    }

    #[tokio::test]
    async fn channel_sink_reports_closed_receiver() {
        let (mut sink, rx) = ChannelSink::channel(4);
        drop(rx);

        assert_eq!(sink.send("x\n".to_string()).await, Err(SinkError::Closed));
    }
}
