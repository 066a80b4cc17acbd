//! The write side of one connection, as seen by the hub.
//!
//! The hub never touches a socket directly.  It holds an
//! `Arc<dyn ConnectionSink>` per member and calls [`ConnectionSink::send_text`]
//! during fan-out and [`ConnectionSink::close`] on removal.  The WebSocket
//! implementation lives in `infrastructure::connection`; tests substitute
//! in-memory or mocked sinks.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Why a write to a connection failed.  Every variant is fatal to that one
/// connection and to nothing else.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The peer already closed, or a close was already sent.
    #[error("connection closed")]
    Closed,

    /// The write did not finish within the fan-out deadline.
    #[error("write timed out after {0:?}")]
    Timeout(Duration),

    /// Any other transport failure, flattened to text so this layer stays
    /// independent of the WebSocket library.
    #[error("transport error: {0}")]
    Transport(String),
}

/// Outbound half of one live connection.
///
/// Implementations must tolerate concurrent calls: two broadcasts in quick
/// succession spawn two independent write attempts against the same sink.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConnectionSink: Send + Sync {
    /// Writes one text frame.
    async fn send_text(&self, payload: Arc<str>) -> Result<(), SinkError>;

    /// Sends a normal-closure frame and releases the transport.  Closing an
    /// already-closed sink is a no-op.
    async fn close(&self);
}
