//! Per-connection I/O adapter.
//!
//! An upgraded WebSocket is split into two halves:
//!
//! - The **write half** becomes a [`WsSink`], handed to the hub as the
//!   member's [`ConnectionSink`].  An async mutex serialises concurrent
//!   fan-out writes to the same socket.
//! - The **read half** is driven by [`run_read_loop`] on the connection's own
//!   task: read a frame (with a deadline), run it through the
//!   [`InboundFilter`], and broadcast what survives.
//!
//! [`serve_connection`] ties the two together and guarantees that the
//! adapter submits exactly one `unregister` for its handle, whichever way
//! the read loop ends.
//!
//! The two halves share a [`CancellationToken`].  When the hub removes the
//! member and calls [`ConnectionSink::close`], the token fires and the read
//! loop stops at once, so a removed connection can never broadcast again.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::time;
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message as WsMessage};
use tokio_tungstenite::WebSocketStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::{ConnectionSink, FrameRejection, Hub, InboundFilter, SinkError};
use crate::domain::{ConnectionId, HubConfig};

// ── Write half ────────────────────────────────────────────────────────────────

/// The hub-facing write half of one WebSocket.
pub struct WsSink<S> {
    inner: Mutex<SplitSink<WebSocketStream<S>, WsMessage>>,
    closed: AtomicBool,
    /// Fired by `close`; the read half of the same connection watches it.
    cancel: CancellationToken,
}

impl<S> WsSink<S> {
    pub fn new(inner: SplitSink<WebSocketStream<S>, WsMessage>, cancel: CancellationToken) -> Self {
        Self {
            inner: Mutex::new(inner),
            closed: AtomicBool::new(false),
            cancel,
        }
    }
}

#[async_trait]
impl<S> ConnectionSink for WsSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send_text(&self, payload: Arc<str>) -> Result<(), SinkError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SinkError::Closed);
        }
        let mut sink = self.inner.lock().await;
        sink.send(WsMessage::Text(payload.to_string()))
            .await
            .map_err(sink_error)
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        // Stop the read loop before the close handshake, which may stall.
        self.cancel.cancel();
        let frame = CloseFrame {
            code: CloseCode::Normal,
            reason: "unregistered".into(),
        };
        let mut sink = self.inner.lock().await;
        if let Err(e) = sink.send(WsMessage::Close(Some(frame))).await {
            // Usually the peer got there first.
            debug!("close frame not sent: {e}");
        }
    }
}

fn sink_error(e: WsError) -> SinkError {
    match e {
        WsError::ConnectionClosed | WsError::AlreadyClosed => SinkError::Closed,
        other => SinkError::Transport(other.to_string()),
    }
}

// ── Read half ─────────────────────────────────────────────────────────────────

/// Why a read loop stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadLoopEnd {
    /// The peer sent a Close frame with this code (`None` if the frame had no
    /// payload).
    CloseFrame(Option<CloseCode>),
    /// The stream ended without a Close frame, or was already closed.
    StreamEnded,
    /// Nothing arrived within the read deadline.
    ReadTimeout,
    /// Any other transport error.
    Transport(String),
    /// The hub removed the connection and closed it from our side.
    Unregistered,
}

impl ReadLoopEnd {
    /// `true` for the endings a well-behaved client produces: a Close frame
    /// with Normal or Away, an empty Close frame, or the socket simply ending.
    pub fn is_clean(&self) -> bool {
        matches!(
            self,
            Self::CloseFrame(None | Some(CloseCode::Normal | CloseCode::Away))
                | Self::StreamEnded
                | Self::Unregistered
        )
    }
}

/// Pulls frames until the connection ends, broadcasting every admitted one.
///
/// Rejected frames (rate limited, undecodable, invalid) are logged and
/// skipped; only transport-level conditions or `cancel` end the loop.
pub async fn run_read_loop<S>(
    mut stream: SplitStream<WebSocketStream<S>>,
    id: ConnectionId,
    hub: &Hub,
    mut filter: InboundFilter,
    read_timeout: Duration,
    cancel: &CancellationToken,
) -> ReadLoopEnd
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ReadLoopEnd::Unregistered,
            next = time::timeout(read_timeout, stream.next()) => next,
        };
        let frame = match next {
            Err(_) => return ReadLoopEnd::ReadTimeout,
            Ok(None) => return ReadLoopEnd::StreamEnded,
            Ok(Some(Err(
                WsError::ConnectionClosed
                | WsError::AlreadyClosed
                | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake),
            ))) => return ReadLoopEnd::StreamEnded,
            Ok(Some(Err(e))) => return ReadLoopEnd::Transport(e.to_string()),
            Ok(Some(Ok(frame))) => frame,
        };

        let bytes = match frame {
            WsMessage::Text(text) => text.into_bytes(),
            // Binary frames are accepted when they carry the same UTF-8 JSON.
            WsMessage::Binary(data) => data,
            WsMessage::Close(frame) => {
                return ReadLoopEnd::CloseFrame(frame.map(|f| f.code));
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {
                // Control traffic: tungstenite answers pings itself.  Still
                // counts as activity for the read deadline.
                continue;
            }
        };

        let admitted = tokio::select! {
            biased;
            _ = cancel.cancelled() => return ReadLoopEnd::Unregistered,
            admitted = filter.admit(&bytes) => admitted,
        };

        match admitted {
            Ok(_) if cancel.is_cancelled() => return ReadLoopEnd::Unregistered,
            Ok(message) => {
                debug!(connection = %id, len = bytes.len(), "frame admitted");
                hub.broadcast_from(id, message);
            }
            Err(rejection @ FrameRejection::RateLimited(_)) => {
                warn!(connection = %id, "dropping frame: {rejection}");
            }
            Err(rejection) => {
                debug!(connection = %id, "dropping frame: {rejection}");
            }
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Runs one upgraded connection from registration to removal.
///
/// `identity` is whatever the auth gate attached to the upgrade request.
pub async fn serve_connection<S>(
    ws: WebSocketStream<S>,
    peer: &str,
    identity: Option<String>,
    hub: Hub,
    config: Arc<HubConfig>,
) -> ReadLoopEnd
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (write_half, read_half) = ws.split();
    let cancel = CancellationToken::new();
    let id = hub.register(Arc::new(WsSink::new(write_half, cancel.clone())));
    info!(
        connection = %id,
        peer,
        identity = identity.as_deref().unwrap_or("-"),
        "websocket session established"
    );

    let filter = InboundFilter::new(&config, identity);
    let end = run_read_loop(read_half, id, &hub, filter, config.read_timeout, &cancel).await;

    if end.is_clean() {
        debug!(connection = %id, "session ended: {end:?}");
    } else {
        warn!(connection = %id, "session ended abnormally: {end:?}");
    }

    // The one and only unregister this adapter submits.  The hub closes the
    // write half if the connection is still a member.
    hub.unregister(id);
    end
}

// ── Tests ─────────────────────────────────────────────────────────────────────
