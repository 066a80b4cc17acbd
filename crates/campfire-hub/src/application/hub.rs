//! The hub: single authority over who is connected, and the broadcast fan-out.
//!
//! # Actor model (for beginners)
//!
//! The membership set is a plain `HashMap` with no lock around it.  That is
//! safe because exactly one task, the [`HubLoop`], ever touches it.  Everyone
//! else holds a cheap, cloneable [`Hub`] handle and *submits events* to the
//! loop over channels:
//!
//! ```text
//!   read loops / upgrade handler           HubLoop (one task)
//!   ────────────────────────────           ──────────────────
//!   hub.register(sink)   ──control──▶  ┐
//!   hub.unregister(id)   ──control──▶  ├─ processed one at a time
//!   hub.members()        ──control──▶  │   (totally ordered)
//!   hub.broadcast(msg)   ─broadcast─▶  ┘
//!                                        │
//!                                        └─▶ one spawned write task per member
//! ```
//!
//! # Two queues
//!
//! - **Control** (register / unregister / membership query) is unbounded.
//!   Its volume is naturally bounded by the number of connections, and a
//!   write task that fails must be able to submit an unregister without
//!   ever waiting.
//! - **Broadcast** is bounded.  When it is full the message is dropped and
//!   counted (`dropped_broadcasts`) instead of stalling the producer.
//!
//! When both queues have work the loop takes control events first, so a
//! connection that registers and immediately sends is already a member when
//! its own message fans out.
//!
//! # Fan-out
//!
//! A broadcast is encoded once, then one task per member writes it with a
//! deadline.  The loop does not await those tasks; a stalled peer costs one
//! timer and one task, never the loop's time.  A failed or timed-out write
//! submits an unregister for that member.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tracing::{debug, error, info, warn};

use campfire_core::{codec::encode_text, Message, SequenceCounter};

use crate::application::sink::{ConnectionSink, SinkError};
use crate::domain::{ConnectionId, HubConfig};

// ── Events ────────────────────────────────────────────────────────────────────

enum ControlEvent {
    Register {
        id: ConnectionId,
        sink: Arc<dyn ConnectionSink>,
    },
    Unregister(ConnectionId),
    Members(oneshot::Sender<Vec<ConnectionId>>),
}

struct BroadcastEvent {
    /// Connection the message came from, if any.  Only consulted when echo
    /// to the sender is disabled.
    origin: Option<ConnectionId>,
    message: Message,
}

/// What happened to a submitted broadcast.  Informational only: a dropped
/// message is not an error for the producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    Queued,
    /// The queue was full (or the loop has stopped); the message will not be
    /// delivered to anyone.
    Dropped,
}

#[derive(Debug, Default)]
struct HubStats {
    members: AtomicUsize,
    dropped_broadcasts: AtomicU64,
}

// ── Handle ────────────────────────────────────────────────────────────────────

/// Cloneable handle to a running hub.
///
/// Every method is non-blocking except [`Hub::members`], which waits for the
/// loop to answer.
#[derive(Clone)]
pub struct Hub {
    control_tx: mpsc::UnboundedSender<ControlEvent>,
    broadcast_tx: mpsc::Sender<BroadcastEvent>,
    stats: Arc<HubStats>,
    ids: Arc<SequenceCounter>,
}

impl Hub {
    /// Creates a hub handle and the loop that serves it.
    ///
    /// The loop does nothing until [`HubLoop::run`] is awaited, typically via
    /// `tokio::spawn(hub_loop.run())`.  Use [`Hub::spawn`] for that in one
    /// step.  The loop ends once every `Hub` handle has been dropped.
    ///
    /// `config.broadcast_capacity` must be non-zero (see `HubConfig::check`).
    pub fn new(config: &HubConfig) -> (Self, HubLoop) {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (broadcast_tx, broadcast_rx) = mpsc::channel(config.broadcast_capacity);
        let stats = Arc::new(HubStats::default());

        let hub_loop = HubLoop {
            control_rx,
            broadcast_rx,
            // Weak, so the loop's own sender does not keep the channel open
            // after the last handle is gone.
            control_tx: control_tx.downgrade(),
            members: HashMap::new(),
            stats: Arc::clone(&stats),
            write_timeout: config.write_timeout,
            echo_to_sender: config.echo_to_sender,
        };
        let hub = Self {
            control_tx,
            broadcast_tx,
            stats,
            ids: Arc::new(SequenceCounter::new()),
        };
        (hub, hub_loop)
    }

    /// Creates a hub and spawns its loop on the current tokio runtime.
    pub fn spawn(config: &HubConfig) -> Self {
        let (hub, hub_loop) = Self::new(config);
        tokio::spawn(hub_loop.run());
        hub
    }

    /// Submits a new connection for admission and returns its handle.
    ///
    /// The connection receives broadcasts processed after this registration.
    /// Admission cannot fail: authorisation happened before the upgrade.
    pub fn register(&self, sink: Arc<dyn ConnectionSink>) -> ConnectionId {
        let id = ConnectionId::new();
        if self
            .control_tx
            .send(ControlEvent::Register { id, sink })
            .is_err()
        {
            warn!(connection = %id, "hub loop has stopped; registration ignored");
        }
        id
    }

    /// Submits a connection for removal.  Idempotent: unknown or already
    /// removed handles are ignored by the loop.
    pub fn unregister(&self, id: ConnectionId) {
        if self.control_tx.send(ControlEvent::Unregister(id)).is_err() {
            debug!(connection = %id, "hub loop has stopped; unregister ignored");
        }
    }

    /// Submits a message for fan-out to every member.  Never blocks.
    pub fn broadcast(&self, message: Message) -> BroadcastOutcome {
        self.submit(None, message)
    }

    /// Like [`Hub::broadcast`], recording which connection sent the message
    /// so it can be skipped when echo to the sender is disabled.
    pub fn broadcast_from(&self, origin: ConnectionId, message: Message) -> BroadcastOutcome {
        self.submit(Some(origin), message)
    }

    /// Returns the current membership, as seen after every control event
    /// submitted before this call.  Empty if the loop has stopped.
    pub async fn members(&self) -> Vec<ConnectionId> {
        let (tx, rx) = oneshot::channel();
        if self.control_tx.send(ControlEvent::Members(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Membership size last published by the loop.
    pub fn member_count(&self) -> usize {
        self.stats.members.load(Ordering::Relaxed)
    }

    /// Number of broadcasts shed because the queue was full.
    pub fn dropped_broadcasts(&self) -> u64 {
        self.stats.dropped_broadcasts.load(Ordering::Relaxed)
    }

    fn submit(&self, origin: Option<ConnectionId>, message: Message) -> BroadcastOutcome {
        // Stamp the id at acceptance so every recipient sees the same value.
        let message = if message.id() == 0 {
            message.with_id(self.ids.next())
        } else {
            message
        };
        let message_id = message.id();

        match self.broadcast_tx.try_send(BroadcastEvent { origin, message }) {
            Ok(()) => BroadcastOutcome::Queued,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let dropped = self.stats.dropped_broadcasts.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(message_id, dropped, "broadcast queue full; dropping message");
                BroadcastOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.stats.dropped_broadcasts.fetch_add(1, Ordering::Relaxed);
                warn!(message_id, "hub loop has stopped; dropping message");
                BroadcastOutcome::Dropped
            }
        }
    }
}

// ── Loop ──────────────────────────────────────────────────────────────────────

/// The control loop.  Owns the membership set exclusively.
pub struct HubLoop {
    control_rx: mpsc::UnboundedReceiver<ControlEvent>,
    broadcast_rx: mpsc::Receiver<BroadcastEvent>,
    control_tx: mpsc::WeakUnboundedSender<ControlEvent>,
    members: HashMap<ConnectionId, Arc<dyn ConnectionSink>>,
    stats: Arc<HubStats>,
    write_timeout: Duration,
    echo_to_sender: bool,
}

impl HubLoop {
    /// Processes events until every [`Hub`] handle is dropped.
    pub async fn run(mut self) {
        debug!("hub loop started");
        loop {
            tokio::select! {
                biased;

                event = self.control_rx.recv() => match event {
                    Some(event) => self.handle_control(event),
                    None => break,
                },

                Some(event) = self.broadcast_rx.recv() => self.fan_out(event),
            }
        }

        // No drain: remaining members are closed, queued broadcasts are lost.
        for (id, sink) in self.members.drain() {
            spawn_close(id, sink, self.write_timeout);
        }
        self.stats.members.store(0, Ordering::Relaxed);
        debug!("hub loop stopped");
    }

    fn handle_control(&mut self, event: ControlEvent) {
        match event {
            ControlEvent::Register { id, sink } => {
                self.members.insert(id, sink);
                self.publish_count();
                info!(
                    connection = %id,
                    members = self.members.len(),
                    "client connected"
                );
            }
            ControlEvent::Unregister(id) => match self.members.remove(&id) {
                Some(sink) => {
                    self.publish_count();
                    info!(
                        connection = %id,
                        members = self.members.len(),
                        "client disconnected"
                    );
                    spawn_close(id, sink, self.write_timeout);
                }
                None => {
                    debug!(connection = %id, "unregister for absent connection ignored");
                }
            },
            ControlEvent::Members(reply) => {
                // The caller may have given up waiting; that is fine.
                let _ = reply.send(self.members.keys().copied().collect());
            }
        }
    }

    fn fan_out(&self, event: BroadcastEvent) {
        let BroadcastEvent { origin, message } = event;

        let payload: Arc<str> = match encode_text(&message) {
            Ok(text) => text.into(),
            Err(e) => {
                error!(message_id = message.id(), "failed to encode broadcast: {e}");
                return;
            }
        };

        let mut attempts = 0usize;
        for (&id, sink) in &self.members {
            if !self.echo_to_sender && origin == Some(id) {
                continue;
            }
            attempts += 1;
            spawn_write(
                id,
                Arc::clone(sink),
                Arc::clone(&payload),
                self.write_timeout,
                self.control_tx.clone(),
            );
        }

        debug!(
            message_id = message.id(),
            recipients = attempts,
            "broadcast dispatched"
        );
    }

    fn publish_count(&self) {
        self.stats.members.store(self.members.len(), Ordering::Relaxed);
    }
}

// ── Spawned work ──────────────────────────────────────────────────────────────

/// One bounded write attempt.  On failure, asks the loop to drop the member.
fn spawn_write(
    id: ConnectionId,
    sink: Arc<dyn ConnectionSink>,
    payload: Arc<str>,
    write_timeout: Duration,
    control_tx: mpsc::WeakUnboundedSender<ControlEvent>,
) {
    tokio::spawn(async move {
        let result = match time::timeout(write_timeout, sink.send_text(payload)).await {
            Ok(result) => result,
            Err(_) => Err(SinkError::Timeout(write_timeout)),
        };

        if let Err(e) = result {
            warn!(connection = %id, "write failed, unregistering: {e}");
            if let Some(tx) = control_tx.upgrade() {
                let _ = tx.send(ControlEvent::Unregister(id));
            }
        }
    });
}

/// Closes a removed member without holding up the loop.
fn spawn_close(id: ConnectionId, sink: Arc<dyn ConnectionSink>, close_timeout: Duration) {
    tokio::spawn(async move {
        if time::timeout(close_timeout, sink.close()).await.is_err() {
            debug!(connection = %id, "close handshake timed out");
        }
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────
