//! Hub configuration types.
//!
//! [`HubConfig`] is the single source of truth for all runtime settings.  It
//! can be built from defaults (tests, local development) or assembled by the
//! binary from CLI flags, environment variables, and an optional TOML file.
//!
//! Keeping configuration as a plain struct (no global state, no environment
//! reads in this module) makes the hub easy to embed in tests.  The
//! infrastructure layer and `main.rs` are responsible for populating it.

use std::net::SocketAddr;
use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;
use thiserror::Error;

/// Header the upstream auth gate uses to pass the verified identity.
pub const DEFAULT_IDENTITY_HEADER: &str = "x-authenticated-user";

/// Room in a frame for everything except `content`: field names, ids,
/// timestamp, sender and receiver.
const FRAME_ENVELOPE_BYTES: usize = 4096;

// ── Policies ──────────────────────────────────────────────────────────────────

/// What a connection does with an inbound frame when its token bucket is empty.
///
/// Spelled `drop` / `wait` in the TOML file, on the command line, and in
/// `CAMPFIRE_RATE_POLICY`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitPolicy {
    /// Discard the frame immediately.
    Drop,
    /// Suspend the read loop until a token frees up, but no longer than
    /// [`RateLimitConfig::wait_timeout`]; discard the frame if that expires.
    Wait,
}

/// Whether the `senderID` a client puts in its payload is believed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SenderPolicy {
    /// Use the payload's `senderID` as-is.
    Trust,
    /// Replace the payload's `senderID` with the identity the auth gate
    /// attached to the upgrade request, when there is one.
    Override,
}

// ── Config structs ────────────────────────────────────────────────────────────

/// Per-connection admission control settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// One token is added to the bucket every `interval`.
    pub interval: Duration,
    /// Bucket capacity: how many frames may arrive back-to-back.
    pub burst: u32,
    pub policy: RateLimitPolicy,
    /// Longest a read loop may suspend waiting for a token under
    /// [`RateLimitPolicy::Wait`].
    pub wait_timeout: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(100),
            burst: 10,
            policy: RateLimitPolicy::Wait,
            wait_timeout: Duration::from_secs(1),
        }
    }
}

/// All runtime configuration for the hub and its WebSocket listener.
///
/// # Example
///
/// ```rust
/// use campfire_hub::domain::HubConfig;
///
/// let cfg = HubConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 8080);
/// assert_eq!(cfg.broadcast_capacity, 256);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct HubConfig {
    /// Address the WebSocket listener binds to.
    pub bind_addr: SocketAddr,

    /// Request header carrying the identity verified by the auth gate.
    /// `None` disables identity extraction entirely.
    pub identity_header: Option<String>,

    /// Capacity of the bounded broadcast queue.  When it is full new
    /// broadcasts are dropped rather than blocking the producer.
    pub broadcast_capacity: usize,

    /// Deadline for a single fan-out write to one member.
    pub write_timeout: Duration,

    /// Deadline for reading the next frame from a connection.  A connection
    /// that stays silent (no data, ping, or pong) for this long is closed.
    pub read_timeout: Duration,

    /// Deliver a message back to the connection that sent it.
    pub echo_to_sender: bool,

    pub sender_policy: SenderPolicy,

    /// Maximum `content` length in characters.
    pub max_content_len: usize,

    pub rate_limit: RateLimitConfig,
}

impl Default for HubConfig {
    /// | Field              | Default                  |
    /// |--------------------|--------------------------|
    /// | bind_addr          | `0.0.0.0:8080`           |
    /// | identity_header    | `x-authenticated-user`   |
    /// | broadcast_capacity | 256                      |
    /// | write_timeout      | 5 seconds                |
    /// | read_timeout       | 30 seconds               |
    /// | echo_to_sender     | `true`                   |
    /// | sender_policy      | `Override`               |
    /// | max_content_len    | 1000                     |
    /// | rate_limit         | 1 token / 100 ms, burst 10, wait up to 1 s |
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            identity_header: Some(DEFAULT_IDENTITY_HEADER.to_string()),
            broadcast_capacity: 256,
            write_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(30),
            echo_to_sender: true,
            sender_policy: SenderPolicy::Override,
            max_content_len: campfire_core::MAX_CONTENT_LEN,
            rate_limit: RateLimitConfig::default(),
        }
    }
}

/// A configuration value that can never work at runtime.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidConfig {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

impl HubConfig {
    /// Largest WebSocket message the listener accepts, in bytes.
    ///
    /// A `content` of `max_content_len` characters still fits when every
    /// character is JSON-escaped as `\uXXXX` (six bytes).
    pub fn max_frame_bytes(&self) -> usize {
        self.max_content_len
            .saturating_mul(6)
            .saturating_add(FRAME_ENVELOPE_BYTES)
    }

    /// Rejects settings that would make the hub unusable: a zero-capacity
    /// queue (tokio channels panic), a zero burst (nothing is ever admitted),
    /// and zero timeouts or refill intervals.
    ///
    /// # Errors
    ///
    /// Returns the first offending field as [`InvalidConfig::Zero`].
    pub fn check(&self) -> Result<(), InvalidConfig> {
        let checks: [(&'static str, bool); 7] = [
            ("broadcast_capacity", self.broadcast_capacity == 0),
            ("write_timeout", self.write_timeout.is_zero()),
            ("read_timeout", self.read_timeout.is_zero()),
            ("max_content_len", self.max_content_len == 0),
            ("rate_limit.interval", self.rate_limit.interval.is_zero()),
            ("rate_limit.burst", self.rate_limit.burst == 0),
            ("rate_limit.wait_timeout", self.rate_limit.wait_timeout.is_zero()),
        ];
        match checks.into_iter().find(|(_, bad)| *bad) {
            Some((field, _)) => Err(InvalidConfig::Zero(field)),
            None => Ok(()),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
