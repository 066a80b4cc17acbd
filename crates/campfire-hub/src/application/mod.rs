//! Application layer for campfire-hub.
//!
//! The application layer knows *what* happens to connections and messages
//! but delegates *how* bytes move to the infrastructure layer.
//!
//! # Responsibilities
//!
//! - The hub control loop: membership and broadcast fan-out (`hub`)
//! - Per-connection admission: rate limiting, decoding, validation (`inbound`, `rate_limiter`)
//! - The `ConnectionSink` seam the hub writes through (`sink`)
//!
//! # What does NOT belong here?
//!
//! - Opening sockets or performing the WebSocket upgrade
//! - WebSocket framing (handled by tokio-tungstenite in `infrastructure`)

pub mod hub;
pub mod inbound;
pub mod rate_limiter;
pub mod sink;

pub use hub::{BroadcastOutcome, Hub, HubLoop};
pub use inbound::{FrameRejection, InboundFilter};
pub use rate_limiter::{RateLimitError, RateLimiter};
pub use sink::{ConnectionSink, SinkError};
