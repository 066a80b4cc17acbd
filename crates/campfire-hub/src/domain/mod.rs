//! Domain layer for campfire-hub.
//!
//! Pure types with no dependency on sockets, tasks, or the filesystem:
//! configuration, policies, and the connection handle.
//!
//! # What does NOT belong here?
//!
//! - Any `tokio`, `TcpStream`, or `WebSocket` types
//! - File I/O or environment variable reading

pub mod config;
pub mod connection_id;

pub use config::{
    HubConfig, InvalidConfig, RateLimitConfig, RateLimitPolicy, SenderPolicy, DEFAULT_IDENTITY_HEADER,
};
pub use connection_id::ConnectionId;
