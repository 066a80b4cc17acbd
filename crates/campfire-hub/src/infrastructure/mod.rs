//! Infrastructure layer for campfire-hub.
//!
//! Contains the concrete I/O pieces:
//!
//! - [`ws_server`]   – TCP accept loop and WebSocket upgrade
//! - [`connection`]  – per-connection write sink and read loop
//! - [`config_file`] – optional TOML configuration file

pub mod config_file;
pub mod connection;
pub mod ws_server;

pub use config_file::{ConfigError, FileConfig};
pub use connection::{run_read_loop, serve_connection, ReadLoopEnd, WsSink};
pub use ws_server::{run_server, serve};
