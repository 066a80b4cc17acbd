//! campfire-hub library crate.
//!
//! A real-time connection hub: clients connect over WebSocket, every valid
//! message one of them sends is fanned out to all currently connected
//! clients.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Clients (JSON over WebSocket)
//!         ↕
//! [campfire-hub]
//!   ├── domain/           Pure types: HubConfig, policies, ConnectionId
//!   ├── application/      Hub control loop, inbound admission, rate limiting
//!   └── infrastructure/
//!         ├── ws_server/   Accept loop and WebSocket upgrade (tokio-tungstenite)
//!         ├── connection/  Per-connection sink and read loop
//!         └── config_file/ Optional TOML configuration
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O and no async.
//! - `application` depends on `domain` and `campfire-core`, and talks to
//!   sockets only through the [`application::ConnectionSink`] trait.
//! - `infrastructure` depends on all other layers plus `tokio-tungstenite`.
//!
//! # Embedding
//!
//! ```no_run
//! use std::sync::{atomic::AtomicBool, Arc};
//! use campfire_hub::application::Hub;
//! use campfire_hub::domain::HubConfig;
//! use campfire_hub::infrastructure::run_server;
//!
//! # async fn start() -> anyhow::Result<()> {
//! let config = HubConfig::default();
//! let hub = Hub::spawn(&config);
//! run_server(config, hub, Arc::new(AtomicBool::new(true))).await
//! # }
//! ```

/// Domain layer: configuration and identifiers (no I/O).
pub mod domain;

/// Application layer: membership, fan-out, and inbound admission.
pub mod application;

/// Infrastructure layer: WebSocket server, connection adapter, config file.
pub mod infrastructure;
