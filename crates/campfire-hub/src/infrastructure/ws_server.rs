//! WebSocket server: accept loop and per-connection task management.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Accepting incoming TCP connections.
//! 3. Upgrading each connection to WebSocket, capturing the identity header
//!    the upstream auth gate attached to the upgrade request.  The upgrade
//!    must complete within the read timeout, and frames larger than
//!    [`HubConfig::max_frame_bytes`] are refused by the protocol layer.
//! 4. Handing the upgraded socket to [`serve_connection`], which registers it
//!    with the hub and runs its read loop.
//! 5. Stopping the accept loop when the `running` flag is cleared.
//!
//! Each connection runs in its own Tokio task; the accept loop never waits on
//! a connection's I/O.
//!
//! Authentication itself is not done here.  Requests reaching this listener
//! have already been admitted by the gate in front of it.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tracing::{error, info, warn};

use crate::application::Hub;
use crate::domain::HubConfig;
use crate::infrastructure::connection::serve_connection;

/// How often the accept loop re-checks the `running` flag when idle.
const ACCEPT_POLL: Duration = Duration::from_millis(200);

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.bind_addr` and serves connections until `running` is
/// cleared.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound.
pub async fn run_server(config: HubConfig, hub: Hub, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {}", config.bind_addr))?;

    info!("campfire hub listening on ws://{}", listener.local_addr()?);

    serve(listener, config, hub, running).await
}

/// Runs the accept loop on an already-bound listener.
///
/// Split out from [`run_server`] so tests can bind port 0 and read back the
/// assigned address before serving.
pub async fn serve(
    listener: TcpListener,
    config: HubConfig,
    hub: Hub,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let config = Arc::new(config);

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                let hub = hub.clone();
                let cfg = Arc::clone(&config);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, hub, cfg).await;
                });
            }
            Ok(Err(e)) => {
                // Transient (e.g. out of file descriptors); keep accepting.
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, hub: Hub, config: Arc<HubConfig>) {
    if let Err(e) = run_connection(stream, peer_addr, hub, config).await {
        warn!("connection {peer_addr} failed: {e:#}");
    }
}

async fn run_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    hub: Hub,
    config: Arc<HubConfig>,
) -> anyhow::Result<()> {
    let identity_slot: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
    let slot = Arc::clone(&identity_slot);
    let header = config.identity_header.clone();

    let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
        if let Some(name) = header.as_deref() {
            if let Ok(mut guard) = slot.lock() {
                *guard = identity_from_request(req, name);
            }
        }
        Ok(resp)
    };

    let handshake = accept_hdr_async_with_config(stream, callback, Some(ws_config(&config)));
    let ws = match timeout(config.read_timeout, handshake).await {
        Ok(upgraded) => {
            upgraded.with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?
        }
        Err(_) => anyhow::bail!(
            "no WebSocket upgrade from {peer_addr} within {:?}",
            config.read_timeout
        ),
    };

    let identity = identity_slot.lock().ok().and_then(|mut guard| guard.take());
    serve_connection(ws, &peer_addr.to_string(), identity, hub, config).await;
    Ok(())
}

fn ws_config(config: &HubConfig) -> WebSocketConfig {
    let limit = config.max_frame_bytes();
    let mut ws = WebSocketConfig::default();
    ws.max_message_size = Some(limit);
    ws.max_frame_size = Some(limit);
    ws
}

/// Reads the verified identity from the upgrade request.
///
/// Missing, non-UTF-8, and blank values all count as "no identity".
fn identity_from_request(req: &Request, header: &str) -> Option<String> {
    req.headers()
        .get(header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
