//! Campfire hub entry point.
//!
//! Accepts WebSocket connections (behind an authenticating gate) and relays
//! every valid chat message to all connected clients.
//!
//! # Usage
//!
//! ```text
//! campfire-hub [OPTIONS]
//!
//! Options:
//!   --config <PATH>              Optional TOML configuration file
//!   --bind <IP>                  Listener IP [default: 0.0.0.0]
//!   --port <PORT>                Listener port [default: 8080]
//!   --broadcast-capacity <N>     Broadcast queue capacity [default: 256]
//!   --write-timeout-ms <MS>      Per-member write deadline [default: 5000]
//!   --read-timeout-secs <SECS>   Idle read deadline [default: 30]
//!   --rate-interval-ms <MS>      Token refill interval [default: 100]
//!   --rate-burst <N>             Token bucket size [default: 10]
//!   --rate-policy <drop|wait>    Action on an empty bucket [default: wait]
//!   --rate-wait-ms <MS>          Longest wait for a token [default: 1000]
//!   --max-content-len <N>        Max content length in chars [default: 1000]
//!   --echo-to-sender <BOOL>      Deliver messages back to their sender [default: true]
//!   --sender-policy <trust|override>  [default: override]
//!   --identity-header <NAME>     Header carrying the verified identity
//!   --log-level <FILTER>         Used when RUST_LOG is unset [default: info]
//! ```
//!
//! # Precedence
//!
//! Built-in defaults, then the `--config` file, then environment variables and
//! CLI flags.  CLI flags win over environment variables.
//!
//! | Variable                   | Flag                   |
//! |----------------------------|------------------------|
//! | `CAMPFIRE_CONFIG`          | `--config`             |
//! | `CAMPFIRE_BIND`            | `--bind`               |
//! | `CAMPFIRE_PORT`            | `--port`               |
//! | `CAMPFIRE_BROADCAST_CAPACITY` | `--broadcast-capacity` |
//! | `CAMPFIRE_WRITE_TIMEOUT_MS`| `--write-timeout-ms`   |
//! | `CAMPFIRE_READ_TIMEOUT_SECS` | `--read-timeout-secs` |
//! | `CAMPFIRE_RATE_INTERVAL_MS`| `--rate-interval-ms`   |
//! | `CAMPFIRE_RATE_BURST`      | `--rate-burst`         |
//! | `CAMPFIRE_RATE_POLICY`     | `--rate-policy`        |
//! | `CAMPFIRE_RATE_WAIT_MS`    | `--rate-wait-ms`       |
//! | `CAMPFIRE_MAX_CONTENT_LEN` | `--max-content-len`    |
//! | `CAMPFIRE_ECHO_TO_SENDER`  | `--echo-to-sender`     |
//! | `CAMPFIRE_SENDER_POLICY`   | `--sender-policy`      |
//! | `CAMPFIRE_IDENTITY_HEADER` | `--identity-header`    |
//! | `CAMPFIRE_LOG_LEVEL`       | `--log-level`          |

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use campfire_hub::application::Hub;
use campfire_hub::domain::{HubConfig, RateLimitPolicy, SenderPolicy};
use campfire_hub::infrastructure::{run_server, ConfigError, FileConfig};

const DEFAULT_LOG_LEVEL: &str = "info";

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Real-time WebSocket broadcast hub.
///
/// Every flag is optional; an unset flag falls through to the config file and
/// then to the built-in default.
#[derive(Debug, Default, Parser)]
#[command(
    name = "campfire-hub",
    about = "Real-time WebSocket hub that relays chat messages to every connected client",
    version
)]
struct Cli {
    /// Optional TOML configuration file.
    #[arg(long, env = "CAMPFIRE_CONFIG")]
    config: Option<PathBuf>,

    /// IP address to bind the listener to.
    #[arg(long, env = "CAMPFIRE_BIND")]
    bind: Option<String>,

    /// TCP port to listen on.
    #[arg(long, env = "CAMPFIRE_PORT")]
    port: Option<u16>,

    /// Capacity of the broadcast queue.  Broadcasts beyond it are dropped.
    #[arg(long, env = "CAMPFIRE_BROADCAST_CAPACITY")]
    broadcast_capacity: Option<usize>,

    /// Deadline for one write to one member, in milliseconds.
    #[arg(long, env = "CAMPFIRE_WRITE_TIMEOUT_MS")]
    write_timeout_ms: Option<u64>,

    /// A connection that sends nothing for this many seconds is closed.
    #[arg(long, env = "CAMPFIRE_READ_TIMEOUT_SECS")]
    read_timeout_secs: Option<u64>,

    /// One rate-limit token is added every this many milliseconds.
    #[arg(long, env = "CAMPFIRE_RATE_INTERVAL_MS")]
    rate_interval_ms: Option<u64>,

    /// Token bucket capacity.
    #[arg(long, env = "CAMPFIRE_RATE_BURST")]
    rate_burst: Option<u32>,

    /// What to do with a frame when the bucket is empty: `drop` or `wait`.
    #[arg(long, env = "CAMPFIRE_RATE_POLICY", value_enum, ignore_case = true)]
    rate_policy: Option<RateLimitPolicy>,

    /// Longest a connection waits for a token under the `wait` policy, in
    /// milliseconds.
    #[arg(long, env = "CAMPFIRE_RATE_WAIT_MS")]
    rate_wait_ms: Option<u64>,

    /// Maximum message content length in characters.
    #[arg(long, env = "CAMPFIRE_MAX_CONTENT_LEN")]
    max_content_len: Option<usize>,

    /// Deliver each message back to the connection that sent it.
    #[arg(long, env = "CAMPFIRE_ECHO_TO_SENDER")]
    echo_to_sender: Option<bool>,

    /// `trust` the payload's senderID, or `override` it with the verified
    /// identity.
    #[arg(long, env = "CAMPFIRE_SENDER_POLICY", value_enum, ignore_case = true)]
    sender_policy: Option<SenderPolicy>,

    /// Upgrade-request header carrying the verified identity.  An empty value
    /// disables identity extraction.
    #[arg(long, env = "CAMPFIRE_IDENTITY_HEADER")]
    identity_header: Option<String>,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, env = "CAMPFIRE_LOG_LEVEL")]
    log_level: Option<String>,
}

/// Fully resolved startup settings.
#[derive(Debug)]
struct Settings {
    config: HubConfig,
    log_level: String,
}

impl Cli {
    /// Loads the config file (if any) and layers the CLI values on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, an address is
    /// invalid, or the resulting configuration fails [`HubConfig::check`].
    fn resolve(self) -> anyhow::Result<Settings> {
        let file = match &self.config {
            Some(path) => FileConfig::load(path)
                .with_context(|| format!("failed to load config file {}", path.display()))?,
            None => FileConfig::default(),
        };

        let mut config = HubConfig::default();
        file.apply_to(&mut config)
            .context("invalid value in config file")?;

        let log_level = self
            .log_level
            .clone()
            .or_else(|| file.logging.level.clone())
            .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());

        self.apply_to(&mut config)?;
        config
            .check()
            .map_err(ConfigError::from)
            .context("invalid configuration")?;

        Ok(Settings { config, log_level })
    }

    fn apply_to(self, config: &mut HubConfig) -> anyhow::Result<()> {
        if let Some(bind) = &self.bind {
            let ip: IpAddr = bind
                .parse()
                .with_context(|| format!("invalid bind address: '{bind}'"))?;
            config.bind_addr = SocketAddr::new(ip, config.bind_addr.port());
        }
        if let Some(port) = self.port {
            config.bind_addr.set_port(port);
        }
        if let Some(capacity) = self.broadcast_capacity {
            config.broadcast_capacity = capacity;
        }
        if let Some(ms) = self.write_timeout_ms {
            config.write_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = self.read_timeout_secs {
            config.read_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = self.rate_interval_ms {
            config.rate_limit.interval = Duration::from_millis(ms);
        }
        if let Some(burst) = self.rate_burst {
            config.rate_limit.burst = burst;
        }
        if let Some(policy) = self.rate_policy {
            config.rate_limit.policy = policy;
        }
        if let Some(ms) = self.rate_wait_ms {
            config.rate_limit.wait_timeout = Duration::from_millis(ms);
        }
        if let Some(max) = self.max_content_len {
            config.max_content_len = max;
        }
        if let Some(echo) = self.echo_to_sender {
            config.echo_to_sender = echo;
        }
        if let Some(policy) = self.sender_policy {
            config.sender_policy = policy;
        }
        if let Some(header) = &self.identity_header {
            let header = header.trim();
            config.identity_header = (!header.is_empty()).then(|| header.to_ascii_lowercase());
        }
        Ok(())
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

/// Program entry point.
///
/// 1. Parse CLI/env and the optional config file into a [`HubConfig`].
/// 2. Initialise `tracing_subscriber`; `RUST_LOG` wins over `--log-level`.
/// 3. Spawn the hub control loop.
/// 4. Spawn a Ctrl+C handler that clears the shared `running` flag.
/// 5. Run the accept loop until the flag is cleared.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let Settings { config, log_level } = Cli::parse().resolve()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level)),
        )
        .init();

    info!(
        bind = %config.bind_addr,
        broadcast_capacity = config.broadcast_capacity,
        echo_to_sender = config.echo_to_sender,
        sender_policy = ?config.sender_policy,
        rate_policy = ?config.rate_limit.policy,
        "campfire hub starting"
    );

    let hub = Hub::spawn(&config);

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => {
                tracing::error!("failed to listen for Ctrl+C signal: {e}");
            }
        }
    });

    run_server(config, hub.clone(), running).await?;

    info!(
        members = hub.member_count(),
        dropped_broadcasts = hub.dropped_broadcasts(),
        "campfire hub stopped"
    );
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
