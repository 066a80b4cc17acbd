//! Optional TOML configuration file for the hub binary.
//!
//! Every key is optional.  Missing keys leave the value below them in the
//! precedence chain untouched:
//!
//! ```text
//! built-in defaults  <  config file  <  environment / CLI flags
//! ```
//!
//! A complete file looks like this:
//!
//! ```toml
//! [server]
//! bind = "0.0.0.0"
//! port = 8080
//! identity_header = "x-authenticated-user"
//!
//! [hub]
//! broadcast_capacity = 256
//! write_timeout_ms = 5000
//! read_timeout_secs = 30
//! echo_to_sender = true
//!
//! [rate_limit]
//! interval_ms = 100
//! burst = 10
//! policy = "wait"          # or "drop"
//! wait_timeout_ms = 1000
//!
//! [messages]
//! max_content_len = 1000
//! sender_policy = "override"   # or "trust"
//!
//! [logging]
//! level = "info"
//! ```
//!
//! An empty `identity_header` string disables identity extraction.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::domain::{HubConfig, InvalidConfig, RateLimitPolicy, SenderPolicy};

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error reading config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid bind address '{0}'")]
    BindAddress(String),

    #[error(transparent)]
    Invalid(#[from] InvalidConfig),
}

/// The on-disk shape of the configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub server: ServerSection,
    pub hub: HubSection,
    pub rate_limit: RateLimitSection,
    pub messages: MessagesSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerSection {
    pub bind: Option<String>,
    pub port: Option<u16>,
    pub identity_header: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HubSection {
    pub broadcast_capacity: Option<usize>,
    pub write_timeout_ms: Option<u64>,
    pub read_timeout_secs: Option<u64>,
    pub echo_to_sender: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RateLimitSection {
    pub interval_ms: Option<u64>,
    pub burst: Option<u32>,
    pub policy: Option<RateLimitPolicy>,
    pub wait_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MessagesSection {
    pub max_content_len: Option<usize>,
    pub sender_policy: Option<SenderPolicy>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingSection {
    pub level: Option<String>,
}

impl FileConfig {
    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file cannot be read, [`ConfigError::Parse`]
    /// if it is not valid TOML for this schema.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&text)
    }

    /// Parses TOML text.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Overlays every key present in the file onto `config`.
    ///
    /// Does not run [`HubConfig::check`]; the caller does that once all
    /// layers have been applied.
    pub fn apply_to(&self, config: &mut HubConfig) -> Result<(), ConfigError> {
        let server = &self.server;
        if let Some(bind) = &server.bind {
            let ip: IpAddr = bind
                .parse()
                .map_err(|_| ConfigError::BindAddress(bind.clone()))?;
            config.bind_addr = SocketAddr::new(ip, config.bind_addr.port());
        }
        if let Some(port) = server.port {
            config.bind_addr.set_port(port);
        }
        if let Some(header) = &server.identity_header {
            config.identity_header = non_empty(header);
        }

        let hub = &self.hub;
        if let Some(capacity) = hub.broadcast_capacity {
            config.broadcast_capacity = capacity;
        }
        if let Some(ms) = hub.write_timeout_ms {
            config.write_timeout = Duration::from_millis(ms);
        }
        if let Some(secs) = hub.read_timeout_secs {
            config.read_timeout = Duration::from_secs(secs);
        }
        if let Some(echo) = hub.echo_to_sender {
            config.echo_to_sender = echo;
        }

        let rl = &self.rate_limit;
        if let Some(ms) = rl.interval_ms {
            config.rate_limit.interval = Duration::from_millis(ms);
        }
        if let Some(burst) = rl.burst {
            config.rate_limit.burst = burst;
        }
        if let Some(policy) = rl.policy {
            config.rate_limit.policy = policy;
        }
        if let Some(ms) = rl.wait_timeout_ms {
            config.rate_limit.wait_timeout = Duration::from_millis(ms);
        }

        let messages = &self.messages;
        if let Some(max) = messages.max_content_len {
            config.max_content_len = max;
        }
        if let Some(policy) = messages.sender_policy {
            config.sender_policy = policy;
        }

        Ok(())
    }
}

/// Trims a header name; an empty one means "disabled".
pub(crate) fn non_empty(header: &str) -> Option<String> {
    let trimmed = header.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_ascii_lowercase())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_changes_nothing() {
        // Arrange
        let file = FileConfig::parse("").unwrap();
        let mut cfg = HubConfig::default();

        // Act
        file.apply_to(&mut cfg).unwrap();

        // Assert
        assert_eq!(cfg, HubConfig::default());
    }

    #[test]
    fn test_full_file_overrides_every_field() {
        let text = r#"
            [server]
            bind = "127.0.0.1"
            port = 9000
            identity_header = "X-User"

            [hub]
            broadcast_capacity = 16
            write_timeout_ms = 250
            read_timeout_secs = 10
            echo_to_sender = false

            [rate_limit]
            interval_ms = 50
            burst = 3
            policy = "drop"
            wait_timeout_ms = 200

            [messages]
            max_content_len = 280
            sender_policy = "trust"

            [logging]
            level = "debug"
        "#;
        let file = FileConfig::parse(text).unwrap();
        let mut cfg = HubConfig::default();

        file.apply_to(&mut cfg).unwrap();

        assert_eq!(cfg.bind_addr, "127.0.0.1:9000".parse::<SocketAddr>().unwrap());
        assert_eq!(cfg.identity_header.as_deref(), Some("x-user"));
        assert_eq!(cfg.broadcast_capacity, 16);
        assert_eq!(cfg.write_timeout, Duration::from_millis(250));
        assert_eq!(cfg.read_timeout, Duration::from_secs(10));
        assert!(!cfg.echo_to_sender);
        assert_eq!(cfg.rate_limit.interval, Duration::from_millis(50));
        assert_eq!(cfg.rate_limit.burst, 3);
        assert_eq!(cfg.rate_limit.policy, RateLimitPolicy::Drop);
        assert_eq!(cfg.rate_limit.wait_timeout, Duration::from_millis(200));
        assert_eq!(cfg.max_content_len, 280);
        assert_eq!(cfg.sender_policy, SenderPolicy::Trust);
        assert_eq!(file.logging.level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_port_alone_keeps_default_bind_ip() {
        let file = FileConfig::parse("[server]\nport = 7000\n").unwrap();
        let mut cfg = HubConfig::default();

        file.apply_to(&mut cfg).unwrap();

        assert_eq!(cfg.bind_addr.to_string(), "0.0.0.0:7000");
    }

    #[test]
    fn test_empty_identity_header_disables_extraction() {
        let file = FileConfig::parse("[server]\nidentity_header = \"\"\n").unwrap();
        let mut cfg = HubConfig::default();

        file.apply_to(&mut cfg).unwrap();

        assert_eq!(cfg.identity_header, None);
    }

    #[test]
    fn test_unknown_key_is_a_parse_error() {
        let result = FileConfig::parse("[hub]\nbroadcast_capacityy = 1\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_unknown_policy_is_rejected() {
        let result = FileConfig::parse("[rate_limit]\npolicy = \"queue\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_policy_names_are_lowercase_in_the_file() {
        let result = FileConfig::parse("[messages]\nsender_policy = \"Trust\"\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_bad_bind_address_is_rejected() {
        let file = FileConfig::parse("[server]\nbind = \"not-an-ip\"\n").unwrap();
        let mut cfg = HubConfig::default();

        let result = file.apply_to(&mut cfg);

        assert!(matches!(result, Err(ConfigError::BindAddress(ref b)) if b == "not-an-ip"));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = FileConfig::load(Path::new("/definitely/not/here/campfire.toml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_load_reads_file_from_disk() {
        let path = std::env::temp_dir().join(format!(
            "campfire-config-test-{}.toml",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&path, "[hub]\nbroadcast_capacity = 8\n").unwrap();

        let file = FileConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(file.hub.broadcast_capacity, Some(8));
    }
}
