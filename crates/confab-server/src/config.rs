//! Server configuration.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - A TOML file (`CONFAB_CONFIG`, or the first of the search paths)
//! - Environment variables (`CONFAB_PORT`, `CONFAB_DATABASE__URL`, ...)

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming an explicit config file.
const CONFIG_ENV: &str = "CONFAB_CONFIG";

/// Searched in order when `CONFAB_CONFIG` is unset.
const CONFIG_PATHS: [&str; 3] = [
    "confab.toml",
    "/etc/confab/confab.toml",
    "~/.config/confab/confab.toml",
];

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Transport configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Resource limits.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Idle detection.
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Persistence backend.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Prefix for the conversation API and WebSocket endpoint.
    #[serde(default = "default_api_path")]
    pub websocket_path: String,
}

/// Resource limits configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    /// Maximum inbound WebSocket message size in bytes.
    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,

    /// Notifications a session may have queued before deliveries to it fail.
    #[serde(default = "default_outbound_capacity")]
    pub outbound_capacity: usize,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeartbeatConfig {
    /// Close sessions that send nothing for this long. 0 disables.
    #[serde(default)]
    pub idle_timeout_ms: u64,
}

impl HeartbeatConfig {
    /// The idle timeout, if enabled.
    #[must_use]
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }
}

/// Database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// MySQL connection URL. Without one, an in-memory store is used.
    #[serde(default)]
    pub url: Option<String>,

    /// Maximum pooled connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Apply the embedded chat-table migrations on startup.
    #[serde(default)]
    pub run_migrations: bool,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_true() -> bool {
    true
}

fn default_api_path() -> String {
    "/api/conversation/message".to_string()
}

fn default_max_message_size() -> usize {
    confab_protocol::codec::MAX_FRAME_SIZE
}

fn default_outbound_capacity() -> usize {
    256
}

fn default_max_connections() -> u32 {
    10
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            transport: TransportConfig::default(),
            limits: LimitsConfig::default(),
            heartbeat: HeartbeatConfig::default(),
            database: DatabaseConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            websocket_path: default_api_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_message_size: default_max_message_size(),
            outbound_capacity: default_outbound_capacity(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: default_max_connections(),
            run_migrations: false,
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file, defaults and the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed, or if
    /// an environment override has the wrong type.
    pub fn load() -> Result<Self> {
        let file = match std::env::var(CONFIG_ENV) {
            Ok(path) => Some(PathBuf::from(shellexpand::tilde(&path).as_ref())),
            Err(_) => Self::find_file(),
        };

        let base = match &file {
            Some(path) => {
                tracing::info!("Loading configuration from {}", path.display());
                Self::from_file(path)?
            }
            None => Self::default(),
        };

        let layered = ::config::Config::builder()
            .add_source(
                ::config::Config::try_from(&base).context("Failed to layer configuration")?,
            )
            .add_source(
                ::config::Environment::with_prefix("CONFAB")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to assemble configuration")?;

        layered
            .try_deserialize()
            .context("Failed to apply environment overrides")
    }

    fn find_file() -> Option<PathBuf> {
        CONFIG_PATHS
            .iter()
            .map(|path| PathBuf::from(shellexpand::tilde(path).as_ref()))
            .find(|path| path.exists())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    ///
    /// # Errors
    ///
    /// Returns an error if host and port do not form a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid bind address {}:{}", self.host, self.port))
    }
}
