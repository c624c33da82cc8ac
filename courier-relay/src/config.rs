//! Configuration loading for courier-relay.
//!
//! Configuration is loaded from a TOML file. Every section and field is
//! optional; anything left out takes its default.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for courier-relay.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Server configuration.
    pub server: ServerConfig,
    /// Heartbeat (liveness) configuration.
    pub heartbeat: HeartbeatConfig,
    /// Limits and rate limiting configuration.
    pub limits: LimitsConfig,
    /// HTTP endpoints configuration.
    pub http: HttpConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the WebSocket listener (default: 0.0.0.0:8765).
    pub bind_address: String,
    /// Emitter name used on relay-originated envelopes (default: SERVER).
    pub relay_identity: String,
    /// Capacity of each connection's outbound queue (default: 256).
    pub outbound_queue: usize,
}

/// Heartbeat configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    /// Enable the liveness task (default: true).
    pub enabled: bool,
    /// Seconds between heartbeat cycles (default: 30).
    pub ping_interval_secs: u64,
    /// Seconds a client has to answer a ping (default: 10).
    pub ping_timeout_secs: u64,
}

/// Limits and rate limiting configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Connection attempts allowed per IP address per minute (default: 30).
    pub connections_per_ip: u32,
    /// Transfers allowed per connection per minute (default: 600).
    pub messages_per_minute: u32,
    /// Maximum simultaneously open connections (default: 10000).
    pub max_concurrent_connections: usize,
    /// Maximum length of a declared name in bytes (default: 64).
    pub max_name_len: usize,
    /// Maximum WebSocket frame and message size in bytes (default: 16 MiB).
    pub max_frame_size: usize,
    /// Seconds a fresh connection has to send its declaration (default: 10).
    /// Zero disables the timeout.
    pub declaration_timeout_secs: u64,
    /// Answer transfers from undeclared connections with a warning instead
    /// of routing them (default: false).
    pub require_declaration: bool,
}

/// HTTP endpoints configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Serve the HTTP endpoints (default: true).
    pub enabled: bool,
    /// Bind address for HTTP server (default: 0.0.0.0:8080).
    pub bind_address: String,
    /// Enable metrics endpoint (default: true).
    pub metrics_enabled: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8765".to_string(),
            relay_identity: courier_types::DEFAULT_RELAY_IDENTITY.to_string(),
            outbound_queue: 256,
        }
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ping_interval_secs: 30,
            ping_timeout_secs: 10,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            connections_per_ip: 30,
            messages_per_minute: 600,
            max_concurrent_connections: 10_000,
            max_name_len: 64,
            max_frame_size: 16 * 1024 * 1024,
            declaration_timeout_secs: 10,
            require_declaration: false,
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
            metrics_enabled: true,
        }
    }
}

impl HeartbeatConfig {
    /// Delay before each cycle.
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs)
    }

    /// Grace window between the pings and the eviction sweep.
    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }
}

impl LimitsConfig {
    /// Declaration timeout, or `None` when disabled.
    pub fn declaration_timeout(&self) -> Option<Duration> {
        (self.declaration_timeout_secs > 0).then(|| Duration::from_secs(self.declaration_timeout_secs))
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, parsed, or fails
    /// [`validate`](Self::validate).
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values the relay cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.relay_identity.is_empty() {
            return Err(ConfigError::invalid("server.relay_identity", "must not be empty"));
        }
        if self.server.outbound_queue == 0 {
            return Err(ConfigError::invalid("server.outbound_queue", "must be > 0"));
        }
        if self.limits.connections_per_ip == 0 {
            return Err(ConfigError::invalid("limits.connections_per_ip", "must be > 0"));
        }
        if self.limits.messages_per_minute == 0 {
            return Err(ConfigError::invalid("limits.messages_per_minute", "must be > 0"));
        }
        if self.limits.max_name_len == 0 {
            return Err(ConfigError::invalid("limits.max_name_len", "must be > 0"));
        }
        Ok(())
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with it.
        reason: &'static str,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: &'static str) -> Self {
        Self::Invalid { field, reason }
    }
}
