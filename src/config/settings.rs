//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Frame limits for the line transport.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Per-session timeouts.
    #[serde(default)]
    pub session: SessionSettings,

    /// Server-side settings (`serve`).
    #[serde(default)]
    pub server: ServerConfig,

    /// Client-side settings (`demo`, `interactive`).
    #[serde(default)]
    pub client: ClientConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            });
        }

        if self.transport.max_frame_bytes == 0 {
            return Err(ConfigError::ValidationError {
                message: "transport.max_frame_bytes must be greater than zero".to_string(),
            });
        }

        if self.session.request_timeout_secs == Some(0) {
            return Err(ConfigError::ValidationError {
                message: "session.request_timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.session.handshake_timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "session.handshake_timeout_secs must be greater than zero".to_string(),
            });
        }

        if self.server.max_read_bytes == 0 {
            return Err(ConfigError::ValidationError {
                message: "server.max_read_bytes must be greater than zero".to_string(),
            });
        }

        if let Some(ref command) = self.client.server_command {
            if command.first().map_or(true, |program| program.trim().is_empty()) {
                return Err(ConfigError::ValidationError {
                    message: "client.server_command must name a program".to_string(),
                });
            }
        }

        Ok(())
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Transport configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Largest accepted frame in bytes, excluding the newline.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

const fn default_max_frame_bytes() -> usize {
    4 * 1024 * 1024
}

/// Session timeouts.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionSettings {
    /// Per-call timeout. `None` waits until the session closes.
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,

    /// Time allowed for the initialize exchange.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            request_timeout_secs: None,
            handshake_timeout_secs: default_handshake_timeout(),
        }
    }
}

impl SessionSettings {
    /// Per-call timeout as a [`Duration`].
    #[must_use]
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_secs.map(Duration::from_secs)
    }

    /// Handshake timeout as a [`Duration`].
    #[must_use]
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }
}

const fn default_handshake_timeout() -> u64 {
    10
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// Name advertised in the initialize response.
    #[serde(default = "default_server_name")]
    pub name: String,

    /// Directories the file tools may touch. Empty means unrestricted.
    #[serde(default)]
    pub allowed_paths: Vec<PathBuf>,

    /// Largest file `read_file` will return.
    #[serde(default = "default_max_read_bytes")]
    pub max_read_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: default_server_name(),
            allowed_paths: Vec::new(),
            max_read_bytes: default_max_read_bytes(),
        }
    }
}

fn default_server_name() -> String {
    env!("CARGO_PKG_NAME").to_string()
}

const fn default_max_read_bytes() -> u64 {
    1024 * 1024
}

/// Client configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Server argv. Defaults to this executable with `serve`.
    #[serde(default)]
    pub server_command: Option<Vec<String>>,

    /// How long to wait for the server to exit after stdin closes.
    #[serde(default = "default_shutdown_grace")]
    pub shutdown_grace_secs: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server_command: None,
            shutdown_grace_secs: default_shutdown_grace(),
        }
    }
}

impl ClientConfig {
    /// Shutdown grace period as a [`Duration`].
    #[must_use]
    pub const fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

const fn default_shutdown_grace() -> u64 {
    2
}
