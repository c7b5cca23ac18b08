//! Error types for toolwire configuration and built-in tools.
//!
//! Protocol-level errors (transport, codec, session) live in
//! [`crate::mcp::error`]. The types here never terminate a session.

use std::path::PathBuf;

use thiserror::Error;

use crate::tools::calc::CalcError;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Failures raised by tool handlers.
///
/// The dispatcher turns every one of these into a failure outcome carried
/// inside a normal `tools/call` response.
#[derive(Error, Debug)]
pub enum ToolError {
    /// An argument had an acceptable type but an unusable value.
    #[error("invalid argument '{name}': {message}")]
    InvalidArgument {
        /// Parameter name.
        name: String,
        /// Description of what's wrong.
        message: String,
    },

    /// Filesystem operation failed.
    #[error("{action} {path}: {source}")]
    Io {
        /// What was being attempted, e.g. "failed to read".
        action: &'static str,
        /// Path the operation targeted.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// Path is missing or of the wrong kind.
    #[error("{message}: {path}")]
    Path {
        /// Short description, e.g. "directory does not exist".
        message: &'static str,
        /// Offending path as given by the caller.
        path: String,
    },

    /// Path lies outside the configured sandbox.
    #[error("access denied: path is outside the configured allowed directories")]
    AccessDenied,

    /// Arithmetic evaluation failed.
    #[error("calculation error: {0}")]
    Calc(#[from] CalcError),

    /// Generic handler failure.
    #[error("{0}")]
    Failed(String),
}

impl ToolError {
    /// Creates a generic failure with the given message.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}
