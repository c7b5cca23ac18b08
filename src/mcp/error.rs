//! Error types for the protocol layers.
//!
//! Transport, codec and protocol failures are fatal to the session that
//! hit them. [`SessionError::Closed`], [`SessionError::Rpc`] and
//! [`SessionError::Timeout`] are local to one caller.

use std::fmt;
use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failures of the byte-stream transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Reading from or writing to the stream failed.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    /// A frame exceeded the configured limit before its newline.
    #[error("frame exceeds {limit} bytes")]
    FrameTooLarge {
        /// Configured maximum frame size.
        limit: usize,
    },

    /// The server process could not be started.
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        /// Program that was launched.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The transport was already closed locally.
    #[error("transport is closed")]
    Closed,
}

/// A frame that could not be decoded into a protocol message.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(#[source] serde_json::Error),

    /// The frame is JSON but not an object.
    #[error("message is not a JSON object")]
    NotAnObject,

    /// `jsonrpc` is missing or not "2.0".
    #[error("jsonrpc field must be \"2.0\"")]
    BadVersion,

    /// A field required for the message kind is absent.
    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    /// A field is present with the wrong JSON type.
    #[error("field '{field}' must be {expected}")]
    InvalidField {
        /// Field name.
        field: &'static str,
        /// Expected type description.
        expected: &'static str,
    },

    /// No `method`, `result` or `error` member.
    #[error("unknown message shape: no method, result or error")]
    UnknownShape,

    /// Both `result` and `error` are present.
    #[error("response carries both result and error")]
    AmbiguousResponse,

    /// Serialising an outgoing message failed.
    #[error("failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Why a session stopped accepting work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// `shutdown()` was called.
    Shutdown,
    /// The peer closed its end of the stream.
    EndOfStream,
    /// The stream failed.
    Transport(String),
    /// An undecodable frame arrived.
    Malformed(String),
    /// A message arrived in a state that does not allow it.
    Protocol(String),
    /// The session has not completed its handshake.
    NotReady,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shutdown => write!(f, "session shut down"),
            Self::EndOfStream => write!(f, "peer closed the stream"),
            Self::Transport(msg) => write!(f, "transport failure: {msg}"),
            Self::Malformed(msg) => write!(f, "malformed message: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol violation: {msg}"),
            Self::NotReady => write!(f, "session is not ready"),
        }
    }
}

/// Errors surfaced by session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Transport failure. Terminates the session.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Undecodable frame. Terminates the session.
    #[error("malformed message: {0}")]
    Malformed(#[from] CodecError),

    /// Message arrived in an invalid state. Terminates the session.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The session is not Ready, or closed while the call was pending.
    #[error("session closed: {reason}")]
    Closed {
        /// Why the session closed.
        reason: CloseReason,
    },

    /// The peer answered this request with a JSON-RPC error object.
    #[error("peer returned error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code.
        code: i64,
        /// Error message.
        message: String,
    },

    /// No response arrived within the call timeout.
    #[error("{method} timed out after {after:?}")]
    Timeout {
        /// Method of the abandoned request.
        method: String,
        /// Timeout that elapsed.
        after: Duration,
    },

    /// The response result did not have the expected shape.
    #[error("unexpected {method} result: {reason}")]
    UnexpectedResult {
        /// Method of the request.
        method: String,
        /// What was wrong with the result.
        reason: String,
    },
}

impl SessionError {
    /// Returns `true` if the error means the session can no longer be used.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Malformed(_) | Self::Protocol(_) | Self::Closed { .. }
        )
    }

    /// Shorthand for a `Closed` error.
    #[must_use]
    pub const fn closed(reason: CloseReason) -> Self {
        Self::Closed { reason }
    }

    /// The close reason this error implies for the session, if fatal.
    #[must_use]
    pub fn close_reason(&self) -> Option<CloseReason> {
        match self {
            Self::Transport(e) => Some(CloseReason::Transport(e.to_string())),
            Self::Malformed(e) => Some(CloseReason::Malformed(e.to_string())),
            Self::Protocol(msg) => Some(CloseReason::Protocol(msg.clone())),
            Self::Closed { reason } => Some(reason.clone()),
            Self::Rpc { .. } | Self::Timeout { .. } | Self::UnexpectedResult { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_error_names_reason() {
        let err = SessionError::closed(CloseReason::Malformed("invalid JSON".to_string()));
        let msg = err.to_string();
        assert!(msg.contains("session closed"));
        assert!(msg.contains("malformed"));
        assert!(err.is_fatal());
    }

    #[test]
    fn local_errors_are_not_fatal() {
        let err = SessionError::Rpc {
            code: -32601,
            message: "Method not found".to_string(),
        };
        assert!(!err.is_fatal());
        assert!(err.close_reason().is_none());

        let err = SessionError::Timeout {
            method: "tools/call".to_string(),
            after: Duration::from_millis(10),
        };
        assert!(!err.is_fatal());
    }

    #[test]
    fn fatal_errors_map_to_reasons() {
        let err = SessionError::from(CodecError::UnknownShape);
        assert!(matches!(err.close_reason(), Some(CloseReason::Malformed(_))));

        let err = SessionError::from(TransportError::Closed);
        assert!(matches!(err.close_reason(), Some(CloseReason::Transport(_))));
    }
}
