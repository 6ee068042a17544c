//! Client error types.

use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by a message transport.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("transport closed")]
    Closed,

    #[error("I/O error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("ZeroMQ error: {0}")]
    Zmq(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        TransportError::Io(Arc::new(err))
    }
}

/// Configuration errors.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {}", .0.display(), .1)]
    IoError(PathBuf, Arc<std::io::Error>),

    #[error("failed to parse config file '{}': {}", .0.display(), .1)]
    ParseError(PathBuf, String),

    #[error("configuration validation failed: {0}")]
    ValidationError(String),
}

/// Client errors.
///
/// Server-reported failures are not errors: they arrive as a normal
/// [`Reply`](xrapc_protocol::Reply) with `error_text` set.
#[derive(Debug, Clone, Error)]
pub enum ClientError {
    #[error("protocol error: {0}")]
    Protocol(#[from] xrapc_protocol::ProtocolError),

    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("request timeout")]
    Timeout,

    #[error("{0}")]
    Config(#[from] ConfigError),
}

impl ClientError {
    /// Returns whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Timeout => true,
            ClientError::Transport(TransportError::Io(_)) => true,
            _ => false,
        }
    }
}
