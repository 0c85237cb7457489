use std::io;

use thiserror::Error;

/// Errors raised by the socket transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Rejected before any IO happens; fatal to this connection attempt.
    #[error("invalid transport configuration: {0}")]
    InvalidConfiguration(String),
    #[error("socket I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors surfaced synchronously to session callers.
///
/// Network failures never show up here; they are absorbed into the
/// reconnect state machine.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
