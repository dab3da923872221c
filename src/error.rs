//! Error types for c2sim-client.

use thiserror::Error;

use crate::handler::Category;

/// Main error type for all client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// I/O error on the transport or while loading a file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error while loading configuration.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Protocol error (unexpected frame, bad handshake, etc.).
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// `connect()` called while a connection is already active.
    #[error("Already connected")]
    AlreadyConnected,

    /// Operation requires an active connection.
    #[error("Not connected")]
    NotConnected,

    /// Connection closed by the peer.
    #[error("Connection closed")]
    ConnectionClosed,

    /// A bounded wait expired.
    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    /// Caller misuse: bad command syntax, missing file, etc.
    #[error("{0}")]
    Usage(String),

    /// A subscriber's handler failed during dispatch.
    #[error("{category} handler failed: {message}")]
    Callback {
        /// Category being dispatched when the handler failed.
        category: Category,
        /// Failure message.
        message: String,
    },

    /// ERROR frame sent by the broker.
    #[error("Server error: {0}")]
    Server(String),

    /// Invalid configuration value.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Result type alias using ClientError.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Walk the `source()` chain down to the original cause.
///
/// User-facing output shows this error rather than the outermost wrapper.
pub fn root_cause<'a>(err: &'a (dyn std::error::Error + 'static)) -> &'a (dyn std::error::Error + 'static) {
    let mut current = err;
    while let Some(next) = current.source() {
        current = next;
    }
    current
}
