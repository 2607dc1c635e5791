//! Error types for the chat relay
//!
//! Defines startup errors and outbound enqueue errors.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Relay-level errors
///
/// All of these are fatal for the process. Per-connection I/O failures
/// never surface here; they end the connection through teardown instead.
#[derive(Debug, Error)]
pub enum RelayError {
    /// Could not bind the listening socket
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Outbound enqueue errors
///
/// Returned by the non-blocking enqueue the broker uses during fan-out.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EnqueueError {
    /// The outbound queue is at capacity (slow or stalled reader)
    #[error("outbound queue full")]
    Full,
    /// The outbound loop has already exited
    #[error("outbound queue closed")]
    Closed,
}
