//! Error types shared between the registry and its transports.

use thiserror::Error;

/// Failure reported by a connection's send capability.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The peer is gone. Conclusive: never retried.
    #[error("peer disconnected")]
    Disconnected,
    /// The connection's outbound queue is full (slow reader).
    #[error("outbound queue full")]
    QueueFull,
    /// Any other connection- or transport-level failure.
    #[error("transport error: {0}")]
    Transport(String),
}

/// A routing key failed validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoutingKeyError {
    /// The verification token was empty.
    #[error("routing key must not be empty")]
    Empty,
}
