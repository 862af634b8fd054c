//! The connection capability the registry delivers to.
//!
//! Transports (the axum WebSocket session in `kofi-bridge-server`, fakes in
//! tests) implement [`Connection`]; the registry only ever sees the trait
//! object.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::errors::SendError;

/// Identity of one open connection.
///
/// Two handles are the same connection iff their ids are equal; the registry
/// uses this for set semantics.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Generate a fresh, time-ordered id.
    pub fn new() -> Self {
        Self(format!("conn_{}", Uuid::now_v7()))
    }

    /// The raw id string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConnectionId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An open bidirectional channel to one client.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Connection: Send + Sync {
    /// Stable identity of this connection.
    fn id(&self) -> &ConnectionId;

    /// Push one serialized payload to the client.
    ///
    /// [`SendError::Disconnected`] means the peer is gone; anything else is
    /// treated as transient by the default retry classifier.
    async fn send(&self, payload: Arc<str>) -> Result<(), SendError>;

    /// Actively close the connection. Must be idempotent.
    async fn close(&self);
}
