//! Server configuration.

use std::time::Duration;

use kofi_bridge_core::{RetryConfig, RetryPolicy};
use kofi_bridge_settings::BridgeSettings;
use serde::{Deserialize, Serialize};

/// Configuration for the bridge server.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `0` for auto-assign).
    pub port: u16,
    /// Maximum concurrent WebSocket connections (`0` = unlimited).
    pub max_connections: usize,
    /// Max inbound WebSocket message size in bytes.
    pub max_message_size: usize,
    /// Capacity of each connection's outbound queue.
    pub outbound_queue: usize,
    /// Heartbeat interval in seconds (`0` disables protocol pings).
    pub heartbeat_interval_secs: u64,
    /// Heartbeat timeout in seconds (close after this long without a pong).
    pub heartbeat_timeout_secs: u64,
    /// Attach a permissive CORS layer.
    pub cors_permissive: bool,
    /// Per-connection delivery retry budget.
    pub retry: RetryConfig,
}

/// Resolved heartbeat timings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Heartbeat {
    /// Time between protocol pings.
    pub interval: Duration,
    /// Silence after which the client is considered dead.
    pub timeout: Duration,
}

impl ServerConfig {
    /// Heartbeat timings, or `None` when disabled.
    pub fn heartbeat(&self) -> Option<Heartbeat> {
        if self.heartbeat_interval_secs == 0 {
            return None;
        }
        Some(Heartbeat {
            interval: Duration::from_secs(self.heartbeat_interval_secs),
            timeout: Duration::from_secs(
                self.heartbeat_timeout_secs.max(self.heartbeat_interval_secs),
            ),
        })
    }

    /// Retry policy handed to the connection registry.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::from(&self.retry)
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 0,
            max_connections: 10_000,
            max_message_size: 64 * 1024,
            outbound_queue: 32,
            heartbeat_interval_secs: 30,
            heartbeat_timeout_secs: 90,
            cors_permissive: true,
            retry: RetryConfig::default(),
        }
    }
}

impl From<&BridgeSettings> for ServerConfig {
    fn from(settings: &BridgeSettings) -> Self {
        let server = &settings.server;
        Self {
            host: server.host.clone(),
            port: server.port,
            max_connections: server.max_connections,
            max_message_size: server.max_message_size,
            outbound_queue: server.outbound_queue.max(1),
            heartbeat_interval_secs: server.heartbeat_interval_secs,
            heartbeat_timeout_secs: server.heartbeat_timeout_secs,
            cors_permissive: server.cors_permissive,
            retry: settings.delivery.clone(),
        }
    }
}
