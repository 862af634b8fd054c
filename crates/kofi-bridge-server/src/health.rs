//! `/health` body: liveness plus a snapshot of subscriber counts.

use std::time::Instant;

use kofi_bridge_core::ConnectionRegistry;
use serde::Serialize;

/// Reported while the process is serving.
const STATUS_OK: &str = "ok";

/// Health check response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// `"ok"` while serving.
    pub status: &'static str,
    /// Whole seconds since the server was built.
    pub uptime_secs: u64,
    /// Subscribers across all verification tokens.
    pub connections: usize,
    /// Tokens with at least one subscriber.
    pub routing_keys: usize,
}

impl HealthResponse {
    /// Snapshot the registry. The two counts are read separately and may
    /// straddle a concurrent register.
    pub fn snapshot(started: Instant, registry: &ConnectionRegistry) -> Self {
        Self {
            status: STATUS_OK,
            uptime_secs: started.elapsed().as_secs(),
            connections: registry.connection_count(),
            routing_keys: registry.key_count(),
        }
    }
}
