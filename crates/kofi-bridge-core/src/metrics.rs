//! Metric names recorded through the `metrics` facade.
//!
//! The recorder itself is installed by the server binary; without one every
//! `counter!`/`gauge!` call is a no-op.

/// Webhook requests received, before validation (counter).
pub const WEBHOOKS_RECEIVED_TOTAL: &str = "webhooks_received_total";
/// Webhooks rejected with a client error (counter, labels: reason).
pub const WEBHOOKS_REJECTED_TOTAL: &str = "webhooks_rejected_total";
/// Deliveries fanned out to at least one connection (counter).
pub const DELIVERIES_TOTAL: &str = "deliveries_total";
/// Individual send attempts (counter).
pub const DELIVERY_ATTEMPTS_TOTAL: &str = "delivery_attempts_total";
/// Send attempts beyond the first (counter).
pub const DELIVERY_RETRIES_TOTAL: &str = "delivery_retries_total";
/// Connections removed by delivery cleanup (counter, labels: reason).
pub const CONNECTIONS_PRUNED_TOTAL: &str = "connections_pruned_total";
/// Connections currently registered (gauge).
pub const REGISTRY_CONNECTIONS: &str = "registry_connections";
/// WebSocket connections opened total (counter).
pub const WS_CONNECTIONS_TOTAL: &str = "ws_connections_total";
/// WebSocket disconnections total (counter).
pub const WS_DISCONNECTIONS_TOTAL: &str = "ws_disconnections_total";
/// Active WebSocket sessions (gauge).
pub const WS_CONNECTIONS_ACTIVE: &str = "ws_connections_active";
/// WebSocket session duration seconds (histogram).
pub const WS_CONNECTION_DURATION_SECONDS: &str = "ws_connection_duration_seconds";
