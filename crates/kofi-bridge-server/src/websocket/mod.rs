//! WebSocket subscriber connections, heartbeat and session lifecycle.

pub mod connection;
pub mod heartbeat;
pub mod session;
