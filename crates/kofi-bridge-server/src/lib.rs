//! # kofi-bridge-server
//!
//! Axum HTTP + `WebSocket` server relaying Ko-fi webhooks to subscribers.
//!
//! - `POST /webhook`: form-encoded Ko-fi notification, fanned out by token
//! - `GET /ws/{verification_token}`: subscriber socket with `"ping"`/`"pong"`
//! - `GET /version`, `GET /health`, `GET /metrics`
//! - Protocol-level heartbeat and graceful shutdown via `CancellationToken`

#![deny(unsafe_code)]

pub mod config;
pub mod errors;
pub mod health;
pub mod metrics;
pub mod server;
pub mod shutdown;
pub mod webhook;
pub mod websocket;

pub use config::{Heartbeat, ServerConfig};
pub use errors::ApiError;
pub use server::{AppState, BridgeServer};
pub use shutdown::ShutdownCoordinator;
