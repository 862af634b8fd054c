//! # kofi-bridge-core
//!
//! Connection registry and delivery policy for the Ko-fi bridge.
//!
//! - [`routing`]: verification-token routing keys
//! - [`connection`]: the opaque send/close capability the registry fans out to
//! - [`retry`]: bounded, fixed-backoff retry with a failure classifier
//! - [`registry`]: token → connection-set mapping with deliver-and-prune
//! - [`logging`]: `tracing` subscriber setup shared by the binaries
//! - [`metrics`]: metric name constants recorded through the `metrics` facade

#![deny(unsafe_code)]

pub mod connection;
pub mod errors;
pub mod logging;
pub mod metrics;
pub mod registry;
pub mod retry;
pub mod routing;
#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use connection::{Connection, ConnectionId};
pub use errors::{RoutingKeyError, SendError};
pub use registry::{ConnectionRegistry, DeliveryReport};
pub use retry::{Disposition, RetryConfig, RetryOutcome, RetryPolicy};
pub use routing::RoutingKey;
