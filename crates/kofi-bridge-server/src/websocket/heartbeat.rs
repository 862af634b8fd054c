//! Heartbeat liveness monitoring.
//!
//! The session's writer sends protocol Ping frames every interval; any
//! inbound frame (Pong included) marks the connection alive.

use std::sync::Arc;

use tokio::time;
use tokio_util::sync::CancellationToken;

use super::connection::WsConnection;
use crate::config::Heartbeat;

/// Outcome of the heartbeat loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeartbeatResult {
    /// The client stopped responding within the timeout window.
    TimedOut,
    /// The heartbeat was cancelled externally.
    Cancelled,
}

/// Watch a connection's liveness until it times out or `cancel` fires.
///
/// At each interval tick the alive flag is checked and reset. Once
/// `timeout / interval` consecutive ticks (at least 1) pass without activity
/// the connection is considered dead.
pub async fn run_heartbeat(
    connection: Arc<WsConnection>,
    heartbeat: Heartbeat,
    cancel: CancellationToken,
) -> HeartbeatResult {
    let interval_ms = heartbeat.interval.as_millis().max(1);
    let max_missed = (heartbeat.timeout.as_millis() / interval_ms).max(1);

    let mut ticker = time::interval_at(time::Instant::now() + heartbeat.interval, heartbeat.interval);
    ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
    let mut missed: u128 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if connection.check_alive() {
                    missed = 0;
                } else {
                    missed += 1;
                    if missed >= max_missed {
                        return HeartbeatResult::TimedOut;
                    }
                }
            }
            () = cancel.cancelled() => {
                return HeartbeatResult::Cancelled;
            }
        }
    }
}
