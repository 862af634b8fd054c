//! WebSocket session lifecycle: handles one subscriber from upgrade through
//! disconnect.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::extract::ws::{CloseFrame, Message, Utf8Bytes, WebSocket, close_code};
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use kofi_bridge_core::Connection;
use kofi_bridge_core::RoutingKey;
use kofi_bridge_core::metrics::{
    WS_CONNECTION_DURATION_SECONDS, WS_CONNECTIONS_ACTIVE, WS_CONNECTIONS_TOTAL,
    WS_DISCONNECTIONS_TOTAL,
};
use metrics::{counter, gauge, histogram};
use tokio::sync::mpsc;
use tokio::time::{self, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::connection::WsConnection;
use super::heartbeat::{HeartbeatResult, run_heartbeat};
use crate::server::AppState;

/// Application-level keepalive request.
pub const PING: &str = "ping";
/// Reply to [`PING`].
pub const PONG: &str = "pong";

/// Caps the number of concurrently open sessions.
#[derive(Clone, Debug)]
pub struct SessionLimiter {
    active: Arc<AtomicUsize>,
    max: usize,
}

impl SessionLimiter {
    /// Allow up to `max` sessions (`0` = unlimited).
    pub fn new(max: usize) -> Self {
        Self {
            active: Arc::new(AtomicUsize::new(0)),
            max,
        }
    }

    /// Reserve a slot, or `None` when the cap is reached.
    pub fn try_acquire(&self) -> Option<SessionPermit> {
        let max = self.max;
        self.active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                (max == 0 || n < max).then_some(n + 1)
            })
            .ok()
            .map(|_| SessionPermit {
                active: Arc::clone(&self.active),
            })
    }

    /// Sessions currently holding a permit.
    pub fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }
}

/// A reserved session slot, released on drop.
#[derive(Debug)]
pub struct SessionPermit {
    active: Arc<AtomicUsize>,
}

impl Drop for SessionPermit {
    fn drop(&mut self) {
        let _ = self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Run a WebSocket session for a subscriber of `key`.
///
/// 1. Registers the connection under `key`
/// 2. Answers `"ping"` text frames with `"pong"`; ignores everything else
/// 3. Forwards delivered payloads and protocol pings via the writer task
/// 4. Ends on client disconnect, receive error, heartbeat timeout, registry
///    close or server shutdown
/// 5. Deregisters and sends a close frame
#[instrument(skip_all, fields(key = %key))]
pub async fn run_ws_session(socket: WebSocket, key: RoutingKey, state: AppState, permit: SessionPermit) {
    let _permit = permit;
    let (ws_tx, mut ws_rx) = socket.split();

    let (send_tx, send_rx) = mpsc::channel::<Arc<str>>(state.config.outbound_queue.max(1));
    let cancel = state.shutdown.session_token();
    let connection = Arc::new(WsConnection::new(send_tx, cancel.clone()));
    let conn_id = connection.id().clone();

    let _ = state.registry.register(&key, Arc::clone(&connection) as Arc<dyn Connection>);
    info!(conn_id = %conn_id, "client connected");
    counter!(WS_CONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).increment(1.0);

    let heartbeat = state.config.heartbeat();
    let writer = tokio::spawn(write_loop(
        ws_tx,
        send_rx,
        heartbeat.map(|hb| hb.interval),
        cancel.clone(),
    ));
    let monitor = heartbeat.map(|hb| {
        let conn = Arc::clone(&connection);
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if run_heartbeat(conn, hb, cancel.clone()).await == HeartbeatResult::TimedOut {
                warn!(timeout_secs = hb.timeout.as_secs(), "client unresponsive, disconnecting");
                cancel.cancel();
            }
        })
    });

    loop {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            () = cancel.cancelled() => break,
        };
        let msg = match frame {
            Some(Ok(msg)) => msg,
            Some(Err(e)) => {
                debug!(error = %e, "receive error");
                break;
            }
            None => break,
        };

        connection.mark_alive();
        match msg {
            Message::Text(text) if text.as_str() == PING => {
                if connection.reply(Arc::from(PONG)).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => {
                debug!("client sent close frame");
                break;
            }
            _ => {}
        }
    }

    let _ = state.registry.deregister(&key, &conn_id);
    cancel.cancel();
    if let Some(monitor) = monitor {
        let _ = monitor.await;
    }
    let _ = writer.await;

    let duration = connection.age();
    info!(conn_id = %conn_id, duration_secs = duration.as_secs(), "client disconnected");
    counter!(WS_DISCONNECTIONS_TOTAL).increment(1);
    gauge!(WS_CONNECTIONS_ACTIVE).decrement(1.0);
    histogram!(WS_CONNECTION_DURATION_SECONDS).record(duration.as_secs_f64());
}

/// Drain the outbound queue into the socket, sending protocol pings every
/// `ping_every`. On cancellation a close frame is sent before returning.
async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<Arc<str>>,
    ping_every: Option<Duration>,
    cancel: CancellationToken,
) {
    let mut pings = ping_every.map(|every| {
        let mut ticker = time::interval_at(time::Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker
    });

    loop {
        tokio::select! {
            msg = outbound.recv() => {
                let Some(text) = msg else { break };
                if sink.send(Message::Text(text.to_string().into())).await.is_err() {
                    break;
                }
            }
            () = next_ping(&mut pings) => {
                if sink.send(Message::Ping(Vec::<u8>::new().into())).await.is_err() {
                    break;
                }
            }
            () = cancel.cancelled() => {
                let frame = CloseFrame {
                    code: close_code::NORMAL,
                    reason: Utf8Bytes::from_static("closing"),
                };
                let _ = sink.send(Message::Close(Some(frame))).await;
                return;
            }
        }
    }

    // Socket or queue gone: end the whole session.
    cancel.cancel();
}

async fn next_ping(pings: &mut Option<Interval>) {
    match pings {
        Some(ticker) => {
            let _ = ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limiter_caps_sessions() {
        let limiter = SessionLimiter::new(2);
        let a = limiter.try_acquire().unwrap();
        let _b = limiter.try_acquire().unwrap();
        assert!(limiter.try_acquire().is_none());
        assert_eq!(limiter.active(), 2);

        drop(a);
        assert_eq!(limiter.active(), 1);
        assert!(limiter.try_acquire().is_some());
    }

    #[test]
    fn zero_means_unlimited() {
        let limiter = SessionLimiter::new(0);
        let permits: Vec<_> = (0..100).filter_map(|_| limiter.try_acquire()).collect();
        assert_eq!(permits.len(), 100);
        drop(permits);
        assert_eq!(limiter.active(), 0);
    }

    #[test]
    fn clones_share_the_count() {
        let limiter = SessionLimiter::new(1);
        let other = limiter.clone();
        let _permit = limiter.try_acquire().unwrap();
        assert!(other.try_acquire().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn next_ping_without_heartbeat_never_fires() {
        let mut pings = None;
        let fired = time::timeout(Duration::from_secs(3600), next_ping(&mut pings)).await;
        assert!(fired.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn next_ping_follows_interval() {
        let every = Duration::from_secs(30);
        let mut pings = Some(time::interval_at(time::Instant::now() + every, every));
        let started = time::Instant::now();
        next_ping(&mut pings).await;
        assert!(started.elapsed() >= every);
    }
}
