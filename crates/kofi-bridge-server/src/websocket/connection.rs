//! WebSocket subscriber connection state.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use kofi_bridge_core::{Connection, ConnectionId, SendError};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;

/// A connected WebSocket subscriber, as seen by the registry.
///
/// Outbound frames go through a bounded queue drained by the session's
/// writer task. `close` cancels the session token; the session then sends a
/// close frame and exits.
pub struct WsConnection {
    id: ConnectionId,
    /// Send channel to the client's WebSocket write task.
    tx: mpsc::Sender<Arc<str>>,
    /// Cancelled when the session is ending.
    closed: CancellationToken,
    /// When this connection was established.
    connected_at: Instant,
    /// Whether the client has shown activity since the last heartbeat tick.
    is_alive: AtomicBool,
}

impl WsConnection {
    /// Create a connection with a fresh id.
    pub fn new(tx: mpsc::Sender<Arc<str>>, closed: CancellationToken) -> Self {
        Self::with_id(ConnectionId::new(), tx, closed)
    }

    /// Create a connection with a given id.
    pub fn with_id(id: ConnectionId, tx: mpsc::Sender<Arc<str>>, closed: CancellationToken) -> Self {
        Self {
            id,
            tx,
            closed,
            connected_at: Instant::now(),
            is_alive: AtomicBool::new(true),
        }
    }

    /// Queue a text frame for the writer task without waiting.
    ///
    /// A full queue is [`SendError::QueueFull`]; a closed queue or a closing
    /// session is [`SendError::Disconnected`].
    pub fn enqueue(&self, text: Arc<str>) -> Result<(), SendError> {
        if self.closed.is_cancelled() {
            return Err(SendError::Disconnected);
        }
        match self.tx.try_send(text) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(SendError::QueueFull),
            Err(TrySendError::Closed(_)) => Err(SendError::Disconnected),
        }
    }

    /// Queue a reply, waiting for room behind already-queued payloads.
    ///
    /// Fails only when the session is ending.
    pub async fn reply(&self, text: Arc<str>) -> Result<(), SendError> {
        tokio::select! {
            sent = self.tx.send(text) => sent.map_err(|_| SendError::Disconnected),
            () = self.closed.cancelled() => Err(SendError::Disconnected),
        }
    }

    /// Record inbound activity.
    pub fn mark_alive(&self) {
        self.is_alive.store(true, Ordering::Relaxed);
    }

    /// Check and reset the alive flag for heartbeat.
    ///
    /// Returns `true` if the client was active since the last check.
    pub fn check_alive(&self) -> bool {
        self.is_alive.swap(false, Ordering::Relaxed)
    }

    /// Connection age.
    pub fn age(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

#[async_trait]
impl Connection for WsConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// `Ok` means queued for the writer; a later socket write failure ends
    /// the session instead of surfacing here.
    async fn send(&self, payload: Arc<str>) -> Result<(), SendError> {
        self.enqueue(payload)
    }

    async fn close(&self) {
        self.closed.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_connection(capacity: usize) -> (WsConnection, mpsc::Receiver<Arc<str>>) {
        let (tx, rx) = mpsc::channel(capacity);
        let conn = WsConnection::with_id("conn_1".into(), tx, CancellationToken::new());
        (conn, rx)
    }

    #[test]
    fn fresh_ids() {
        let (tx, _rx) = mpsc::channel(1);
        let a = WsConnection::new(tx.clone(), CancellationToken::new());
        let b = WsConnection::new(tx, CancellationToken::new());
        assert_ne!(a.id(), b.id());
    }

    #[tokio::test]
    async fn send_reaches_writer_queue() {
        let (conn, mut rx) = make_connection(4);
        conn.send(Arc::from("hello")).await.unwrap();
        assert_eq!(&*rx.recv().await.unwrap(), "hello");
    }

    #[tokio::test]
    async fn full_queue_is_transient() {
        let (conn, _rx) = make_connection(1);
        conn.send(Arc::from("one")).await.unwrap();
        assert_eq!(
            conn.send(Arc::from("two")).await,
            Err(SendError::QueueFull)
        );
    }

    #[tokio::test]
    async fn closed_queue_is_disconnect() {
        let (conn, rx) = make_connection(4);
        drop(rx);
        assert_eq!(
            conn.send(Arc::from("x")).await,
            Err(SendError::Disconnected)
        );
    }

    #[tokio::test]
    async fn close_cancels_token_and_fails_sends() {
        let token = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(4);
        let conn = WsConnection::new(tx, token.clone());

        conn.close().await;
        conn.close().await;

        assert!(token.is_cancelled());
        assert_eq!(
            conn.send(Arc::from("x")).await,
            Err(SendError::Disconnected)
        );
    }

    #[test]
    fn mark_alive_and_check() {
        let (conn, _rx) = make_connection(1);
        assert!(conn.check_alive());
        assert!(!conn.check_alive());
        conn.mark_alive();
        assert!(conn.check_alive());
    }

    #[tokio::test]
    async fn reply_waits_behind_full_queue() {
        let (conn, mut rx) = make_connection(1);
        conn.send(Arc::from("payload")).await.unwrap();
        assert_eq!(conn.enqueue(Arc::from("pong")), Err(SendError::QueueFull));

        let conn = Arc::new(conn);
        let replier = Arc::clone(&conn);
        let reply = tokio::spawn(async move { replier.reply(Arc::from("pong")).await });

        assert_eq!(&*rx.recv().await.unwrap(), "payload");
        assert_eq!(&*rx.recv().await.unwrap(), "pong");
        assert_eq!(reply.await.unwrap(), Ok(()));
    }

    #[tokio::test]
    async fn reply_gives_up_when_session_ends() {
        let token = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(1);
        let conn = WsConnection::new(tx, token.clone());
        conn.send(Arc::from("payload")).await.unwrap();

        token.cancel();
        assert_eq!(
            conn.reply(Arc::from("pong")).await,
            Err(SendError::Disconnected)
        );
    }

    #[test]
    fn connection_age_increases() {
        let (conn, _rx) = make_connection(1);
        let age1 = conn.age();
        std::thread::sleep(Duration::from_millis(10));
        assert!(conn.age() > age1);
    }
}
