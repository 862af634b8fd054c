//! Deterministic fake connections for registry and handler tests.
//!
//! Enabled for this crate's own tests and, through the `test-util` feature,
//! for dependants' dev builds.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::connection::{Connection, ConnectionId};
use crate::errors::SendError;

/// A connection whose send results follow a script.
///
/// Each send pops the next scripted result; once the script is empty every
/// send succeeds. After [`Connection::close`] every send reports
/// [`SendError::Disconnected`].
pub struct ScriptedConnection {
    id: ConnectionId,
    script: Mutex<VecDeque<Result<(), SendError>>>,
    received: Mutex<Vec<String>>,
    attempts: AtomicU32,
    closes: AtomicU32,
}

impl ScriptedConnection {
    /// A connection whose sends always succeed.
    pub fn healthy(id: &str) -> Arc<Self> {
        Self::scripted(id, [])
    }

    /// A connection that replays `script` before succeeding.
    pub fn scripted(
        id: &str,
        script: impl IntoIterator<Item = Result<(), SendError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id: ConnectionId::from(id),
            script: Mutex::new(script.into_iter().collect()),
            received: Mutex::new(Vec::new()),
            attempts: AtomicU32::new(0),
            closes: AtomicU32::new(0),
        })
    }

    /// A connection whose sends always fail with `error`.
    pub fn failing(id: &str, error: SendError) -> Arc<Self> {
        Self::scripted(id, std::iter::repeat_n(Err(error), 64))
    }

    /// Payloads successfully delivered, in order.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }

    /// Send attempts made, successful or not.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// How many times `close` was invoked.
    pub fn close_count(&self) -> u32 {
        self.closes.load(Ordering::SeqCst)
    }

    /// Upcast for registry calls.
    pub fn handle(self: &Arc<Self>) -> Arc<dyn Connection> {
        Arc::clone(self) as Arc<dyn Connection>
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn id(&self) -> &ConnectionId {
        &self.id
    }

    async fn send(&self, payload: Arc<str>) -> Result<(), SendError> {
        let _ = self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.close_count() > 0 {
            return Err(SendError::Disconnected);
        }
        let next = self.script.lock().pop_front().unwrap_or(Ok(()));
        if next.is_ok() {
            self.received.lock().push(payload.to_string());
        }
        next
    }

    async fn close(&self) {
        let _ = self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
