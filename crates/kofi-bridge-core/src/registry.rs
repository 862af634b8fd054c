//! Token-scoped connection registry with deliver-and-prune fan-out.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use metrics::{counter, gauge};
use parking_lot::RwLock;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::connection::{Connection, ConnectionId};
use crate::metrics::{
    CONNECTIONS_PRUNED_TOTAL, DELIVERIES_TOTAL, DELIVERY_ATTEMPTS_TOTAL, DELIVERY_RETRIES_TOTAL,
    REGISTRY_CONNECTIONS,
};
use crate::retry::{RetryOutcome, RetryPolicy};
use crate::routing::RoutingKey;

type ConnectionSet = HashMap<ConnectionId, Arc<dyn Connection>>;

/// Membership state. Only ever touched under the registry lock.
#[derive(Default)]
struct Groups {
    /// Routing key → non-empty set of connections.
    by_key: HashMap<RoutingKey, ConnectionSet>,
    /// Connection → the one key it was registered under.
    owners: HashMap<ConnectionId, RoutingKey>,
}

impl Groups {
    fn remove(&mut self, key: &RoutingKey, id: &ConnectionId) -> bool {
        let Some(set) = self.by_key.get_mut(key) else {
            return false;
        };
        if set.remove(id).is_none() {
            return false;
        }
        let _ = self.owners.remove(id);
        if set.is_empty() {
            let _ = self.by_key.remove(key);
        }
        true
    }
}

/// Summary of one [`ConnectionRegistry::deliver`] call.
///
/// Informational only: delivery never fails from the caller's point of view.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Connections registered under the key when delivery started.
    pub recipients: usize,
    /// Connections that accepted the payload.
    pub delivered: usize,
    /// Connections removed from the registry afterwards.
    pub pruned: usize,
}

/// Routing key → set of open connections.
///
/// Membership changes (register, deregister, post-delivery cleanup) are
/// serialized by one lock. The lock is never held across a send or a backoff
/// sleep: delivery snapshots the set, releases the lock, fans out, then
/// re-acquires it for the removal pass.
pub struct ConnectionRegistry {
    groups: RwLock<Groups>,
    policy: RetryPolicy,
}

impl ConnectionRegistry {
    /// Create an empty registry delivering with `policy`.
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            groups: RwLock::new(Groups::default()),
            policy,
        }
    }

    /// The retry policy used by [`Self::deliver`].
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Add `connection` to the set for `key`, creating the set if absent.
    ///
    /// Returns `true` if the connection was newly added. Registering the same
    /// connection under the same key again is a no-op. A connection already
    /// owned by a different key is refused.
    pub fn register(&self, key: &RoutingKey, connection: Arc<dyn Connection>) -> bool {
        let id = connection.id().clone();
        let mut groups = self.groups.write();
        if let Some(owner) = groups.owners.get(&id) {
            if owner != key {
                warn!(conn_id = %id, owner = %owner, key = %key, "connection already registered under another key");
            }
            return false;
        }
        let _ = groups
            .by_key
            .entry(key.clone())
            .or_default()
            .insert(id.clone(), connection);
        let _ = groups.owners.insert(id.clone(), key.clone());
        gauge!(REGISTRY_CONNECTIONS).set(groups.owners.len() as f64);
        debug!(conn_id = %id, key = %key, "connection registered");
        true
    }

    /// Remove the connection `id` from `key`'s set, dropping the key when the
    /// set empties. Absent key or connection is a no-op.
    ///
    /// Returns `true` if something was removed.
    pub fn deregister(&self, key: &RoutingKey, id: &ConnectionId) -> bool {
        let mut groups = self.groups.write();
        let removed = groups.remove(key, id);
        if removed {
            gauge!(REGISTRY_CONNECTIONS).set(groups.owners.len() as f64);
            debug!(conn_id = %id, key = %key, "connection deregistered");
        }
        removed
    }

    /// Fan `payload` out to every connection under `key`.
    ///
    /// Each connection gets its own retry budget; connections are attempted
    /// concurrently. Afterwards every connection that disconnected or
    /// exhausted its budget is removed in a single pass. Exhausted
    /// connections are also closed.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn deliver(&self, key: &RoutingKey, payload: &Value) -> DeliveryReport {
        let targets = self.connections(key);
        if targets.is_empty() {
            debug!("no connections for key");
            return DeliveryReport::default();
        }

        let text: Arc<str> = match serde_json::to_string(payload) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                warn!(error = %e, "failed to serialize payload");
                return DeliveryReport {
                    recipients: targets.len(),
                    ..DeliveryReport::default()
                };
            }
        };
        counter!(DELIVERIES_TOTAL).increment(1);

        let outcomes = join_all(targets.iter().map(|conn| self.deliver_one(conn, &text))).await;

        let mut delivered = 0;
        let mut stale = Vec::new();
        for (conn, outcome) in targets.iter().zip(outcomes) {
            match outcome {
                RetryOutcome::Delivered { .. } => delivered += 1,
                RetryOutcome::Terminal { attempts, error } => {
                    warn!(conn_id = %conn.id(), attempts, error = %error, "connection disconnected during delivery");
                    counter!(CONNECTIONS_PRUNED_TOTAL, "reason" => "disconnected").increment(1);
                    stale.push(conn.id().clone());
                }
                RetryOutcome::Exhausted {
                    attempts,
                    last_error,
                } => {
                    warn!(conn_id = %conn.id(), attempts, error = %last_error, "retry budget exhausted, closing connection");
                    counter!(CONNECTIONS_PRUNED_TOTAL, "reason" => "exhausted").increment(1);
                    stale.push(conn.id().clone());
                }
            }
        }

        let pruned = self.prune(key, &stale);
        debug!(recipients = targets.len(), delivered, pruned, "delivery complete");
        DeliveryReport {
            recipients: targets.len(),
            delivered,
            pruned,
        }
    }

    /// Send to one connection under the retry policy; close it if the budget
    /// runs out.
    async fn deliver_one(&self, conn: &Arc<dyn Connection>, text: &Arc<str>) -> RetryOutcome {
        let outcome = self
            .policy
            .run(|attempt| {
                counter!(DELIVERY_ATTEMPTS_TOTAL).increment(1);
                if attempt > 1 {
                    counter!(DELIVERY_RETRIES_TOTAL).increment(1);
                }
                conn.send(Arc::clone(text))
            })
            .await;
        if matches!(outcome, RetryOutcome::Exhausted { .. }) {
            conn.close().await;
        }
        outcome
    }

    /// Remove `ids` from `key` in one locked pass.
    fn prune(&self, key: &RoutingKey, ids: &[ConnectionId]) -> usize {
        if ids.is_empty() {
            return 0;
        }
        let mut groups = self.groups.write();
        let removed = ids.iter().filter(|id| groups.remove(key, id)).count();
        gauge!(REGISTRY_CONNECTIONS).set(groups.owners.len() as f64);
        removed
    }

    /// Snapshot of the connections under `key`.
    pub fn connections(&self, key: &RoutingKey) -> Vec<Arc<dyn Connection>> {
        self.groups
            .read()
            .by_key
            .get(key)
            .map(|set| set.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether `key` currently has any connections.
    pub fn contains_key(&self, key: &RoutingKey) -> bool {
        self.groups.read().by_key.contains_key(key)
    }

    /// Whether connection `id` is registered under `key`.
    pub fn is_registered(&self, key: &RoutingKey, id: &ConnectionId) -> bool {
        self.groups
            .read()
            .by_key
            .get(key)
            .is_some_and(|set| set.contains_key(id))
    }

    /// Total registered connections across all keys.
    pub fn connection_count(&self) -> usize {
        self.groups.read().owners.len()
    }

    /// Number of keys with at least one connection.
    pub fn key_count(&self) -> usize {
        self.groups.read().by_key.len()
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}
