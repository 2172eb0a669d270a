use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::transport::ConnId;

/// Live mapping of online identity to its current connection — the single
/// source of truth for "who is online". One entry per identity, never
/// persisted; absence means offline.
#[derive(Clone)]
pub struct PresenceRegistry {
    inner: Arc<RwLock<HashMap<String, ConnId>>>,
}

impl PresenceRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Mark `username` online on `conn_id`. A second login replaces the
    /// prior entry atomically — last writer wins. Returns the connection id
    /// that was displaced, if any.
    pub async fn register(&self, username: &str, conn_id: ConnId) -> Option<ConnId> {
        self.inner.write().await.insert(username.to_string(), conn_id)
    }

    /// Remove the entry for `username`, but only while `conn_id` still owns
    /// it. A stale disconnect racing a fresh login must not evict the newer
    /// entry. Returns true when the entry was removed.
    pub async fn unregister(&self, username: &str, conn_id: ConnId) -> bool {
        let mut map = self.inner.write().await;
        if map.get(username) == Some(&conn_id) {
            map.remove(username);
            true
        } else {
            false
        }
    }

    pub async fn lookup(&self, username: &str) -> Option<ConnId> {
        self.inner.read().await.get(username).copied()
    }

    /// Snapshot of every online identity.
    pub async fn online_set(&self) -> HashSet<String> {
        self.inner.read().await.keys().cloned().collect()
    }
}

impl Default for PresenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[tokio::test]
    async fn reconnect_replaces_the_prior_entry() {
        let presence = PresenceRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        assert_eq!(presence.register("alice", first).await, None);
        assert_eq!(presence.register("alice", second).await, Some(first));
        assert_eq!(presence.lookup("alice").await, Some(second));
        assert_eq!(presence.online_set().await.len(), 1);
    }

    #[tokio::test]
    async fn stale_unregister_leaves_the_newer_entry() {
        let presence = PresenceRegistry::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        presence.register("alice", first).await;
        presence.register("alice", second).await;

        assert!(!presence.unregister("alice", first).await);
        assert_eq!(presence.lookup("alice").await, Some(second));

        assert!(presence.unregister("alice", second).await);
        assert_eq!(presence.lookup("alice").await, None);
    }
}
