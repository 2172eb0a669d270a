use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

use parley_types::events::ServerEvent;

/// Identifies one live WebSocket connection.
pub type ConnId = Uuid;

/// Per-connection event channels plus named delivery groups.
///
/// This is delivery machinery only: the session controller owns which room a
/// connection is in, and drives `join_group`/`leave_group` to mirror that
/// state here for fan-out.
#[derive(Clone)]
pub struct Transport {
    inner: Arc<RwLock<TransportInner>>,
}

#[derive(Default)]
struct TransportInner {
    connections: HashMap<ConnId, mpsc::UnboundedSender<ServerEvent>>,
    groups: HashMap<String, HashSet<ConnId>>,
}

impl Transport {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(TransportInner::default())),
        }
    }

    /// Register a connection. Returns its id and the receiver the socket
    /// task drains.
    pub async fn register(&self) -> (ConnId, mpsc::UnboundedReceiver<ServerEvent>) {
        let conn_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner.write().await.connections.insert(conn_id, tx);
        (conn_id, rx)
    }

    /// Drop a connection and any group memberships it still holds.
    pub async fn unregister(&self, conn_id: ConnId) {
        let mut inner = self.inner.write().await;
        inner.connections.remove(&conn_id);
        inner.groups.retain(|_, members| {
            members.remove(&conn_id);
            !members.is_empty()
        });
    }

    pub async fn join_group(&self, conn_id: ConnId, group: &str) {
        let mut inner = self.inner.write().await;
        inner
            .groups
            .entry(group.to_string())
            .or_default()
            .insert(conn_id);
    }

    pub async fn leave_group(&self, conn_id: ConnId, group: &str) {
        let mut inner = self.inner.write().await;
        if let Some(members) = inner.groups.get_mut(group) {
            members.remove(&conn_id);
            if members.is_empty() {
                inner.groups.remove(group);
            }
        }
    }

    /// Send a targeted event to one connection. Gone connections are
    /// silently skipped.
    pub async fn send_to(&self, conn_id: ConnId, event: ServerEvent) {
        let inner = self.inner.read().await;
        if let Some(tx) = inner.connections.get(&conn_id) {
            let _ = tx.send(event);
        }
    }

    /// Send to every member of a group, optionally excluding one connection
    /// (the usual "everyone else in the room" case).
    pub async fn send_to_group(&self, group: &str, event: ServerEvent, exclude: Option<ConnId>) {
        let inner = self.inner.read().await;
        let Some(members) = inner.groups.get(group) else {
            return;
        };
        for conn_id in members {
            if Some(*conn_id) == exclude {
                continue;
            }
            if let Some(tx) = inner.connections.get(conn_id) {
                let _ = tx.send(event.clone());
            }
        }
    }

    pub async fn broadcast_all(&self, event: ServerEvent) {
        let inner = self.inner.read().await;
        for tx in inner.connections.values() {
            let _ = tx.send(event.clone());
        }
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}
