use std::sync::Arc;

use anyhow::Result;
use tracing::error;

use parley_db::Database;
use parley_types::events::ServerEvent;
use parley_types::models::DirectoryEntry;

use crate::presence::PresenceRegistry;
use crate::transport::Transport;

/// Recomputes the full online/offline + profile snapshot and pushes it to
/// every connection whenever presence or profile state changes. O(total
/// users) per call; fine at the scale this server targets.
#[derive(Clone)]
pub struct DirectoryBroadcaster {
    db: Arc<Database>,
    presence: PresenceRegistry,
    transport: Transport,
}

impl DirectoryBroadcaster {
    pub fn new(db: Arc<Database>, presence: PresenceRegistry, transport: Transport) -> Self {
        Self {
            db,
            presence,
            transport,
        }
    }

    /// Push the current directory to all connections. A failed read is
    /// logged and dropped; presence state is unaffected.
    pub async fn publish(&self) {
        if let Err(e) = self.try_publish().await {
            error!("Failed to broadcast user directory: {e}");
        }
    }

    async fn try_publish(&self) -> Result<()> {
        let db = self.db.clone();
        let profiles = tokio::task::spawn_blocking(move || db.list_profiles()).await??;
        let online = self.presence.online_set().await;

        let mut users: Vec<DirectoryEntry> = profiles
            .into_iter()
            .map(|p| DirectoryEntry {
                online: online.contains(&p.username),
                username: p.username,
                status: p.status,
                avatar_url: p.avatar_url,
            })
            .collect();
        sort_directory(&mut users);

        self.transport
            .broadcast_all(ServerEvent::UserDirectory { users })
            .await;
        Ok(())
    }
}

/// Online users first, then ascending by name within each group.
fn sort_directory(users: &mut [DirectoryEntry]) {
    users.sort_by(|a, b| {
        b.online
            .cmp(&a.online)
            .then_with(|| a.username.cmp(&b.username))
    });
}
