use parley_types::events::ServerEvent;
use parley_types::models::{Message, ROOM_SIGIL};

use crate::presence::PresenceRegistry;
use crate::transport::Transport;

/// Where a message is headed: a broadcast room or one other user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Room(String),
    Direct(String),
}

impl Destination {
    /// Room names carry the leading `#` sigil; anything else is a username.
    pub fn parse(target: &str) -> Self {
        if target.starts_with(ROOM_SIGIL) {
            Destination::Room(target.to_string())
        } else {
            Destination::Direct(target.to_string())
        }
    }
}

/// Deterministic key for a two-party conversation: either participant
/// computes the same key regardless of who initiated.
pub fn conversation_key(a: &str, b: &str) -> String {
    let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
    format!("{lo}-{hi}")
}

/// Resolves a persisted message's audience and hands it to the transport.
/// Pure resolution logic — holds no state of its own.
#[derive(Clone)]
pub struct Router {
    transport: Transport,
    presence: PresenceRegistry,
}

impl Router {
    pub fn new(transport: Transport, presence: PresenceRegistry) -> Self {
        Self {
            transport,
            presence,
        }
    }

    /// Deliver a freshly persisted message to every live connection that
    /// should see it: the whole room, or the 1-2 online participants of a
    /// conversation. Offline participants are partial delivery, not an
    /// error — the message is already durable.
    pub async fn deliver(&self, message: &Message) {
        if let Some(room) = &message.room {
            self.transport
                .send_to_group(room, ServerEvent::ChatMessage(message.clone()), None)
                .await;
        } else {
            for user in participants(message) {
                if let Some(conn_id) = self.presence.lookup(user).await {
                    self.transport
                        .send_to(conn_id, ServerEvent::PrivateMessage(message.clone()))
                        .await;
                }
            }
        }
    }

    /// Fan a deletion notice out to the same audience a live instance of the
    /// message would have reached.
    pub async fn deliver_deletion(&self, message: &Message) {
        let event = ServerEvent::MessageDeleted {
            message_id: message.id,
        };
        if let Some(room) = &message.room {
            self.transport.send_to_group(room, event, None).await;
        } else {
            for user in participants(message) {
                if let Some(conn_id) = self.presence.lookup(user).await {
                    self.transport.send_to(conn_id, event.clone()).await;
                }
            }
        }
    }
}

fn participants(message: &Message) -> Vec<&str> {
    let mut users = vec![message.from.as_str()];
    if let Some(to) = message.to.as_deref() {
        if to != message.from {
            users.push(to);
        }
    }
    users
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_key_is_symmetric() {
        assert_eq!(conversation_key("alice", "bob"), "alice-bob");
        assert_eq!(conversation_key("bob", "alice"), "alice-bob");
        assert_eq!(conversation_key("zed", "zed"), "zed-zed");
    }

    #[test]
    fn sigil_separates_rooms_from_users() {
        assert_eq!(
            Destination::parse("#general"),
            Destination::Room("#general".to_string())
        );
        assert_eq!(
            Destination::parse("bob"),
            Destination::Direct("bob".to_string())
        );
    }
}
