use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{DirectoryEntry, Message};

/// Commands sent FROM client TO server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientCommand {
    /// Authenticate the connection with a login token. Must be the first
    /// command on a fresh socket.
    Authenticate { token: String },

    /// Switch the connection's active room, leaving the previous one.
    JoinRoom { room: String },

    /// Fetch the recent window of the two-party conversation with `with`.
    LoadDmHistory { with: String },

    /// Send a text message to the connection's active room.
    SendRoomMessage { text: String },

    /// Send a text message to one other user.
    SendDirectMessage { to: String, text: String },

    /// Delete a previously sent message. Author-only; anything else is a
    /// silent no-op.
    DeleteMessage { message_id: Uuid },
}

/// Events sent FROM server TO client over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerEvent {
    /// Token validation failed; the server closes the connection after
    /// sending this. Distinct from every other failure so the client knows
    /// to discard its stored token.
    AuthError,

    /// Human-readable notice (welcome, joins, leaves).
    SystemNotice { text: String },

    /// Recent history window for a room or conversation, oldest first.
    LoadHistory { messages: Vec<Message> },

    /// A room message, live.
    ChatMessage(Message),

    /// A two-party message, live.
    PrivateMessage(Message),

    /// A message was removed by its author.
    MessageDeleted { message_id: Uuid },

    /// Full user directory: online users first, then by name.
    UserDirectory { users: Vec<DirectoryEntry> },

    /// Per-user client settings, delivered right after authentication.
    UserSettings { background: String },

    /// Someone changed their profile fields.
    ProfileUpdated {
        username: String,
        status: String,
        avatar_url: String,
    },
}
