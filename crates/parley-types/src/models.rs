use chrono::{FixedOffset, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Leading sigil that marks a destination as a broadcast room.
pub const ROOM_SIGIL: char = '#';

/// Room every connection lands in right after authenticating.
pub const DEFAULT_ROOM: &str = "#general";

/// Offset used for human-readable message timestamps (IST, UTC+5:30).
const TIMESTAMP_OFFSET_SECONDS: i32 = 5 * 3600 + 1800;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    File,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::File => "file",
        }
    }
}

/// Metadata for an uploaded blob; the bytes themselves live behind `url`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub url: String,
    pub name: String,
    pub mime: String,
}

/// A chat message. Immutable once created, except for deletion by its
/// author. Exactly one of `room`/`convo_id` names the destination, and
/// exactly one of `body`/`file` carries the payload, matching `kind`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub kind: MessageKind,
    pub from: String,
    /// Present only for two-party messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    /// Broadcast room, `#`-prefixed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    /// Conversation key for two-party messages.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub convo_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<FileInfo>,
    /// Human-readable, rendered in a fixed timezone when the message is
    /// created. Clients display it verbatim.
    pub timestamp: String,
}

/// Render "now" the way message timestamps are stored, e.g.
/// "13 Aug 2025, 10:30 pm".
pub fn timestamp_now() -> String {
    let tz = FixedOffset::east_opt(TIMESTAMP_OFFSET_SECONDS).expect("offset in range");
    Utc::now()
        .with_timezone(&tz)
        .format("%-d %b %Y, %-I:%M %P")
        .to_string()
}

/// One line of the user directory pushed to every client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    pub username: String,
    pub status: String,
    pub avatar_url: String,
    pub online: bool,
}
