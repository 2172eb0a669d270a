use std::sync::Arc;

use anyhow::Result;
use uuid::Uuid;

use parley_db::Database;
use parley_db::models::MessageRow;
use parley_types::models::{FileInfo, Message, MessageKind};

/// Number of messages replayed when a history window is requested.
pub const HISTORY_WINDOW: u32 = 50;

/// Async facade over the durable message store. rusqlite is synchronous, so
/// every call hops to the blocking pool.
#[derive(Clone)]
pub struct MessageStore {
    db: Arc<Database>,
}

impl MessageStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Persist a message — once, before any live delivery is attempted.
    pub async fn append(&self, message: &Message) -> Result<()> {
        let db = self.db.clone();
        let row = row_from_message(message);
        tokio::task::spawn_blocking(move || db.insert_message(&row)).await??;
        Ok(())
    }

    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<Message>> {
        let db = self.db.clone();
        let row = tokio::task::spawn_blocking(move || db.get_message(&id.to_string())).await??;
        row.map(message_from_row).transpose()
    }

    pub async fn delete_by_id(&self, id: Uuid) -> Result<()> {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || db.delete_message(&id.to_string())).await??;
        Ok(())
    }

    /// Most recent window for a room, oldest-first. An unknown room is an
    /// empty window, not an error.
    pub async fn room_window(&self, room: &str) -> Result<Vec<Message>> {
        let db = self.db.clone();
        let room = room.to_string();
        let rows =
            tokio::task::spawn_blocking(move || db.recent_room_messages(&room, HISTORY_WINDOW))
                .await??;
        window_from_rows(rows)
    }

    /// Most recent window for a two-party conversation, oldest-first.
    pub async fn convo_window(&self, convo_id: &str) -> Result<Vec<Message>> {
        let db = self.db.clone();
        let convo_id = convo_id.to_string();
        let rows = tokio::task::spawn_blocking(move || {
            db.recent_convo_messages(&convo_id, HISTORY_WINDOW)
        })
        .await??;
        window_from_rows(rows)
    }
}

// The query reads newest-first with a LIMIT; flip to oldest-first for replay.
fn window_from_rows(rows: Vec<MessageRow>) -> Result<Vec<Message>> {
    let mut messages = rows
        .into_iter()
        .map(message_from_row)
        .collect::<Result<Vec<_>>>()?;
    messages.reverse();
    Ok(messages)
}

fn row_from_message(m: &Message) -> MessageRow {
    MessageRow {
        id: m.id.to_string(),
        room: m.room.clone(),
        convo_id: m.convo_id.clone(),
        from_user: m.from.clone(),
        to_user: m.to.clone(),
        kind: m.kind.as_str().to_string(),
        body: m.body.clone(),
        file_url: m.file.as_ref().map(|f| f.url.clone()),
        file_name: m.file.as_ref().map(|f| f.name.clone()),
        file_mime: m.file.as_ref().map(|f| f.mime.clone()),
        timestamp: m.timestamp.clone(),
    }
}

fn message_from_row(row: MessageRow) -> Result<Message> {
    let kind = match row.kind.as_str() {
        "text" => MessageKind::Text,
        "file" => MessageKind::File,
        other => anyhow::bail!("unknown message kind in store: {other}"),
    };

    let file = match kind {
        MessageKind::File => Some(FileInfo {
            url: row.file_url.unwrap_or_default(),
            name: row.file_name.unwrap_or_default(),
            mime: row.file_mime.unwrap_or_default(),
        }),
        MessageKind::Text => None,
    };

    Ok(Message {
        id: row.id.parse()?,
        kind,
        from: row.from_user,
        to: row.to_user,
        room: row.room,
        convo_id: row.convo_id,
        body: row.body,
        file,
        timestamp: row.timestamp,
    })
}
