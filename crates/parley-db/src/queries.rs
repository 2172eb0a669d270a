use anyhow::Result;
use rusqlite::{Connection, OptionalExtension};

use crate::Database;
use crate::models::{MessageRow, ProfileRow, UserRow};

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: &str,
        username: &str,
        password_hash: &str,
        avatar_url: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, avatar_url) VALUES (?1, ?2, ?3, ?4)",
                (id, username, password_hash, avatar_url),
            )?;
            Ok(())
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    /// Partial profile update; `None` fields are left untouched. Returns the
    /// updated profile, or `None` for an unknown user.
    pub fn update_profile(
        &self,
        username: &str,
        status: Option<&str>,
        avatar_url: Option<&str>,
        background: Option<&str>,
    ) -> Result<Option<ProfileRow>> {
        self.with_conn(|conn| {
            if let Some(status) = status {
                conn.execute(
                    "UPDATE users SET status = ?1 WHERE username = ?2",
                    (status, username),
                )?;
            }
            if let Some(avatar_url) = avatar_url {
                conn.execute(
                    "UPDATE users SET avatar_url = ?1 WHERE username = ?2",
                    (avatar_url, username),
                )?;
            }
            if let Some(background) = background {
                conn.execute(
                    "UPDATE users SET background = ?1 WHERE username = ?2",
                    (background, username),
                )?;
            }
            query_profile(conn, username)
        })
    }

    /// Every known user's directory fields, for the directory broadcast.
    pub fn list_profiles(&self) -> Result<Vec<ProfileRow>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT username, status, avatar_url, background FROM users")?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(ProfileRow {
                        username: row.get(0)?,
                        status: row.get(1)?,
                        avatar_url: row.get(2)?,
                        background: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(rows)
        })
    }

    // -- Messages --

    pub fn insert_message(&self, row: &MessageRow) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages
                    (id, room, convo_id, from_user, to_user, kind, body,
                     file_url, file_name, file_mime, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                rusqlite::params![
                    row.id,
                    row.room,
                    row.convo_id,
                    row.from_user,
                    row.to_user,
                    row.kind,
                    row.body,
                    row.file_url,
                    row.file_name,
                    row.file_mime,
                    row.timestamp,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_message(&self, id: &str) -> Result<Option<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!("{MESSAGE_COLUMNS} WHERE id = ?1"))?;
            let row = stmt.query_row([id], map_message_row).optional()?;
            Ok(row)
        })
    }

    pub fn delete_message(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("DELETE FROM messages WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    /// Most recent messages in a room, newest first. Callers reverse before
    /// replaying to clients.
    pub fn recent_room_messages(&self, room: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_recent(conn, "room", room, limit))
    }

    /// Most recent messages in a two-party conversation, newest first.
    pub fn recent_convo_messages(&self, convo_id: &str, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_recent(conn, "convo_id", convo_id, limit))
    }
}

const MESSAGE_COLUMNS: &str = "SELECT id, room, convo_id, from_user, to_user, kind, body,
        file_url, file_name, file_mime, timestamp
     FROM messages";

fn map_message_row(row: &rusqlite::Row<'_>) -> std::result::Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        room: row.get(1)?,
        convo_id: row.get(2)?,
        from_user: row.get(3)?,
        to_user: row.get(4)?,
        kind: row.get(5)?,
        body: row.get(6)?,
        file_url: row.get(7)?,
        file_name: row.get(8)?,
        file_mime: row.get(9)?,
        timestamp: row.get(10)?,
    })
}

// rowid preserves insertion order; created_at only has second resolution.
fn query_recent(
    conn: &Connection,
    partition_column: &str,
    partition: &str,
    limit: u32,
) -> Result<Vec<MessageRow>> {
    let mut stmt = conn.prepare(&format!(
        "{MESSAGE_COLUMNS} WHERE {partition_column} = ?1 ORDER BY rowid DESC LIMIT ?2"
    ))?;

    let rows = stmt
        .query_map(rusqlite::params![partition, limit], map_message_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, username, password, status, avatar_url, background, created_at
         FROM users WHERE username = ?1",
    )?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                password: row.get(2)?,
                status: row.get(3)?,
                avatar_url: row.get(4)?,
                background: row.get(5)?,
                created_at: row.get(6)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_profile(conn: &Connection, username: &str) -> Result<Option<ProfileRow>> {
    let mut stmt = conn.prepare(
        "SELECT username, status, avatar_url, background FROM users WHERE username = ?1",
    )?;

    let row = stmt
        .query_row([username], |row| {
            Ok(ProfileRow {
                username: row.get(0)?,
                status: row.get(1)?,
                avatar_url: row.get(2)?,
                background: row.get(3)?,
            })
        })
        .optional()?;

    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text_row(id: &str, room: &str, body: &str) -> MessageRow {
        MessageRow {
            id: id.to_string(),
            room: Some(room.to_string()),
            convo_id: None,
            from_user: "alice".to_string(),
            to_user: None,
            kind: "text".to_string(),
            body: Some(body.to_string()),
            file_url: None,
            file_name: None,
            file_mime: None,
            timestamp: "13 Aug 2025, 10:30 pm".to_string(),
        }
    }

    #[test]
    fn recent_messages_are_newest_first_and_capped() {
        let db = Database::open_in_memory().expect("in-memory db");
        for i in 0..6 {
            db.insert_message(&text_row(&format!("m{i}"), "#general", &format!("msg {i}")))
                .expect("insert");
        }

        let rows = db.recent_room_messages("#general", 4).expect("query");
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[0].body.as_deref(), Some("msg 5"));
        assert_eq!(rows[3].body.as_deref(), Some("msg 2"));

        assert!(db.recent_room_messages("#empty", 4).expect("query").is_empty());
    }

    #[test]
    fn delete_removes_message() {
        let db = Database::open_in_memory().expect("in-memory db");
        db.insert_message(&text_row("m1", "#general", "hi"))
            .expect("insert");

        assert!(db.get_message("m1").expect("get").is_some());
        db.delete_message("m1").expect("delete");
        assert!(db.get_message("m1").expect("get").is_none());
    }

    #[test]
    fn update_profile_leaves_absent_fields_untouched() {
        let db = Database::open_in_memory().expect("in-memory db");
        db.create_user("u1", "alice", "hash", "http://avatars/alice")
            .expect("create");

        let profile = db
            .update_profile("alice", Some("Busy"), None, None)
            .expect("update")
            .expect("known user");

        assert_eq!(profile.status, "Busy");
        assert_eq!(profile.avatar_url, "http://avatars/alice");
        assert_eq!(profile.background, "default");

        assert!(db
            .update_profile("nobody", Some("Busy"), None, None)
            .expect("update")
            .is_none());
    }
}
