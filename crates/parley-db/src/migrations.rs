use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            status      TEXT NOT NULL DEFAULT 'Available',
            avatar_url  TEXT NOT NULL DEFAULT '',
            background  TEXT NOT NULL DEFAULT 'default',
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            room        TEXT,
            convo_id    TEXT,
            from_user   TEXT NOT NULL,
            to_user     TEXT,
            kind        TEXT NOT NULL CHECK (kind IN ('text', 'file')),
            body        TEXT,
            file_url    TEXT,
            file_name   TEXT,
            file_mime   TEXT,
            timestamp   TEXT NOT NULL,
            created_at  TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_messages_room
            ON messages(room, created_at);

        CREATE INDEX IF NOT EXISTS idx_messages_convo
            ON messages(convo_id, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
