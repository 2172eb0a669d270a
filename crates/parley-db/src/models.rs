/// Database row types — these map directly to SQLite rows.
/// Distinct from parley-types API models to keep the DB layer independent.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub status: String,
    pub avatar_url: String,
    pub background: String,
    pub created_at: String,
}

/// Profile fields surfaced in the user directory; never carries the
/// password hash.
pub struct ProfileRow {
    pub username: String,
    pub status: String,
    pub avatar_url: String,
    pub background: String,
}

pub struct MessageRow {
    pub id: String,
    pub room: Option<String>,
    pub convo_id: Option<String>,
    pub from_user: String,
    pub to_user: Option<String>,
    pub kind: String,
    pub body: Option<String>,
    pub file_url: Option<String>,
    pub file_name: Option<String>,
    pub file_mime: Option<String>,
    pub timestamp: String,
}
