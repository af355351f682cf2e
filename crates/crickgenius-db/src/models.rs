/// Database row types — these map directly to SQLite rows.
/// Distinct from crickgenius-types API models to keep the DB layer independent.

pub struct UserRow {
    pub username: String,
    pub password_hash: String,
}

pub struct ChatRow {
    pub id: i64,
    pub conversation_id: String,
    pub query: Option<String>,
    pub response: Option<String>,
    pub timestamp: String,
}
