use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            username        TEXT PRIMARY KEY NOT NULL,
            password_hash   TEXT NOT NULL
        );

        -- Append-only. A row with NULL query and response reserves a
        -- conversation id for a chat that has not been used yet.
        CREATE TABLE IF NOT EXISTS chats (
            id              INTEGER PRIMARY KEY AUTOINCREMENT,
            username        TEXT NOT NULL REFERENCES users(username),
            conversation_id TEXT NOT NULL,
            query           TEXT,
            response        TEXT,
            timestamp       TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_chats_conversation
            ON chats(username, conversation_id, timestamp);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
