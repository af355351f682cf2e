pub mod migrations;
pub mod models;
pub mod queries;

use anyhow::Result;
use rusqlite::Connection;
use std::path::Path;
use std::sync::Mutex;
use tracing::info;

/// Credential and conversation store: the `users` and `chats` tables
/// behind one serialized SQLite connection.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (or create) the chat store at `path`. Existing users and
    /// conversations survive restarts; migrations only add missing tables.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        // WAL so history listings don't block behind a turn being written
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::prepare(conn, &format!("chat store at {}", path.display()))
    }

    /// Private in-memory store, used by tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::prepare(Connection::open_in_memory()?, "in-memory chat store")
    }

    fn prepare(conn: Connection, label: &str) -> Result<Self> {
        // chats.username references users
        conn.pragma_update(None, "foreign_keys", "ON")?;
        migrations::run(&conn)?;

        info!("Opened {}", label);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock().map_err(|e| anyhow::anyhow!("DB lock poisoned: {}", e))?;
        f(&conn)
    }
}
