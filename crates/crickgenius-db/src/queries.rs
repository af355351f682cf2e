use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{Connection, ErrorCode, OptionalExtension};
use tracing::warn;
use uuid::Uuid;

use crickgenius_types::models::{ChatTurn, ConversationSummary, HistoryTurn, NEW_CHAT_LABEL};

use crate::Database;
use crate::models::{ChatRow, UserRow};

/// Fixed-width UTC timestamps sort lexicographically in chronological order.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    // -- Users --

    /// Insert a new user. Returns `false` if the username is already taken;
    /// uniqueness is left to the primary key so concurrent registrations
    /// cannot both succeed.
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO users (username, password_hash) VALUES (?1, ?2)",
                (username, password_hash),
            );
            match inserted {
                Ok(_) => Ok(true),
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == ErrorCode::ConstraintViolation => {
                    Ok(false)
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    // -- Conversations --

    /// Most recent conversation of this user that holds only a placeholder row.
    pub fn find_open_conversation(&self, username: &str) -> Result<Option<String>> {
        self.with_conn(|conn| query_open_conversation(conn, username))
    }

    /// Return the user's open conversation, or reserve `candidate` with a
    /// placeholder row if there is none. The lookup and the insert share one
    /// lock acquisition, so two "new chat" requests cannot both reserve.
    pub fn find_or_reserve_conversation(
        &self,
        username: &str,
        candidate: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<String> {
        self.with_conn(|conn| {
            if let Some(existing) = query_open_conversation(conn, username)? {
                return Ok(existing);
            }
            conn.execute(
                "INSERT INTO chats (username, conversation_id, query, response, timestamp)
                 VALUES (?1, ?2, NULL, NULL, ?3)",
                (username, candidate, format_timestamp(timestamp)),
            )?;
            Ok(candidate.to_string())
        })
    }

    /// True when some other user already has rows under `conversation_id`.
    pub fn conversation_owned_by_other(&self, username: &str, conversation_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let taken = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM chats WHERE conversation_id = ?2 AND username <> ?1)",
                (username, conversation_id),
                |row| row.get(0),
            )?;
            Ok(taken)
        })
    }

    pub fn append_turn(
        &self,
        username: &str,
        conversation_id: &str,
        query: &str,
        response: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO chats (username, conversation_id, query, response, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                rusqlite::params![username, conversation_id, query, response, format_timestamp(timestamp)],
            )?;
            Ok(())
        })
    }

    /// Answered turns of one conversation, oldest first.
    pub fn load_history(&self, username: &str, conversation_id: &str) -> Result<Vec<HistoryTurn>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT query, response
                 FROM chats
                 WHERE username = ?1 AND conversation_id = ?2
                   AND query IS NOT NULL AND response IS NOT NULL
                 ORDER BY timestamp ASC, id ASC",
            )?;

            let turns = stmt
                .query_map((username, conversation_id), |row| {
                    Ok(HistoryTurn {
                        query: row.get(0)?,
                        response: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            Ok(turns)
        })
    }

    /// All of the user's conversations, most recently active first, with
    /// unused placeholders left out.
    pub fn list_conversations(&self, username: &str) -> Result<Vec<ConversationSummary>> {
        let rows = self.with_conn(|conn| query_chat_rows(conn, username))?;
        Ok(group_conversations(rows))
    }
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt = conn.prepare("SELECT username, password_hash FROM users WHERE username = ?1")?;

    let row = stmt
        .query_row([username], |row| {
            Ok(UserRow {
                username: row.get(0)?,
                password_hash: row.get(1)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn query_open_conversation(conn: &Connection, username: &str) -> Result<Option<String>> {
    let id = conn
        .query_row(
            "SELECT c.conversation_id
             FROM chats c
             WHERE c.username = ?1
               AND c.query IS NULL
               AND NOT EXISTS (
                   SELECT 1 FROM chats t
                   WHERE t.username = c.username
                     AND t.conversation_id = c.conversation_id
                     AND t.query IS NOT NULL
               )
             ORDER BY c.timestamp DESC, c.id DESC
             LIMIT 1",
            [username],
            |row| row.get(0),
        )
        .optional()?;

    Ok(id)
}

fn query_chat_rows(conn: &Connection, username: &str) -> Result<Vec<ChatRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, conversation_id, query, response, timestamp
         FROM chats
         WHERE username = ?1
         ORDER BY timestamp DESC, id DESC",
    )?;

    let rows = stmt
        .query_map([username], |row| {
            Ok(ChatRow {
                id: row.get(0)?,
                conversation_id: row.get(1)?,
                query: row.get(2)?,
                response: row.get(3)?,
                timestamp: row.get(4)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// Group rows (newest first) by conversation. Conversation order follows the
/// newest row of each; `first_query` ends up as the earliest query seen.
fn group_conversations(rows: Vec<ChatRow>) -> Vec<ConversationSummary> {
    let mut order: Vec<ConversationSummary> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for row in rows {
        let slot = match index.get(&row.conversation_id) {
            Some(&slot) => slot,
            None => {
                let Ok(id) = row.conversation_id.parse::<Uuid>() else {
                    warn!("Corrupt conversation_id '{}' on chat row {}", row.conversation_id, row.id);
                    continue;
                };
                order.push(ConversationSummary {
                    id,
                    first_query: NEW_CHAT_LABEL.to_string(),
                    messages: Vec::new(),
                });
                index.insert(row.conversation_id.clone(), order.len() - 1);
                order.len() - 1
            }
        };
        let conv = &mut order[slot];

        let ChatRow { id, query, response, timestamp, .. } = row;
        if let Some(query) = &query {
            conv.first_query = query.clone();
        }
        if let (Some(query), Some(response)) = (query, response) {
            conv.messages.push(ChatTurn {
                query,
                response,
                timestamp: parse_timestamp(&timestamp, id),
            });
        }
    }

    order.retain(|conv| !conv.is_placeholder());
    order
}

fn parse_timestamp(raw: &str, row_id: i64) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(raw)
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}' on chat row {}: {}", raw, row_id, e);
            DateTime::default()
        })
}
