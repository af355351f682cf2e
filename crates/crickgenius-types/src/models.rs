use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Label shown for a conversation that has no query yet.
pub const NEW_CHAT_LABEL: &str = "New Chat";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
}

/// Role tag on a prompt message, serialized the way OpenAI-compatible APIs expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// One answered query, as fed back into the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryTurn {
    pub query: String,
    pub response: String,
}

/// One answered query, as listed in chat history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub query: String,
    pub response: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: Uuid,
    pub first_query: String,
    /// Newest first.
    pub messages: Vec<ChatTurn>,
}

impl ConversationSummary {
    /// A conversation reserved by "new chat" that never received a query.
    pub fn is_placeholder(&self) -> bool {
        self.messages.is_empty() && self.first_query == NEW_CHAT_LABEL
    }
}
