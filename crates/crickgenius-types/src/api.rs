use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ConversationSummary;

// -- Session --

/// Claims carried in the signed `session` cookie.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Username of the authenticated principal.
    pub sub: String,
    pub exp: usize,
}

// -- Auth --

/// Body of `/register` and `/login`. Missing fields deserialize as empty
/// strings so they are rejected by validation with a 400, not by the JSON
/// extractor with a 422.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub username: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

// -- Chat --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChatRequest {
    /// Missing is treated like blank and rejected by the handler.
    #[serde(default)]
    pub query: String,
    /// Overrides the `conversation_id` cookie when present.
    #[serde(default)]
    pub conversation_id: Option<Uuid>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
    pub conversation_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct NewChatResponse {
    pub conversation_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatHistoryResponse {
    pub conversations: Vec<ConversationSummary>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_request_defaults_missing_fields() {
        let req: ChatRequest = serde_json::from_str("{}").unwrap();
        assert!(req.query.is_empty());
        assert!(req.conversation_id.is_none());
    }

    #[test]
    fn chat_request_rejects_unknown_fields() {
        let result = serde_json::from_str::<ChatRequest>(r#"{"query": "Toss?", "model": "x"}"#);
        assert!(result.is_err());
    }
}
