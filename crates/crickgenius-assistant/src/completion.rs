//! OpenAI-compatible chat completion client (Groq by default).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crickgenius_types::models::ChatMessage;

use crate::error::GenerationError;

/// Request body for `POST {base}/chat/completions`.
#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Return the trimmed text of the first choice.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError>;
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

/// Does not derive Debug so the API key cannot end up in logs.
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl OpenAiCompatClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl CompletionClient for OpenAiCompatClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
        let url = format!("{}/chat/completions", self.base_url);
        debug!(
            "POST {} (model={}, messages={})",
            url,
            request.model,
            request.messages.len()
        );

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(GenerationError::Upstream { status: status.as_u16(), body });
        }

        let parsed: CompletionResponse = resp.json().await?;
        first_choice_text(parsed)
    }
}

fn first_choice_text(resp: CompletionResponse) -> Result<String, GenerationError> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message.content)
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .ok_or(GenerationError::EmptyCompletion)
}
