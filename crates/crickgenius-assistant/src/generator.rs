use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crickgenius_types::models::{ChatMessage, HistoryTurn};

use crate::completion::{CompletionClient, CompletionRequest};
use crate::enrich::Enricher;
use crate::error::GenerationError;

pub const SYSTEM_PROMPT: &str = "You are a Fantasy Cricket Chatbot Assistant, an expert in cricket analytics, \
fantasy cricket strategies, player performance, and match conditions. \
Provide accurate, concise, and actionable advice for fantasy cricket players. \
Use player stats or match conditions when relevant, and keep responses engaging. \
If the query is a follow-up, use the provided conversation history to maintain context.";

/// Returned to the user whenever the completion call fails.
pub const FALLBACK_RESPONSE: &str = "Sorry, I couldn't process your query. Please try again.";

/// Number of most recent turns replayed into the prompt. Older turns are dropped.
pub const HISTORY_TURNS: usize = 10;

pub const DEFAULT_MODEL: &str = "llama-3.3-70b-versatile";

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl Default for GeneratorSettings {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            temperature: 0.7,
            max_tokens: 500,
            timeout: Duration::from_secs(30),
        }
    }
}

/// System prompt, the last [`HISTORY_TURNS`] turns, the query, then any
/// enrichment as trailing system messages.
pub fn build_prompt(query: &str, history: &[HistoryTurn], enrichment: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let recent = &history[history.len().saturating_sub(HISTORY_TURNS)..];

    let mut messages = Vec::with_capacity(2 + recent.len() * 2 + enrichment.len());
    messages.push(ChatMessage::system(SYSTEM_PROMPT));
    for turn in recent {
        messages.push(ChatMessage::user(turn.query.clone()));
        messages.push(ChatMessage::assistant(turn.response.clone()));
    }
    messages.push(ChatMessage::user(query));
    messages.extend(enrichment);
    messages
}

pub struct ResponseGenerator {
    client: Arc<dyn CompletionClient>,
    enricher: Enricher,
    settings: GeneratorSettings,
}

impl ResponseGenerator {
    pub fn new(client: Arc<dyn CompletionClient>, enricher: Enricher, settings: GeneratorSettings) -> Self {
        Self { client, enricher, settings }
    }

    pub async fn try_generate(&self, query: &str, history: &[HistoryTurn]) -> Result<String, GenerationError> {
        let enrichment = self.enricher.enrich(query).await;
        debug!(
            "Generating reply with {} history turns and {} context messages",
            history.len().min(HISTORY_TURNS),
            enrichment.len()
        );

        let request = CompletionRequest {
            model: self.settings.model.clone(),
            messages: build_prompt(query, history, enrichment),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        tokio::time::timeout(self.settings.timeout, self.client.complete(&request))
            .await
            .map_err(|_| GenerationError::Timeout(self.settings.timeout))?
    }

    /// Like [`Self::try_generate`], but any failure becomes [`FALLBACK_RESPONSE`].
    pub async fn generate(&self, query: &str, history: &[HistoryTurn]) -> String {
        match self.try_generate(query, history).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Completion failed, replying with fallback: {}", e);
                FALLBACK_RESPONSE.to_string()
            }
        }
    }
}
