//! Keyword-triggered context injection.
//!
//! The trigger policy and the player-name heuristic are deliberately naive:
//! a query mentioning "player" or "stats" gets a stats lookup for whatever
//! Title-case words it contains, nothing smarter.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crickgenius_types::models::ChatMessage;

use crate::cache::LruCache;
use crate::cricket::CricketDataSource;
use crate::error::EnrichmentError;

const PLAYER_CACHE_CAPACITY: usize = 100;
const MATCH_CACHE_CAPACITY: usize = 50;

const PLAYER_KEYWORDS: &[&str] = &["player", "stats"];
const MATCH_KEYWORDS: &[&str] = &["match", "conditions"];
const TRENDING_KEYWORDS: &[&str] = &["trending"];

/// Which enrichment paths a query asks for.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Triggers {
    pub player_stats: bool,
    pub match_conditions: bool,
    pub trending_players: bool,
}

impl Triggers {
    pub fn detect(query: &str) -> Self {
        let lowered = query.to_lowercase();
        let any = |keywords: &[&str]| keywords.iter().any(|k| lowered.contains(k));
        Self {
            player_stats: any(PLAYER_KEYWORDS),
            match_conditions: any(MATCH_KEYWORDS),
            trending_players: any(TRENDING_KEYWORDS),
        }
    }
}

/// Candidate player name: every Title-case word longer than two characters,
/// minus the trigger keywords themselves, joined with spaces.
pub fn extract_player_name(query: &str) -> Option<String> {
    let words: Vec<&str> = query
        .split_whitespace()
        .map(|w| w.trim_matches(|c: char| !c.is_alphanumeric()))
        .filter(|w| is_title_case(w) && w.chars().count() > 2)
        .filter(|w| {
            let lowered = w.to_lowercase();
            !PLAYER_KEYWORDS
                .iter()
                .chain(MATCH_KEYWORDS)
                .chain(TRENDING_KEYWORDS)
                .any(|k| *k == lowered)
        })
        .collect();

    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

fn is_title_case(word: &str) -> bool {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => chars.all(|c| !c.is_alphabetic() || c.is_lowercase()),
        _ => false,
    }
}

/// Fetches cricket facts for a query, caching per player and per match.
pub struct Enricher {
    source: Option<Arc<dyn CricketDataSource>>,
    default_match_id: Option<String>,
    players: LruCache<String, Value>,
    matches: LruCache<String, Value>,
}

impl Enricher {
    /// `default_match_id` is the match used for "match"/"conditions" queries;
    /// without one that path is skipped, since a query never names a match id.
    pub fn new(source: Arc<dyn CricketDataSource>, default_match_id: Option<String>) -> Self {
        Self {
            source: Some(source),
            default_match_id,
            players: LruCache::new(PLAYER_CACHE_CAPACITY),
            matches: LruCache::new(MATCH_CACHE_CAPACITY),
        }
    }

    /// An enricher that never adds context.
    pub fn disabled() -> Self {
        Self {
            source: None,
            default_match_id: None,
            players: LruCache::new(1),
            matches: LruCache::new(1),
        }
    }

    fn source(&self) -> Result<&Arc<dyn CricketDataSource>, EnrichmentError> {
        self.source.as_ref().ok_or(EnrichmentError::NotConfigured)
    }

    pub async fn player_stats(&self, name: &str) -> Result<Value, EnrichmentError> {
        if let Some(hit) = self.players.get(&name.to_string()) {
            return Ok(hit);
        }
        let stats = self.source()?.player_stats(name).await?;
        self.players.insert(name.to_string(), stats.clone());
        Ok(stats)
    }

    pub async fn match_conditions(&self, match_id: &str) -> Result<Value, EnrichmentError> {
        if let Some(hit) = self.matches.get(&match_id.to_string()) {
            return Ok(hit);
        }
        let conditions = self.source()?.match_conditions(match_id).await?;
        self.matches.insert(match_id.to_string(), conditions.clone());
        Ok(conditions)
    }

    pub async fn trending_players(&self) -> Result<Value, EnrichmentError> {
        self.source()?.trending_players().await
    }

    /// Run the trigger policy for `query` and return extra system messages.
    /// Failures are logged and dropped.
    pub async fn enrich(&self, query: &str) -> Vec<ChatMessage> {
        if self.source.is_none() {
            return Vec::new();
        }

        let triggers = Triggers::detect(query);
        let mut context = Vec::new();

        if triggers.player_stats {
            match extract_player_name(query) {
                Some(name) => match self.player_stats(&name).await {
                    Ok(stats) => {
                        context.push(ChatMessage::system(format!("Player stats for {}: {}", name, stats)))
                    }
                    Err(e) => warn!("Player stats enrichment for '{}' failed: {}", name, e),
                },
                None => debug!("Stats keyword present but no player name found"),
            }
        }

        if triggers.match_conditions {
            match self.default_match_id.as_deref() {
                Some(match_id) => match self.match_conditions(match_id).await {
                    Ok(conditions) => {
                        context.push(ChatMessage::system(format!("Current match conditions: {}", conditions)))
                    }
                    Err(e) => warn!("Match conditions enrichment for '{}' failed: {}", match_id, e),
                },
                None => debug!("Match keyword present but no default match id configured"),
            }
        }

        if triggers.trending_players {
            match self.trending_players().await {
                Ok(trends) => {
                    context.push(ChatMessage::system(format!("Trending fantasy players: {}", trends)))
                }
                Err(e) => warn!("Trending players enrichment failed: {}", e),
            }
        }

        context
    }
}
