//! Client for the third-party cricket statistics API.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::EnrichmentError;

/// Source of auxiliary cricket facts. Responses are passed through to the
/// prompt as opaque JSON.
#[async_trait]
pub trait CricketDataSource: Send + Sync {
    async fn player_stats(&self, name: &str) -> Result<Value, EnrichmentError>;

    async fn match_conditions(&self, match_id: &str) -> Result<Value, EnrichmentError>;

    async fn trending_players(&self) -> Result<Value, EnrichmentError>;
}

/// HTTP client for cricapi-style endpoints (`{base}/player_stats`,
/// `{base}/current_match`, `{base}/fantasy_trends`), authenticated with an
/// `apikey` query parameter.
///
/// Does not derive Debug so the API key cannot end up in logs.
pub struct CricApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CricApiClient {
    pub fn new(http: reqwest::Client, base_url: &str, api_key: &str) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn fetch(&self, endpoint: &str, params: &[(&str, &str)]) -> Result<Value, EnrichmentError> {
        let url = format!("{}/{}", self.base_url, endpoint);
        debug!("GET {}", url);

        let mut query: Vec<(&str, &str)> = vec![("apikey", self.api_key.as_str())];
        query.extend_from_slice(params);

        let resp = self.http.get(&url).query(&query).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(EnrichmentError::Upstream { status: status.as_u16() });
        }

        let body: Value = resp.json().await?;
        match reported_error(&body) {
            Some(message) => Err(EnrichmentError::Reported(message)),
            None => Ok(body),
        }
    }
}

#[async_trait]
impl CricketDataSource for CricApiClient {
    async fn player_stats(&self, name: &str) -> Result<Value, EnrichmentError> {
        self.fetch("player_stats", &[("name", name)]).await
    }

    async fn match_conditions(&self, match_id: &str) -> Result<Value, EnrichmentError> {
        self.fetch("current_match", &[("id", match_id)]).await
    }

    async fn trending_players(&self) -> Result<Value, EnrichmentError> {
        self.fetch("fantasy_trends", &[]).await
    }
}

/// The API answers some failures with a 200 and a truthy top-level `error`.
fn reported_error(body: &Value) -> Option<String> {
    match body.get("error")? {
        Value::Null | Value::Bool(false) => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}
