use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

use crickgenius_assistant::generator::DEFAULT_MODEL;

/// Session secrets that ship in examples and must never be used.
const PLACEHOLDER_SECRETS: &[&str] = &["your-secret-key", "change-me", "dev-secret-change-me"];

/// Server configuration, read once from the environment (and `.env`).
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub session_secret: String,
    pub session_ttl: Duration,
    pub secure_cookies: bool,
    pub allowed_origin: Option<String>,
    pub groq_api_key: String,
    pub groq_api_base: String,
    pub model: String,
    pub cric_api_key: Option<String>,
    pub cric_api_url: String,
    pub default_match_id: Option<String>,
    pub upstream_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let or = |key: &str, default: &str| var(key).unwrap_or_else(|| default.to_string());

        let session_secret = var("CRICKGENIUS_SESSION_SECRET").unwrap_or_default();
        if session_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&session_secret.as_str()) {
            bail!("CRICKGENIUS_SESSION_SECRET is unset or still a placeholder");
        }

        let groq_api_key = var("GROQ_API_KEY").context("GROQ_API_KEY must be set")?;

        let port: u16 = or("PORT", "5001").parse().context("PORT must be a port number")?;
        let session_ttl_secs: u64 = or("CRICKGENIUS_SESSION_TTL_SECS", "3600")
            .parse()
            .context("CRICKGENIUS_SESSION_TTL_SECS must be a number of seconds")?;
        let timeout_secs: u64 = or("CRICKGENIUS_UPSTREAM_TIMEOUT_SECS", "30")
            .parse()
            .context("CRICKGENIUS_UPSTREAM_TIMEOUT_SECS must be a number of seconds")?;
        let secure_cookies = match or("CRICKGENIUS_SECURE_COOKIES", "true").to_lowercase().as_str() {
            "1" | "true" | "yes" => true,
            "0" | "false" | "no" => false,
            other => bail!("CRICKGENIUS_SECURE_COOKIES must be true or false, got '{}'", other),
        };

        Ok(Self {
            host: or("CRICKGENIUS_HOST", "0.0.0.0"),
            port,
            db_path: or("CRICKGENIUS_DB_PATH", "crickgenius.db").into(),
            session_secret,
            session_ttl: Duration::from_secs(session_ttl_secs),
            secure_cookies,
            allowed_origin: var("CRICKGENIUS_ALLOWED_ORIGIN").map(|o| o.trim_end_matches('/').to_string()),
            groq_api_key,
            groq_api_base: or("GROQ_API_BASE", "https://api.groq.com/openai/v1"),
            model: or("CRICKGENIUS_MODEL", DEFAULT_MODEL),
            cric_api_key: var("CRIC_API_KEY"),
            cric_api_url: or("CRIC_API_URL", "https://api.cricapi.com/v1/"),
            default_match_id: var("CRICKGENIUS_DEFAULT_MATCH_ID"),
            upstream_timeout: Duration::from_secs(timeout_secs),
        })
    }
}
