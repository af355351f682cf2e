use thiserror::Error;

#[derive(Debug, Error)]
pub enum EnrichmentError {
    #[error("cricket data source is not configured")]
    NotConfigured,

    #[error("cricket API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("cricket API returned status {status}")]
    Upstream { status: u16 },

    #[error("cricket API reported an error: {0}")]
    Reported(String),
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("completion request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("completion API returned status {status}: {body}")]
    Upstream { status: u16, body: String },

    #[error("completion timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("completion contained no text")]
    EmptyCompletion,
}
