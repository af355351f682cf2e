use axum::{Json, extract::rejection::JsonRejection, http::StatusCode, response::{IntoResponse, Response}};
use thiserror::Error;
use tracing::{debug, error};

use crickgenius_types::api::ErrorResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidInput(&'static str),

    #[error("Username already exists")]
    DuplicateUsername,

    /// Same message for an unknown user and a wrong password.
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidInput(_) | Self::DuplicateUsername => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Body extraction failures get the same `{"error"}` shape as every other 400.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        debug!("Rejected request body: {}", rejection.body_text());
        match rejection {
            JsonRejection::MissingJsonContentType(_) => {
                Self::InvalidInput("Expected a JSON body (Content-Type: application/json)")
            }
            _ => Self::InvalidInput("Malformed JSON body or unexpected fields"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let message = match &self {
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (self.status(), Json(ErrorResponse { error: message })).into_response()
    }
}
