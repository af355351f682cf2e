use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::CookieJar;

use crickgenius_types::models::User;

use crate::error::ApiError;
use crate::session::SESSION_COOKIE;
use crate::state::AppState;

/// Validate the `session` cookie and expose the principal as `Extension<User>`.
pub async fn require_auth(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = jar
        .get(SESSION_COOKIE)
        .map(|c| c.value())
        .filter(|v| !v.is_empty())
        .ok_or(ApiError::Unauthorized)?;

    let claims = state
        .session
        .verify_token(token)
        .ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(User { username: claims.sub });
    Ok(next.run(req).await)
}
