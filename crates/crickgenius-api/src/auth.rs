use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{Extension, Json, extract::State};
use axum_extra::extract::{CookieJar, WithRejection};
use rand_core::OsRng;
use tracing::info;

use crickgenius_db::Database;
use crickgenius_types::api::{CredentialsRequest, MessageResponse, UserResponse};
use crickgenius_types::models::User;

use crate::error::ApiError;
use crate::run_blocking;
use crate::state::AppState;

const EMPTY_CREDENTIALS: &str = "Username and password must be non-empty";

fn trimmed_credentials<'a>(username: &'a str, password: &'a str) -> Result<(&'a str, &'a str), ApiError> {
    let (username, password) = (username.trim(), password.trim());
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::InvalidInput(EMPTY_CREDENTIALS));
    }
    Ok((username, password))
}

/// Create a user with an Argon2id password hash. Blocking.
pub fn register_user(db: &Database, username: &str, password: &str) -> Result<User, ApiError> {
    let (username, password) = trimmed_credentials(username, password)?;

    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("password hashing failed: {}", e))?
        .to_string();

    if !db.create_user(username, &password_hash)? {
        return Err(ApiError::DuplicateUsername);
    }

    Ok(User { username: username.to_string() })
}

/// Check a username/password pair. Blocking.
pub fn authenticate(db: &Database, username: &str, password: &str) -> Result<User, ApiError> {
    let (username, password) = trimmed_credentials(username, password)?;

    let user = db
        .get_user_by_username(username)?
        .ok_or(ApiError::InvalidCredentials)?;

    let parsed_hash = PasswordHash::new(&user.password_hash)
        .map_err(|e| anyhow::anyhow!("stored hash for '{}' is unreadable: {}", username, e))?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| ApiError::InvalidCredentials)?;

    Ok(User { username: user.username })
}

/// POST /register — creates the user and logs them in.
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(req), _): WithRejection<Json<CredentialsRequest>, ApiError>,
) -> Result<(CookieJar, Json<UserResponse>), ApiError> {
    let db = state.clone();
    let user = run_blocking(move || register_user(&db.db, &req.username, &req.password)).await?;

    info!("Registered user {}", user.username);
    let jar = jar.add(state.session.session_cookie(&user.username)?);
    Ok((jar, Json(UserResponse { username: user.username })))
}

/// POST /login
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    WithRejection(Json(req), _): WithRejection<Json<CredentialsRequest>, ApiError>,
) -> Result<(CookieJar, Json<UserResponse>), ApiError> {
    let db = state.clone();
    let user = run_blocking(move || authenticate(&db.db, &req.username, &req.password)).await?;

    info!("User {} logged in", user.username);
    let jar = jar.add(state.session.session_cookie(&user.username)?);
    Ok((jar, Json(UserResponse { username: user.username })))
}

/// POST /logout — always succeeds, with or without a session. Also drops
/// the conversation cookie so the next user on this browser starts fresh.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<MessageResponse>) {
    let jar = jar
        .remove(state.session.expired_session_cookie())
        .remove(state.session.expired_conversation_cookie());
    (jar, Json(MessageResponse { message: "Logged out".to_string() }))
}

/// GET /profile
pub async fn profile(Extension(user): Extension<User>) -> Json<UserResponse> {
    Json(UserResponse { username: user.username })
}
