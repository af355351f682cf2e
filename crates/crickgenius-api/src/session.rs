use std::time::Duration;

use axum_extra::extract::cookie::{Cookie, SameSite};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use crickgenius_types::api::Claims;

pub const SESSION_COOKIE: &str = "session";
pub const CONVERSATION_COOKIE: &str = "conversation_id";

/// Signs and checks the session token, and builds the cookies that carry
/// it and the current conversation id.
#[derive(Clone)]
pub struct SessionConfig {
    secret: String,
    ttl: Duration,
    secure_cookies: bool,
}

impl SessionConfig {
    /// With `secure_cookies` the cookies are `Secure; SameSite=None` so a
    /// frontend on another origin can send them; otherwise `SameSite=Lax`
    /// for plain-HTTP local development.
    pub fn new(secret: impl Into<String>, ttl: Duration, secure_cookies: bool) -> Self {
        Self { secret: secret.into(), ttl, secure_cookies }
    }

    pub fn issue_token(&self, username: &str) -> anyhow::Result<String> {
        let ttl = chrono::Duration::from_std(self.ttl)?;
        let claims = Claims {
            sub: username.to_string(),
            exp: (chrono::Utc::now() + ttl).timestamp() as usize,
        };

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )?;

        Ok(token)
    }

    /// `None` for a forged, malformed or expired token.
    pub fn verify_token(&self, token: &str) -> Option<Claims> {
        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .ok()
        .map(|data| data.claims)
    }

    pub fn session_cookie(&self, username: &str) -> anyhow::Result<Cookie<'static>> {
        Ok(self.cookie(SESSION_COOKIE, self.issue_token(username)?))
    }

    /// Matches the attributes of [`Self::session_cookie`] so browsers drop it.
    pub fn expired_session_cookie(&self) -> Cookie<'static> {
        self.cookie(SESSION_COOKIE, String::new())
    }

    pub fn conversation_cookie(&self, conversation_id: Uuid) -> Cookie<'static> {
        self.cookie(CONVERSATION_COOKIE, conversation_id.to_string())
    }

    pub fn expired_conversation_cookie(&self) -> Cookie<'static> {
        self.cookie(CONVERSATION_COOKIE, String::new())
    }

    fn cookie(&self, name: &'static str, value: String) -> Cookie<'static> {
        let same_site = if self.secure_cookies { SameSite::None } else { SameSite::Lax };
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(self.secure_cookies)
            .same_site(same_site)
            .build()
    }
}
