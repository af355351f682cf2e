use axum::{Extension, Json, extract::State};
use axum_extra::extract::{CookieJar, WithRejection};
use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crickgenius_types::api::{ChatHistoryResponse, ChatRequest, ChatResponse, NewChatResponse};
use crickgenius_types::models::User;

use crate::error::ApiError;
use crate::run_blocking;
use crate::session::CONVERSATION_COOKIE;
use crate::state::AppState;

/// Body field first, then the cookie. An unparseable cookie is ignored.
fn inbound_conversation(req: &ChatRequest, jar: &CookieJar) -> Option<Uuid> {
    req.conversation_id.or_else(|| {
        let raw = jar.get(CONVERSATION_COOKIE)?.value();
        match raw.parse::<Uuid>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!("Ignoring malformed conversation_id cookie '{}'", raw);
                None
            }
        }
    })
}

/// POST /new_chat — returns the user's unused conversation if there is
/// one, otherwise reserves a fresh id.
pub async fn new_chat(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    jar: CookieJar,
) -> Result<(CookieJar, Json<NewChatResponse>), ApiError> {
    let db = state.clone();
    let username = user.username.clone();
    let candidate = Uuid::new_v4().to_string();
    let reserved = run_blocking(move || {
        Ok(db.db.find_or_reserve_conversation(&username, &candidate, Utc::now())?)
    })
    .await?;

    let conversation_id: Uuid = reserved
        .parse()
        .map_err(|e| anyhow::anyhow!("stored conversation id '{}' is not a UUID: {}", reserved, e))?;
    debug!("User {} is on conversation {}", user.username, conversation_id);

    let jar = jar.add(state.session.conversation_cookie(conversation_id));
    Ok((jar, Json(NewChatResponse { conversation_id })))
}

/// POST /chat — load history, generate a reply, persist the turn. An
/// inbound id that belongs to another user is replaced by a fresh one.
pub async fn chat(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    jar: CookieJar,
    WithRejection(Json(req), _): WithRejection<Json<ChatRequest>, ApiError>,
) -> Result<(CookieJar, Json<ChatResponse>), ApiError> {
    let query = req.query.trim().to_string();
    if query.is_empty() {
        return Err(ApiError::InvalidInput("Query must be non-empty"));
    }

    let conversation_id = match inbound_conversation(&req, &jar) {
        Some(id) => {
            let db = state.clone();
            let (username, key) = (user.username.clone(), id.to_string());
            let foreign = run_blocking(move || Ok(db.db.conversation_owned_by_other(&username, &key)?)).await?;
            if foreign {
                warn!(
                    "User {} sent conversation {} owned by another user, starting a new one",
                    user.username, id
                );
                Uuid::new_v4()
            } else {
                id
            }
        }
        None => Uuid::new_v4(),
    };
    let conversation_key = conversation_id.to_string();

    let db = state.clone();
    let (username, key) = (user.username.clone(), conversation_key.clone());
    let history = run_blocking(move || Ok(db.db.load_history(&username, &key)?)).await?;

    let response = state.generator.generate(&query, &history).await;

    let db = state.clone();
    let username = user.username.clone();
    let (q, r) = (query, response.clone());
    run_blocking(move || Ok(db.db.append_turn(&username, &conversation_key, &q, &r, Utc::now())?)).await?;

    info!(
        "User {} chatted on {} ({} prior turns)",
        user.username,
        conversation_id,
        history.len()
    );

    let jar = jar.add(state.session.conversation_cookie(conversation_id));
    Ok((jar, Json(ChatResponse { response, conversation_id })))
}

/// GET /chat_history
pub async fn chat_history(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Result<Json<ChatHistoryResponse>, ApiError> {
    let db = state.clone();
    let conversations = run_blocking(move || Ok(db.db.list_conversations(&user.username)?)).await?;
    Ok(Json(ChatHistoryResponse { conversations }))
}
