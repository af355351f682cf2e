pub mod auth;
pub mod chat;
pub mod error;
pub mod middleware;
pub mod session;
pub mod state;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use tracing::error;

use crate::error::ApiError;
use crate::middleware::require_auth;
use crate::state::AppState;

/// All routes, without transport layers (CORS, tracing), which the server adds.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/logout", post(auth::logout));

    let protected_routes = Router::new()
        .route("/new_chat", post(chat::new_chat))
        .route("/chat", post(chat::chat))
        .route("/chat_history", get(chat::chat_history))
        .route("/profile", get(auth::profile))
        .route_layer(from_fn_with_state(state.clone(), require_auth));

    public_routes.merge(protected_routes).with_state(state)
}

/// Run blocking DB or hashing work off the async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(e.into())
    })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{HeaderMap, Request, StatusCode, header};
    use http_body_util::BodyExt;
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use crickgenius_assistant::completion::{CompletionClient, CompletionRequest};
    use crickgenius_assistant::enrich::Enricher;
    use crickgenius_assistant::error::GenerationError;
    use crickgenius_assistant::generator::{FALLBACK_RESPONSE, GeneratorSettings, ResponseGenerator};
    use crickgenius_db::Database;

    use crate::session::SessionConfig;
    use crate::state::AppStateInner;

    /// Replies with the query and records how many messages each prompt had.
    #[derive(Default)]
    struct EchoClient {
        prompt_sizes: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl CompletionClient for EchoClient {
        async fn complete(&self, request: &CompletionRequest) -> Result<String, GenerationError> {
            self.prompt_sizes.lock().unwrap().push(request.messages.len());
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(format!("echo: {}", last))
        }
    }

    struct DownClient;

    #[async_trait]
    impl CompletionClient for DownClient {
        async fn complete(&self, _request: &CompletionRequest) -> Result<String, GenerationError> {
            Err(GenerationError::Upstream { status: 500, body: "boom".into() })
        }
    }

    fn app_with(client: Arc<dyn CompletionClient>) -> Router {
        let state = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            generator: ResponseGenerator::new(client, Enricher::disabled(), GeneratorSettings::default()),
            session: SessionConfig::new("test-secret", Duration::from_secs(3600), false),
        });
        router(state)
    }

    /// Minimal client-side cookie jar: `name=value` pairs from Set-Cookie.
    #[derive(Default, Clone)]
    struct Cookies(Vec<(String, String)>);

    impl Cookies {
        fn absorb(&mut self, headers: &HeaderMap) {
            for value in headers.get_all(header::SET_COOKIE) {
                let raw = value.to_str().unwrap();
                let pair = raw.split(';').next().unwrap();
                let (name, val) = pair.split_once('=').unwrap();
                self.0.retain(|(n, _)| n != name);
                if !val.is_empty() {
                    self.0.push((name.to_string(), val.to_string()));
                }
            }
        }

        fn get(&self, name: &str) -> Option<&str> {
            self.0.iter().find(|(n, _)| n == name).map(|(_, v)| v.as_str())
        }

        fn header(&self) -> String {
            self.0.iter().map(|(n, v)| format!("{}={}", n, v)).collect::<Vec<_>>().join("; ")
        }
    }

    async fn send(
        app: &Router,
        cookies: &mut Cookies,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if !cookies.0.is_empty() {
            builder = builder.header(header::COOKIE, cookies.header());
        }
        let req = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let resp = app.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        cookies.absorb(resp.headers());

        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        let json = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
        (status, json)
    }

    async fn registered(app: &Router, username: &str) -> Cookies {
        let mut cookies = Cookies::default();
        let (status, _) = send(
            app,
            &mut cookies,
            "POST",
            "/register",
            Some(json!({"username": username, "password": "pace-like-fire"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        cookies
    }

    #[tokio::test]
    async fn register_login_profile_logout() {
        let app = app_with(Arc::new(EchoClient::default()));
        let mut session = registered(&app, "siraj").await;
        assert!(session.get("session").is_some());

        let (status, body) = send(&app, &mut session, "GET", "/profile", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "siraj");

        // Duplicate registration fails and leaves the existing session alone.
        let mut other = Cookies::default();
        let (status, body) = send(
            &app,
            &mut other,
            "POST",
            "/register",
            Some(json!({"username": "siraj", "password": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Username already exists");
        let (status, _) = send(&app, &mut session, "GET", "/profile", None).await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(&app, &mut session, "POST", "/logout", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Logged out");
        assert!(session.get("session").is_none());

        let (status, _) = send(&app, &mut session, "GET", "/profile", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, body) = send(
            &app,
            &mut session,
            "POST",
            "/login",
            Some(json!({"username": "siraj", "password": "pace-like-fire"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["username"], "siraj");
        let (status, _) = send(&app, &mut session, "GET", "/profile", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn login_failures() {
        let app = app_with(Arc::new(EchoClient::default()));
        registered(&app, "siraj").await;
        let mut anon = Cookies::default();

        let (status, wrong) = send(
            &app,
            &mut anon,
            "POST",
            "/login",
            Some(json!({"username": "siraj", "password": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, unknown) = send(
            &app,
            &mut anon,
            "POST",
            "/login",
            Some(json!({"username": "ghost", "password": "nope"})),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong, unknown);

        let (status, _) = send(&app, &mut anon, "POST", "/login", Some(json!({"username": "siraj"}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(anon.get("session").is_none());
    }

    #[tokio::test]
    async fn protected_routes_need_a_valid_session() {
        let app = app_with(Arc::new(EchoClient::default()));
        let mut anon = Cookies::default();

        for (method, uri) in [("POST", "/new_chat"), ("GET", "/chat_history"), ("GET", "/profile")] {
            let (status, body) = send(&app, &mut anon, method, uri, None).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{} {}", method, uri);
            assert_eq!(body["error"], "Unauthorized");
        }
        let (status, _) = send(&app, &mut anon, "POST", "/chat", Some(json!({"query": "hi"}))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let mut forged = Cookies(vec![("session".into(), "eyJhbGciOiJIUzI1NiJ9.e30.bad".into())]);
        let (status, _) = send(&app, &mut forged, "GET", "/profile", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn new_chat_is_idempotent_until_used() {
        let app = app_with(Arc::new(EchoClient::default()));
        let mut session = registered(&app, "axar").await;

        let (_, first) = send(&app, &mut session, "POST", "/new_chat", None).await;
        let (_, second) = send(&app, &mut session, "POST", "/new_chat", None).await;
        assert_eq!(first["conversation_id"], second["conversation_id"]);
        assert_eq!(
            session.get("conversation_id"),
            first["conversation_id"].as_str()
        );

        // The reserved placeholder never shows up in the history listing.
        let (status, history) = send(&app, &mut session, "GET", "/chat_history", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["conversations"], json!([]));

        send(&app, &mut session, "POST", "/chat", Some(json!({"query": "Toss prediction?"}))).await;
        let (_, third) = send(&app, &mut session, "POST", "/new_chat", None).await;
        assert_ne!(third["conversation_id"], first["conversation_id"]);
    }

    #[tokio::test]
    async fn chat_continues_conversation_from_cookie() {
        let client = Arc::new(EchoClient::default());
        let app = app_with(client.clone());
        let mut session = registered(&app, "axar").await;

        let (_, reserved) = send(&app, &mut session, "POST", "/new_chat", None).await;

        let (status, first) =
            send(&app, &mut session, "POST", "/chat", Some(json!({"query": "Best spinner?"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(first["response"], "echo: Best spinner?");
        assert_eq!(first["conversation_id"], reserved["conversation_id"]);

        let (_, second) =
            send(&app, &mut session, "POST", "/chat", Some(json!({"query": "And a pacer?"}))).await;
        assert_eq!(second["conversation_id"], reserved["conversation_id"]);

        // system + query, then system + 1 prior turn + query
        assert_eq!(*client.prompt_sizes.lock().unwrap(), vec![2, 4]);

        let (_, history) = send(&app, &mut session, "GET", "/chat_history", None).await;
        let convs = history["conversations"].as_array().unwrap();
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0]["id"], reserved["conversation_id"]);
        assert_eq!(convs[0]["first_query"], "Best spinner?");
        assert_eq!(convs[0]["messages"][0]["query"], "And a pacer?");
        assert_eq!(convs[0]["messages"][1]["query"], "Best spinner?");
    }

    #[tokio::test]
    async fn foreign_conversation_id_starts_a_new_conversation() {
        let client = Arc::new(EchoClient::default());
        let app = app_with(client.clone());
        let mut owner = registered(&app, "axar").await;
        let mut intruder = registered(&app, "kuldeep").await;

        let (_, first) = send(&app, &mut owner, "POST", "/chat", Some(json!({"query": "Secret plan"}))).await;
        let owner_conv = first["conversation_id"].clone();

        // The body id wins over the cookie, but someone else's id is replaced.
        let (status, reply) = send(
            &app,
            &mut intruder,
            "POST",
            "/chat",
            Some(json!({"query": "What was the plan?", "conversation_id": owner_conv})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_ne!(reply["conversation_id"], owner_conv);
        assert_eq!(intruder.get("conversation_id"), reply["conversation_id"].as_str());
        assert_eq!(*client.prompt_sizes.lock().unwrap(), vec![2, 2]);

        let (_, history) = send(&app, &mut owner, "GET", "/chat_history", None).await;
        let convs = history["conversations"].as_array().unwrap();
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0]["id"], owner_conv);
        assert_eq!(convs[0]["messages"].as_array().unwrap().len(), 1);

        let (_, history) = send(&app, &mut intruder, "GET", "/chat_history", None).await;
        assert_eq!(history["conversations"][0]["id"], reply["conversation_id"]);
    }

    #[tokio::test]
    async fn logout_forgets_the_conversation_for_the_next_user() {
        let app = app_with(Arc::new(EchoClient::default()));
        let mut browser = registered(&app, "axar").await;

        let (_, first) = send(&app, &mut browser, "POST", "/chat", Some(json!({"query": "Captain?"}))).await;
        let axar_conv = first["conversation_id"].clone();

        send(&app, &mut browser, "POST", "/logout", None).await;
        assert!(browser.get("conversation_id").is_none());

        let (status, _) = send(
            &app,
            &mut browser,
            "POST",
            "/register",
            Some(json!({"username": "kuldeep", "password": "chinaman"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let (_, second) = send(&app, &mut browser, "POST", "/chat", Some(json!({"query": "Vice captain?"}))).await;
        assert_ne!(second["conversation_id"], axar_conv);

        // Even a stale cookie left behind by some other client is not reused.
        let mut stale = browser.clone();
        stale.0.retain(|(n, _)| n != "conversation_id");
        stale.0.push(("conversation_id".into(), axar_conv.as_str().unwrap().to_string()));
        let (_, third) = send(&app, &mut stale, "POST", "/chat", Some(json!({"query": "Keeper?"}))).await;
        assert_ne!(third["conversation_id"], axar_conv);

        let mut axar = Cookies::default();
        send(
            &app,
            &mut axar,
            "POST",
            "/login",
            Some(json!({"username": "axar", "password": "pace-like-fire"})),
        )
        .await;
        let (_, history) = send(&app, &mut axar, "GET", "/chat_history", None).await;
        let convs = history["conversations"].as_array().unwrap();
        assert_eq!(convs.len(), 1);
        assert_eq!(convs[0]["id"], axar_conv);
        assert_eq!(convs[0]["messages"].as_array().unwrap().len(), 1);
        assert_eq!(convs[0]["messages"][0]["query"], "Captain?");
    }

    #[tokio::test]
    async fn generation_failure_still_persists_fallback() {
        let app = app_with(Arc::new(DownClient));
        let mut session = registered(&app, "shami").await;

        let (status, reply) =
            send(&app, &mut session, "POST", "/chat", Some(json!({"query": "Dream11 team?"}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(reply["response"], FALLBACK_RESPONSE);

        let (_, history) = send(&app, &mut session, "GET", "/chat_history", None).await;
        assert_eq!(history["conversations"][0]["messages"][0]["response"], FALLBACK_RESPONSE);
    }

    #[tokio::test]
    async fn blank_query_is_rejected() {
        let app = app_with(Arc::new(EchoClient::default()));
        let mut session = registered(&app, "shami").await;

        let (status, body) = send(&app, &mut session, "POST", "/chat", Some(json!({"query": "   "}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Query must be non-empty");
    }

    #[tokio::test]
    async fn missing_query_is_a_json_bad_request() {
        let app = app_with(Arc::new(EchoClient::default()));
        let mut session = registered(&app, "shami").await;

        let (status, body) = send(&app, &mut session, "POST", "/chat", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Query must be non-empty");

        let (status, body) =
            send(&app, &mut session, "POST", "/chat", Some(json!({"query": "Pitch?", "temperature": 2}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }

    #[tokio::test]
    async fn unreadable_bodies_get_json_errors() {
        let app = app_with(Arc::new(EchoClient::default()));
        let session = registered(&app, "shami").await;

        for (uri, content_type, raw) in [
            ("/chat", "application/json", "{not json"),
            ("/chat", "text/plain", r#"{"query": "Pitch?"}"#),
            ("/login", "application/json", "[1, 2]"),
            ("/register", "application/json", ""),
        ] {
            let req = Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::COOKIE, session.header())
                .header(header::CONTENT_TYPE, content_type)
                .body(Body::from(raw))
                .unwrap();
            let resp = app.clone().oneshot(req).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{} {:?}", uri, raw);

            let bytes = resp.into_body().collect().await.unwrap().to_bytes();
            let body: Value = serde_json::from_slice(&bytes).unwrap();
            assert!(body["error"].is_string(), "{} {:?}", uri, raw);
        }
    }
}
