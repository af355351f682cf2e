mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::http::{HeaderName, HeaderValue, Method, header::CONTENT_TYPE};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::set_header::SetResponseHeaderLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crickgenius_api::session::SessionConfig;
use crickgenius_api::state::AppStateInner;
use crickgenius_assistant::completion::OpenAiCompatClient;
use crickgenius_assistant::cricket::CricApiClient;
use crickgenius_assistant::enrich::Enricher;
use crickgenius_assistant::generator::{GeneratorSettings, ResponseGenerator};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crickgenius=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = crickgenius_db::Database::open(&config.db_path)?;

    // Upstream clients share one connection pool and timeout
    let http = reqwest::Client::builder()
        .timeout(config.upstream_timeout)
        .build()?;

    let enricher = match config.cric_api_key.as_deref() {
        Some(key) => {
            let source = CricApiClient::new(http.clone(), &config.cric_api_url, key);
            Enricher::new(Arc::new(source), config.default_match_id.clone())
        }
        None => {
            warn!("CRIC_API_KEY not set, replies will not include cricket data");
            Enricher::disabled()
        }
    };

    let completion = OpenAiCompatClient::new(http, &config.groq_api_base, &config.groq_api_key);
    let generator = ResponseGenerator::new(
        Arc::new(completion),
        enricher,
        GeneratorSettings {
            model: config.model.clone(),
            timeout: config.upstream_timeout,
            ..Default::default()
        },
    );

    let state = Arc::new(AppStateInner {
        db,
        generator,
        session: SessionConfig::new(config.session_secret.clone(), config.session_ttl, config.secure_cookies),
    });

    let app = crickgenius_api::router(state)
        .layer(cors_layer(config.allowed_origin.as_deref())?)
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-opener-policy"),
            HeaderValue::from_static("same-origin-allow-popups"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            HeaderName::from_static("cross-origin-resource-policy"),
            HeaderValue::from_static("cross-origin"),
        ))
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("CrickGenius server listening on {}", addr);
    info!("Using model {}", config.model);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Cookies only travel cross-origin when a single origin is allowed with
/// credentials. Without one, fall back to permissive CORS.
fn cors_layer(allowed_origin: Option<&str>) -> anyhow::Result<CorsLayer> {
    let Some(origin) = allowed_origin else {
        warn!("CRICKGENIUS_ALLOWED_ORIGIN not set, using permissive CORS without credentials");
        return Ok(CorsLayer::permissive());
    };

    info!("CORS: allowing credentials from {}", origin);
    Ok(CorsLayer::new()
        .allow_origin(AllowOrigin::exact(HeaderValue::from_str(origin)?))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE])
        .allow_credentials(true))
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
                    _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                ctrl_c.await.ok();
                info!("Received Ctrl+C, shutting down...");
            }
        }
    }
    #[cfg(not(unix))]
    {
        ctrl_c.await.ok();
        info!("Received Ctrl+C, shutting down...");
    }
}
