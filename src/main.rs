//! Threat Scan Server
//!
//! Crawls a site (or reads an uploaded table), scores every endpoint with a
//! model, maps the endpoint graph and reports attack paths and a threat level.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     THREAT SCAN SERVER                      │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌─────────────────────────────────────────┐ │
//! │  │  API      │  │  Scan Pipeline                          │ │
//! │  │  (Axum)   │─►│  ingest ► features ► score ∥ topology   │ │
//! │  │           │  │         ► paths ► aggregate             │ │
//! │  └───────────┘  └──────────────────┬──────────────────────┘ │
//! │                                    ▼                        │
//! │        crawler · csv parser · model · alert sink            │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod clients;
mod config;
mod error;
mod handlers;
mod models;
mod pipeline;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::clients::{AlertSink, CsvParser, HttpCrawler, LogSink, ModelRegistry, WebhookSink};
use crate::pipeline::{AlertDispatcher, ScanEngine};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    // Initialize logging
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "threat_scan=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);
    if config.log_json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Threat Scan Server starting ({})...", config.environment);
    tracing::info!(
        "Model: {}",
        config.model.url.as_deref()
            .or(config.model.path.as_deref())
            .unwrap_or("none (scores fall back to neutral)")
    );
    if config.is_production() && config.alert.webhook_url.is_none() {
        tracing::warn!("No ALERT_WEBHOOK_URL set; alerts are only logged");
    }

    // Build application state
    let engine = build_engine(&config)?;
    let state = AppState {
        engine: Arc::new(engine),
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ScanEngine>,
    pub config: config::Config,
}

fn build_engine(config: &config::Config) -> anyhow::Result<ScanEngine> {
    let crawler = HttpCrawler::new(&config.crawl)
        .context("failed to build crawler HTTP client")?;

    let sink: Arc<dyn AlertSink> = match &config.alert.webhook_url {
        Some(url) => Arc::new(WebhookSink::new(url.clone())),
        None => Arc::new(LogSink),
    };

    Ok(ScanEngine {
        crawler: Arc::new(crawler),
        parser: Arc::new(CsvParser::default()),
        models: ModelRegistry::new(config.model.clone()),
        dispatcher: AlertDispatcher::new(sink, &config.alert),
        crawl_config: config.crawl.clone(),
        model_config: config.model.clone(),
        scan_config: config.scan.clone(),
    })
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_upload_bytes;

    Router::new()
        .route("/health", get(handlers::health::check))
        .route("/crawl", post(handlers::crawl::crawl))
        .route("/predict", post(handlers::predict::predict))
        .route("/network/graph", post(handlers::network::graph))
        .route("/network/paths", post(handlers::network::attack_paths))
        .route("/alert", post(handlers::alert::push))
        .route("/fullscan", post(handlers::fullscan::fullscan))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(CatchPanicLayer::custom(error::panic_response))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
