//! Gaia Guide - guided onboarding assistant for carbon footprints
//!
//! A Rust backend driving the onboarding conversation as a step-table
//! state machine, with replies streamed from an OpenAI-compatible model.

mod api;
mod config;
mod flow;
mod llm;
mod runtime;
mod system_prompt;

use api::{create_router, AppState};
use config::AppConfig;
use llm::{LoggingGenerator, OpenAiGenerator};
use runtime::SessionManager;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gaia_guide=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    // Configuration
    let config = AppConfig::from_env()?;
    if config.llm.api_key.is_none() {
        tracing::warn!("OPENAI_API_KEY is not configured; replies will fail until it is set");
    }
    tracing::info!(
        model = %config.llm.model,
        base_url = %config.llm.base_url,
        timeout_secs = config.llm.request_timeout.as_secs(),
        "Text generator configured"
    );

    let generator = Arc::new(LoggingGenerator::new(Arc::new(OpenAiGenerator::new(
        &config.llm,
    )?)));
    let sessions = Arc::new(SessionManager::new(generator, config.flow));
    let _sweep = sessions.spawn_idle_sweep(config.session_idle_timeout);
    tracing::info!(
        idle_secs = config.session_idle_timeout.as_secs(),
        "Idle session sweep started"
    );
    let state = AppState::new(sessions);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!(%addr, "Gaia Guide server listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
