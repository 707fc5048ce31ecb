//! Storefront assistant HTTP server
//!
//! Axum-based server exposing the assistant over REST and WebSocket.
//! The commerce backend is the in-memory mock store.

mod config;
mod handlers;
mod state;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use agent_core::session::DEFAULT_MAX_ITEMS_PER_SESSION;
use agent_core::{HistoryStore, LlmProvider, MemoryHistoryStore, ToolRegistry};
use agent_guard::{BotVerifier, DisabledVerifier, SealedHistoryStore, SecretBox, TurnstileVerifier};
use agent_runtime::OllamaProvider;
use storefront_assistant::{CommerceClient, MockCommerceClient, StoreKnowledge};

use crate::config::ServerConfig;
use crate::handlers::{ask_handler, ask_stream_handler, health_check, info};
use crate::state::AppState;

/// Routes and middleware around the shared state
fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/api/info", get(info))
        .route("/api/ask", post(ask_handler))
        .route("/api/ask/stream", get(ask_stream_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;
    config.agent_config(String::new()).validate()?;

    let provider = Arc::new(OllamaProvider::from_env());
    match provider.health_check().await {
        Ok(true) => {
            tracing::info!(provider = provider.name(), url = %provider.config().url(), "Model backend connected");
            if let Ok(models) = provider.list_models().await {
                let tagged = format!("{}:", config.model);
                if !models.iter().any(|m| m.id == config.model || m.id.starts_with(&tagged)) {
                    tracing::warn!(model = %config.model, "Configured model is not pulled; run `ollama pull`");
                }
            }
        }
        Ok(false) | Err(_) => {
            tracing::warn!(url = %provider.config().url(), "Ollama not available; requests will fail until it is");
        }
    }

    let knowledge = match &config.knowledge_path {
        Some(path) => StoreKnowledge::from_file(path).await?,
        None => StoreKnowledge::defaults(),
    };

    let commerce: Arc<dyn CommerceClient> = Arc::new(MockCommerceClient::new());
    let mut tools = ToolRegistry::new();
    storefront_assistant::register_tools(&mut tools, commerce)?;
    for name in tools.names() {
        tracing::info!(tool = name, "Tool available");
    }

    let verifier: Arc<dyn BotVerifier> = match &config.turnstile_secret {
        Some(secret) => {
            tracing::info!("Turnstile verification enabled");
            Arc::new(TurnstileVerifier::new(secret.as_str())?)
        }
        None => Arc::new(DisabledVerifier::new()),
    };

    let sessions = MemoryHistoryStore::with_limits(
        config.max_sessions,
        config.history_limit.max(DEFAULT_MAX_ITEMS_PER_SESSION),
    );
    let history: Arc<dyn HistoryStore> = match &config.secret_key {
        Some(key) => {
            tracing::info!("Session history encrypted at rest");
            Arc::new(SealedHistoryStore::new(sessions, SecretBox::from_secret(key)?))
        }
        None => {
            tracing::warn!("SECRET_KEY not set; session history is stored in plaintext");
            Arc::new(sessions)
        }
    };

    let addr = config.bind_addr.clone();
    let state = AppState {
        provider,
        tools: Arc::new(tools),
        knowledge: Arc::new(knowledge),
        config: Arc::new(config),
        verifier,
        history,
    };

    let listener = tokio::net::TcpListener::bind(&addr).await?;

    tracing::info!("Storefront assistant listening on http://{addr}");
    tracing::info!("  GET  /health          - Health check");
    tracing::info!("  GET  /api/info        - Model and context info");
    tracing::info!("  POST /api/ask         - Ask a question");
    tracing::info!("  GET  /api/ask/stream  - WebSocket streaming");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
