mod config;
mod enhance;
mod errors;
mod llm_client;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::enhance::batch::BATCH_ITEM_DELAY;
use crate::llm_client::{GeminiAdapter, OpenRouterAdapter, Orchestrator, Provider, ProviderAdapter};
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting resume AI API v{}", env!("CARGO_PKG_VERSION"));

    let orchestrator = build_orchestrator(&config)?;
    match orchestrator.models() {
        Ok(models) => {
            for model in &models {
                info!(
                    priority = model.priority,
                    provider = %model.provider,
                    model = %model.model_id,
                    "LLM chain entry"
                );
            }
        }
        // Not fatal at startup: every AI request will report the misconfiguration.
        Err(e) => warn!("LLM chain is unusable: {e}"),
    }

    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        batch_item_delay: BATCH_ITEM_DELAY,
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins to the SPA host once it has a fixed domain

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Wires the model registry to the adapters allowed in this deployment.
/// Credentials are handed over as-is; a missing key fails on first use, not here.
fn build_orchestrator(config: &Config) -> Result<Orchestrator> {
    let registry = config.model_registry()?;

    let mut adapters: Vec<Arc<dyn ProviderAdapter>> = Vec::new();
    if config.provider_allowed(Provider::Gemini) {
        adapters.push(Arc::new(GeminiAdapter::new(
            config.gemini_api_key.clone(),
            config.gemini_api_base.clone(),
        )));
    }
    if config.provider_allowed(Provider::OpenRouter) {
        adapters.push(Arc::new(OpenRouterAdapter::new(
            config.openrouter_api_key.clone(),
            config.openrouter_api_base.clone(),
        )));
    }

    let mut orchestrator =
        Orchestrator::new(registry, adapters).with_retry_policy(config.retry_policy);
    if let Some(deadline) = config.chain_deadline {
        orchestrator = orchestrator.with_deadline(deadline);
    }
    Ok(orchestrator)
}
