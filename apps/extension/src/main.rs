mod background;
mod config;
mod cover_letter;
mod errors;
mod llm_client;
mod messaging;
mod popup;
mod resume;
mod routes;
mod runtime;
mod selection;
mod state;
mod storage;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::runtime::ExtensionRuntime;
use crate::state::AppState;
use crate::storage::{ExtensionStore, FileStorage};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!(
                "{}={}",
                env!("CARGO_PKG_NAME").replace('-', "_"),
                &config.rust_log
            ))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting cover letter extension v{}", env!("CARGO_PKG_VERSION"));

    // Storage
    let backend = FileStorage::at_path(&config.storage_path);
    info!("Storage at {}", backend.path().display());
    let store = ExtensionStore::new(Arc::new(backend));
    if let Some(api_key) = &config.gemini_api_key {
        if store.api_key().await?.is_none() {
            store.save_api_key(api_key).await?;
            info!("Seeded Gemini API key from environment");
        }
    }

    // LLM client
    let llm = LlmClient::new(
        config.gemini_api_base.clone(),
        config.gemini_model.clone(),
        config.llm_timeout,
    )?;
    match config.llm_timeout {
        Some(timeout) => info!(
            "LLM client initialized (model: {}, timeout: {timeout:?})",
            llm.model()
        ),
        None => info!("LLM client initialized (model: {}, no timeout)", llm.model()),
    }

    // Extension contexts
    let runtime = ExtensionRuntime::start(store, Arc::new(llm)).await;

    let state = AppState {
        config: config.clone(),
        runtime: Arc::new(runtime),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
