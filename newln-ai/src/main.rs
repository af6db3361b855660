//! newln-ai - Study Material Generation Service
//!
//! Accepts text materials over HTTP, generates phrase and word lists through
//! the external generation service, and streams progress over SSE.

use anyhow::{Context, Result};
use clap::Parser;
use newln_ai::config::{resolve_gemini_api_key, use_mock_generation, CONFIG_PATH_ENV};
use newln_ai::db::{init_database_pool, SqliteMaterialStore};
use newln_ai::services::{
    GeminiBackend, GenerationBackend, GenerationClient, GenerationClientConfig, JobOrchestrator,
    MockBackend, OrchestratorConfig, ProgressBroadcaster, PromptSet,
};
use newln_ai::{build_router, AppState};
use newln_common::config::{load_or_default, resolve_config_path};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "newln-ai")]
#[command(about = "Study material generation service")]
#[command(version)]
struct Args {
    /// Path to configuration file (overrides NEWLN_CONFIG)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP port (overrides config)
    #[arg(short, long, env = "NEWLN_PORT")]
    port: Option<u16>,

    /// SQLite database file (overrides config)
    #[arg(short, long, env = "NEWLN_DATABASE")]
    database: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = resolve_config_path(args.config.as_deref(), CONFIG_PATH_ENV, "newln-ai");
    let config = load_or_default(config_path.as_deref()).context("Failed to load configuration")?;

    // Initialize tracing; RUST_LOG wins over the configured level
    let level = &config.logging.level;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!("newln_ai={level},newln_common={level},tower_http=info").into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting newln-ai v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Configuration: {}", path.display()),
        None => info!("Configuration: built-in defaults"),
    }

    // Database
    let db_path = args
        .database
        .clone()
        .unwrap_or_else(|| config.database.resolved_path());
    info!("Database: {}", db_path.display());
    let pool = init_database_pool(&db_path)
        .await
        .context("Failed to initialize database")?;
    let store = Arc::new(SqliteMaterialStore::new(pool));

    // Generation client
    let backend: Arc<dyn GenerationBackend> = if use_mock_generation(&config) {
        warn!("Mock generation enabled: responses are synthesized, no provider is called");
        Arc::new(MockBackend::default())
    } else {
        let api_key = resolve_gemini_api_key(&config)?;
        Arc::new(
            GeminiBackend::new(&config.generation, api_key)
                .context("Failed to build generation backend")?,
        )
    };
    let client = Arc::new(GenerationClient::new(
        backend,
        GenerationClientConfig::from_settings(&config.generation),
    ));
    info!(
        model = %config.generation.model,
        max_concurrent_calls = config.generation.max_concurrent_calls,
        max_attempts = config.generation.max_attempts,
        "Generation client ready"
    );

    let prompts = Arc::new(PromptSet::load(config.prompts_dir.as_deref())?);
    let broadcaster = ProgressBroadcaster::new(config.broadcaster.subscriber_queue_capacity);
    let orchestrator = Arc::new(JobOrchestrator::new(
        client.clone(),
        store.clone(),
        broadcaster.clone(),
        prompts,
        OrchestratorConfig::from(&config.orchestrator),
    ));

    let state = AppState::new(store, client, broadcaster, orchestrator);
    let app = build_router(state);

    let port = args.port.unwrap_or(config.server.port);
    let addr = format!("{}:{}", config.server.host, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
