//! Relay Server - Main entry point

use anyhow::Result;
use relay_common::logging::{init_logging, LogConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;

use relay_server::{
    api,
    config::Config,
    features::{
        imports::{BatchEngine, RateLimiter},
        FeatureState,
    },
    storage::{MemoryStore, StateStore},
    transport::AggregateClient,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging with configuration from environment
    let log_config = LogConfig::from_env()?
        .with_default_filter("relay_server=debug,tower_http=info");
    init_logging(&log_config)?;

    info!("Starting Import Relay");

    // Load configuration
    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    // Initialize the state store
    let store: Arc<dyn StateStore> = Arc::new(MemoryStore::new());
    info!("State store initialized");

    // Build the authenticated backend transport
    let backend = AggregateClient::new(&config.backend)?;
    info!(url = %backend.import_url(), "Backend transport initialized");

    // Assemble the pipeline state
    let engine = Arc::new(BatchEngine::new(
        store.clone(),
        backend,
        config.import.clone(),
    ));
    let limiter = RateLimiter::new(store.clone(), config.rate_limit.clone());
    let state = FeatureState {
        store,
        engine,
        limiter,
        config: config.import.clone(),
    };

    // Build the application router
    let app = api::create_router(state, &config);

    // Create socket address
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Start server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    // Give in-flight requests and detached engine runs a moment to settle
    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
