//! Consultation Marketplace - API Server Binary
//!
//! # Usage
//!
//! ```bash
//! # Run against PostgreSQL
//! API_DATABASE_URL=postgres://... API_PROCESSOR_API_KEY=sk_test_... cargo run --bin marketplace-api
//!
//! # Run on the in-memory store
//! API_STORAGE_BACKEND=memory API_PROCESSOR_API_KEY=sk_test_... cargo run --bin marketplace-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` / `API_PORT` - Listen address (default: 0.0.0.0:8080)
//! * `API_JWT_SECRET` - JWT signing secret (required in production)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_STORAGE_BACKEND` - `postgres` (default) or `memory`
//! * `API_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `API_JSON_LOGS` - Emit JSON log lines
//! * `API_COMMISSION_RATE` / `API_VAT_RATE` - Platform commission and VAT on it
//! * `API_WEBHOOK_SECRET` - Signing secret for processor callbacks
//! * `API_PROCESSOR_BASE_URL` / `API_PROCESSOR_API_KEY` - Payment processor

use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use core_kernel::SystemClock;
use infra_db::{create_pool, run_migrations, DatabaseConfig, InMemoryStore};
use infra_payments::{StripeConfig, StripeProcessor};
use interface_api::{
    config::{ApiConfig, StorageBackend},
    create_router,
    notifier::LoggingNotifier,
    AppState, Ports,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("invalid API_* configuration")?;

    init_tracing(&config.log_level, config.json_logs);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        backend = ?config.storage_backend,
        "Starting Consultation Marketplace API Server"
    );

    let ports = match config.storage_backend {
        StorageBackend::Postgres => {
            let pool = create_pool(DatabaseConfig::new(config.database_url.clone()))
                .await
                .context("database connection failed")?;
            run_migrations(&pool).await.context("database migration failed")?;
            Ports::postgres(pool)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using the in-memory store; all state is lost on shutdown");
            Ports::in_memory(InMemoryStore::new())
        }
    };

    let processor = StripeProcessor::new(
        StripeConfig::new(config.processor_base_url.clone(), config.processor_api_key.clone())
            .timeout(config.processor_timeout()),
    )
    .context("payment processor configuration")?;

    let addr: SocketAddr = config.server_addr().parse().context("invalid listen address")?;
    let state = AppState::new(
        config,
        ports,
        Arc::new(processor),
        Arc::new(LoggingNotifier),
        Arc::new(SystemClock),
    )
    .context("invalid billing configuration")?;

    let app = create_router(state);

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber; `RUST_LOG` wins over `log_level`
fn init_tracing(log_level: &str, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json().with_target(true)).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer().with_target(true)).init();
    }
}

/// Waits for Ctrl+C or SIGTERM so in-flight requests can finish
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
