//! # Khata API server
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  startup: config ──► SQLite pool ──► migrations ──► axum::serve         │
//! │  shutdown: Ctrl+C / SIGTERM ──► drain requests ──► close pool           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;

use khata_api::{app, ApiConfig, AppState};
use khata_db::{Database, DbConfig};
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,khata=debug")))
        .with_target(true)
        .init();

    info!("Starting Khata API server...");

    let config = ApiConfig::load()?;
    info!(
        port = config.http_port,
        database = %config.database_path,
        signup = config.allow_company_signup,
        "Configuration loaded"
    );
    if config.uses_dev_secret() {
        warn!("Using the development JWT secret; set KHATA_JWT_SECRET in production");
    }

    let db = Database::new(
        DbConfig::new(&config.database_path)
            .max_connections(config.db_max_connections)
            .run_migrations(true),
    )
    .await?;
    info!("Database ready");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.http_port));
    let state = AppState::new(db.clone(), config);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "Listening");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown...");
}
