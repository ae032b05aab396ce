//! Kanxa Web - HTTP front for booking notification emails.
//!
//! This binary provides a thin web server that:
//! - Accepts email notification requests from the booking backend
//! - Hands each one to a freshly spawned `kanxa-mail-worker`
//! - Either waits for the worker's result or returns immediately
//!
//! All SMTP work happens in the worker processes.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use kanxa::web::{router, AppState};
use kanxa::{Config, Dispatcher};

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the environment may already be set.
    let _ = dotenvy::dotenv();

    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        worker_program = %config.worker_program.display(),
        worker_timeout_ms = ?config.worker_timeout_ms,
        worker_concurrency = config.worker_concurrency,
        smtp_host = %config.smtp.host,
        smtp_port = config.smtp.port,
        smtp_secure = config.smtp.secure,
        smtp_credentials_configured = config.smtp.user.is_some() && config.smtp.password.is_some(),
        "config_loaded"
    );

    if !config.worker_program.exists() {
        tracing::warn!(
            worker_program = %config.worker_program.display(),
            "worker_program_not_found"
        );
    }

    let dispatcher = Dispatcher::from_config(&config);
    let state = AppState::new(config.clone(), dispatcher);
    let app = router(state);

    // Bind to address
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "ctrl_c_handler_failed");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "sigterm_handler_failed");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
