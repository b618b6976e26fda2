//! Parley signaling server.
//!
//! Serves three surfaces from one listener:
//! - `/ws` - the duplex signaling channel (join, relay, liveness)
//! - `/api/admin/*` - shared-secret room administration
//! - `/health` - liveness plus live session counters
//!
//! # Startup Flow
//!
//! 1. Initialize tracing
//! 2. Load configuration from environment
//! 3. Open the room registry (SQLite) and bootstrap the schema
//! 4. Start the session controller actor
//! 5. Bind the listener, then serve until Ctrl+C/SIGTERM
//! 6. On shutdown, cancel the controller so every room closes its channels

#![warn(clippy::pedantic)]

use signal_service::actors::{SessionControllerHandle, SessionMetrics};
use signal_service::config::Config;
use signal_service::registry::RoomRegistry;
use signal_service::{app, AppState};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signal_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Parley signaling server");

    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        bind_address = %config.bind_address,
        database_path = %config.database_path,
        stun_urls = config.stun_urls.len(),
        turn_configured = config.turn_url.is_some(),
        heartbeat_interval_secs = config.heartbeat_interval.as_secs(),
        "Configuration loaded successfully"
    );

    let registry = RoomRegistry::connect(&config.database_path)
        .await
        .map_err(|e| {
            error!(error = %e, "Failed to open room registry");
            e
        })?;

    let metrics = SessionMetrics::new();
    let controller = SessionControllerHandle::new(
        registry.clone(),
        config.relay_config(),
        Arc::clone(&metrics),
    );
    info!("Session controller started");

    let state = Arc::new(AppState {
        controller: controller.clone(),
        registry,
        metrics,
        admin_code: config.admin_code.clone(),
        heartbeat_interval: config.heartbeat_interval,
    });

    // Bind before serving to fail fast on bind errors.
    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %config.bind_address, "Failed to bind listener");
            e
        })?;
    info!(addr = %config.bind_address, "Listener bound, serving");

    axum::serve(listener, app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Shutdown signal received, closing live sessions");
    controller.shutdown();

    // Give room actors a moment to close their channels cleanly.
    tokio::time::sleep(std::time::Duration::from_millis(500)).await;

    info!("Parley signaling server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. This is acceptable because
/// without signal handlers, we cannot gracefully shut down the service.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
