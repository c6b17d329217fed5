//! # Beacon Hub Server
//!
//! The hub binary: WebSocket sessions, HTTP catch-up/publish, presence,
//! and housekeeping over the shared event log.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Hub Server                                     │
//! │                                                                         │
//! │  Devices ──► /sync (WebSocket) ──► presence + live fan-out             │
//! │          ──► /workspaces/{id}/events (HTTP) ──► catch-up / publish     │
//! │                                  │                                      │
//! │                                  ▼                                      │
//! │              SQLite event log ◄──► Broker (Redis or in-process)        │
//! │                                                                         │
//! │  Background: presence sweeps, consumed marking, retention              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod api;
mod auth;
mod config;
mod error;
mod state;
mod tasks;
mod ws;

use std::net::SocketAddr;

use axum::{routing::get, Router};
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use beacon_db::{Database, DbConfig};
use beacon_sync::BrokerSelector;

use crate::config::HubConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    info!("Starting Beacon hub server");

    let config = HubConfig::load()?;
    info!(
        port = config.port,
        db_path = %config.database_path,
        broker_mode = %config.sync.broker_mode(),
        "Configuration loaded"
    );

    // Database first: a hub without its log is not a hub
    let db = Database::new(DbConfig::new(&config.database_path)).await?;
    info!("Event log ready");

    // Resolve the broker once; the choice is sticky until restart
    let broker = BrokerSelector::new(&config.sync).resolve().await?;

    let state = AppState::new(db, broker, config);

    tasks::spawn_all(state.clone());

    let app = Router::new()
        .route("/sync", get(ws::ws_handler))
        .route("/health", get(api::health))
        .route(
            "/workspaces/{workspace_id}/events",
            get(api::catch_up).post(api::publish),
        )
        .with_state(state.clone());

    let bind_addr = state.config.bind_address();
    let listener = TcpListener::bind(&bind_addr).await?;
    info!(addr = %bind_addr, "Hub server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, starting graceful shutdown");
}
