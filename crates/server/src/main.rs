//! Migration server - live container migration decision engine
//!
//! Receives resource predictions from node agents and triggers container
//! migrations when sustained overload is predicted.

use anyhow::{Context, Result};
use server_lib::{
    dispatcher::{DryRunDispatcher, MigrationDispatcher, RemoteDispatcher},
    health::{components, HealthRegistry},
    observability::{ServerMetrics, StructuredLogger},
    selector::RoundRobinSelector,
    MigrationEngine, PredictionListener, StateStore,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod api;
mod config;

const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting migration-server");

    let config = config::ServerConfig::load()?;
    info!(
        server_id = %config.server_id,
        migrate_enabled = config.migrate_enabled,
        immovable = ?config.immovable_containers,
        dry_run = config.dry_run,
        "Server configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::LISTENER).await;
    health_registry.register(components::DISPATCHER).await;

    let metrics = ServerMetrics::new();
    let logger = StructuredLogger::new(&config.server_id);

    let engine_config = config.engine_config();
    let store = Arc::new(StateStore::from_policy(&engine_config.policy));

    let dispatcher: Arc<dyn MigrationDispatcher> = if config.dry_run {
        Arc::new(DryRunDispatcher)
    } else {
        Arc::new(RemoteDispatcher::new(config.agent_port, config.dispatch_timeout()))
    };

    if config.destination_hosts.is_empty() {
        warn!("No destination hosts configured, migration triggers will be skipped");
    }
    let selector = Arc::new(RoundRobinSelector::new(config.destination_hosts.clone()));

    let engine = Arc::new(
        MigrationEngine::builder()
            .config(engine_config)
            .store(store.clone())
            .dispatcher(dispatcher)
            .selector(selector)
            .logger(logger.clone())
            .health(health_registry.clone())
            .build()?,
    );

    // Bind failure is fatal
    let listen_addr = SocketAddr::from(([0, 0, 0, 0], config.listen_port));
    let listener = PredictionListener::bind(listen_addr)
        .await
        .context("Server failed to start")?;
    logger.log_startup(
        SERVER_VERSION,
        &listener.local_addr().to_string(),
        config.migrate_enabled,
    );

    let api_listener = api::bind(config.api_port)
        .await
        .context("API server failed to start")?;

    let (shutdown_tx, _) = broadcast::channel(1);
    let listener_handle = tokio::spawn(listener.run(engine.clone(), shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        store.clone(),
    ));
    let api_handle = tokio::spawn(async move {
        if let Err(e) = api::serve(api_listener, app_state).await {
            error!(error = %e, "API server stopped");
        }
    });

    health_registry.set_ready(true).await;

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    listener_handle.await?;
    api_handle.abort();
    info!("Shutting down");

    Ok(())
}
