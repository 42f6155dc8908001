//! HTTP API for health checks, Prometheus metrics and policy state

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use anyhow::Context;
use prometheus::{Encoder, TextEncoder};
use server_lib::{
    health::{ComponentStatus, HealthRegistry},
    observability::ServerMetrics,
    state::StateStore,
};
use std::sync::Arc;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ServerMetrics,
    pub store: Arc<StateStore>,
}

impl AppState {
    pub fn new(health_registry: HealthRegistry, metrics: ServerMetrics, store: Arc<StateStore>) -> Self {
        Self {
            health_registry,
            metrics,
            store,
        }
    }
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still accepting predictions
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    state.metrics.set_containers_tracked(state.store.len());

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn list_containers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.snapshots())
}

async fn get_container(
    State(state): State<Arc<AppState>>,
    Path(container_id): Path<String>,
) -> Response {
    match state.store.snapshot(&container_id) {
        Some(snapshot) => Json(snapshot).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({
                "error": format!("container {} is not tracked", container_id)
            })),
        )
            .into_response(),
    }
}

async fn system_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.store.system_snapshot())
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/api/v1/containers", get(list_containers))
        .route("/api/v1/containers/:id", get(get_container))
        .route("/api/v1/system", get(system_state))
        .with_state(state)
}

/// Bind the API port; failure here is fatal for the server
pub async fn bind(port: u16) -> anyhow::Result<tokio::net::TcpListener> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind API server on {}", addr))?;
    info!(addr = %addr, "Starting API server");
    Ok(listener)
}

/// Serve the API on an already bound listener
pub async fn serve(listener: tokio::net::TcpListener, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);
    axum::serve(listener, app).await?;

    Ok(())
}
