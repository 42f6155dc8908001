//! Health tracking for the migration server
//!
//! Components report their status here; the HTTP API turns the aggregate
//! into liveness and readiness answers.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Consecutive dispatch failures before the dispatcher is reported degraded
pub const DISPATCH_FAILURES_BEFORE_DEGRADED: u32 = 3;

/// Consecutive accept failures before the listener is reported degraded
pub const ACCEPT_FAILURES_BEFORE_DEGRADED: u32 = 5;

/// Health status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    /// Component is functioning normally
    Healthy,
    /// Still serving, but something needs attention
    Degraded,
    /// Component has failed or stopped
    Unhealthy,
}

impl ComponentStatus {
    /// Healthy and degraded components still count toward readiness
    pub fn is_operational(&self) -> bool {
        matches!(self, ComponentStatus::Healthy | ComponentStatus::Degraded)
    }
}

/// Last reported health of one component
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    /// Why the component is not healthy
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix seconds of the last status change
    pub last_check_timestamp: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            last_check_timestamp: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Body of the liveness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub components: HashMap<String, ComponentHealth>,
}

impl HealthResponse {
    /// Worst status across all components
    pub fn compute_status(components: &HashMap<String, ComponentHealth>) -> ComponentStatus {
        components
            .values()
            .map(|h| h.status)
            .fold(ComponentStatus::Healthy, |worst, status| match (worst, status) {
                (ComponentStatus::Unhealthy, _) | (_, ComponentStatus::Unhealthy) => {
                    ComponentStatus::Unhealthy
                }
                (ComponentStatus::Degraded, _) | (_, ComponentStatus::Degraded) => {
                    ComponentStatus::Degraded
                }
                _ => ComponentStatus::Healthy,
            })
    }
}

/// Body of the readiness endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Component names for health tracking
pub mod components {
    /// Prediction accept loop
    pub const LISTENER: &str = "listener";
    /// Outbound migration commands
    pub const DISPATCHER: &str = "dispatcher";
}

/// Registry of component health plus the server's readiness flag
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    components: Arc<RwLock<HashMap<String, ComponentHealth>>>,
    ready: Arc<RwLock<bool>>,
    dispatch_failures: Arc<AtomicU32>,
    accept_failures: Arc<AtomicU32>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            components: Arc::new(RwLock::new(HashMap::new())),
            ready: Arc::new(RwLock::new(false)),
            dispatch_failures: Arc::new(AtomicU32::new(0)),
            accept_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    /// Register a component as healthy
    pub async fn register(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    /// Replace a component's health
    pub async fn update(&self, name: &str, health: ComponentHealth) {
        self.components
            .write()
            .await
            .insert(name.to_string(), health);
    }

    /// Mark component as healthy
    pub async fn set_healthy(&self, name: &str) {
        self.update(name, ComponentHealth::healthy()).await;
    }

    /// Mark component as degraded with a reason
    pub async fn set_degraded(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::degraded(message)).await;
    }

    /// Mark component as unhealthy with a reason
    pub async fn set_unhealthy(&self, name: &str, message: impl Into<String>) {
        self.update(name, ComponentHealth::unhealthy(message)).await;
    }

    /// Set when the server starts and cleared on shutdown
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Track dispatcher outcomes; repeated failures degrade the dispatcher
    pub async fn record_dispatch_outcome(&self, success: bool) {
        self.record_outcome(
            components::DISPATCHER,
            &self.dispatch_failures,
            DISPATCH_FAILURES_BEFORE_DEGRADED,
            success,
            "migrations failed",
        )
        .await;
    }

    /// Track accept results; repeated failures degrade the listener
    pub async fn record_accept_outcome(&self, success: bool) {
        self.record_outcome(
            components::LISTENER,
            &self.accept_failures,
            ACCEPT_FAILURES_BEFORE_DEGRADED,
            success,
            "accepts failed",
        )
        .await;
    }

    async fn record_outcome(
        &self,
        name: &str,
        failures: &AtomicU32,
        limit: u32,
        success: bool,
        what: &str,
    ) {
        if success {
            if failures.swap(0, Ordering::SeqCst) >= limit {
                self.set_healthy(name).await;
            }
            return;
        }

        let count = failures.fetch_add(1, Ordering::SeqCst) + 1;
        if count >= limit {
            self.set_degraded(name, format!("{} consecutive {}", count, what))
                .await;
        }
    }

    /// Overall status plus every component's last report
    pub async fn health(&self) -> HealthResponse {
        let components = self.components.read().await.clone();
        let status = HealthResponse::compute_status(&components);
        HealthResponse { status, components }
    }

    /// Ready once started, as long as no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let ready = *self.ready.read().await;
        let health = self.health().await;

        let reason = if !ready {
            Some("Server not yet listening".to_string())
        } else if !health.status.is_operational() {
            Some("Critical component unhealthy".to_string())
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}
