//! Migration server library
//!
//! This crate provides the core functionality for:
//! - Receiving container resource predictions over TCP
//! - Deciding when a container should be migrated (thresholds, tolerance, cooldown)
//! - Tracking per-container policy state under concurrent updates
//! - Dispatching migration directives
//! - Health checks and observability

pub mod clock;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod health;
pub mod models;
pub mod observability;
pub mod policy;
pub mod protocol;
pub mod selector;
pub mod state;

pub use engine::{DecisionOutcome, EngineConfig, MigrationEngine, PredictionListener};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ServerMetrics, StructuredLogger};
pub use policy::{SkipReason, Verdict};
pub use state::StateStore;
