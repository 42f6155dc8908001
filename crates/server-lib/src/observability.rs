//! Observability infrastructure for the migration server
//!
//! Provides:
//! - Prometheus metrics (predictions, decisions, dispatch outcomes and latency)
//! - Structured JSON logging with tracing

use crate::models::{MigrationDirective, PredictionMessage};
use crate::policy::Verdict;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{debug, info, warn};

/// Histogram buckets for decision latency (in seconds)
const DECISION_BUCKETS: &[f64] = &[
    0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05,
];

/// Histogram buckets for dispatch latency (in seconds); migrations take a while
const DISPATCH_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 120.0, 300.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ServerMetricsInner> = OnceLock::new();

struct ServerMetricsInner {
    connections_accepted: IntCounter,
    connections_ignored: IntCounter,
    predictions_received: IntCounter,
    decode_errors: IntCounter,
    ack_errors: IntCounter,
    decisions: IntCounterVec,
    migrations_succeeded: IntCounter,
    migrations_failed: IntCounter,
    migration_in_progress: IntGauge,
    containers_tracked: IntGauge,
    decision_latency_seconds: Histogram,
    dispatch_latency_seconds: Histogram,
}

impl ServerMetricsInner {
    fn new() -> Self {
        Self {
            connections_accepted: register_int_counter!(
                "migration_server_connections_accepted_total",
                "Prediction connections accepted by the listener"
            )
            .expect("Failed to register connections_accepted"),

            connections_ignored: register_int_counter!(
                "migration_server_connections_ignored_total",
                "Connections dropped because migration processing is disabled"
            )
            .expect("Failed to register connections_ignored"),

            predictions_received: register_int_counter!(
                "migration_server_predictions_received_total",
                "Prediction messages decoded and acknowledged"
            )
            .expect("Failed to register predictions_received"),

            decode_errors: register_int_counter!(
                "migration_server_decode_errors_total",
                "Connections aborted because the prediction could not be decoded"
            )
            .expect("Failed to register decode_errors"),

            ack_errors: register_int_counter!(
                "migration_server_ack_errors_total",
                "Connections aborted because the acknowledgment could not be sent"
            )
            .expect("Failed to register ack_errors"),

            decisions: register_int_counter_vec!(
                "migration_server_decisions_total",
                "Policy decisions by outcome",
                &["outcome"]
            )
            .expect("Failed to register decisions"),

            migrations_succeeded: register_int_counter!(
                "migration_server_migrations_succeeded_total",
                "Migrations reported successful by the dispatcher"
            )
            .expect("Failed to register migrations_succeeded"),

            migrations_failed: register_int_counter!(
                "migration_server_migrations_failed_total",
                "Migrations reported failed by the dispatcher"
            )
            .expect("Failed to register migrations_failed"),

            migration_in_progress: register_int_gauge!(
                "migration_server_migrations_in_progress",
                "Migrations currently being dispatched"
            )
            .expect("Failed to register migration_in_progress"),

            containers_tracked: register_int_gauge!(
                "migration_server_containers_tracked",
                "Containers with policy state"
            )
            .expect("Failed to register containers_tracked"),

            decision_latency_seconds: register_histogram!(
                "migration_server_decision_latency_seconds",
                "Time spent evaluating the migration policy",
                DECISION_BUCKETS.to_vec()
            )
            .expect("Failed to register decision_latency_seconds"),

            dispatch_latency_seconds: register_histogram!(
                "migration_server_dispatch_latency_seconds",
                "Time spent waiting for the migration dispatcher",
                DISPATCH_BUCKETS.to_vec()
            )
            .expect("Failed to register dispatch_latency_seconds"),
        }
    }
}

/// Server metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct ServerMetrics {
    _private: (),
}

impl Default for ServerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ServerMetrics {
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ServerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ServerMetricsInner {
        GLOBAL_METRICS.get_or_init(ServerMetricsInner::new)
    }

    pub fn inc_connections_accepted(&self) {
        self.inner().connections_accepted.inc();
    }

    pub fn inc_connections_ignored(&self) {
        self.inner().connections_ignored.inc();
    }

    pub fn inc_predictions_received(&self) {
        self.inner().predictions_received.inc();
    }

    pub fn inc_decode_errors(&self) {
        self.inner().decode_errors.inc();
    }

    pub fn inc_ack_errors(&self) {
        self.inner().ack_errors.inc();
    }

    /// Count a policy decision under its outcome label
    pub fn record_decision(&self, verdict: &Verdict, latency_secs: f64) {
        self.inner()
            .decisions
            .with_label_values(&[verdict.label()])
            .inc();
        self.inner().decision_latency_seconds.observe(latency_secs);
    }

    pub fn record_dispatch(&self, success: bool, latency_secs: f64) {
        if success {
            self.inner().migrations_succeeded.inc();
        } else {
            self.inner().migrations_failed.inc();
        }
        self.inner().dispatch_latency_seconds.observe(latency_secs);
    }

    pub fn dispatch_started(&self) {
        self.inner().migration_in_progress.inc();
    }

    pub fn dispatch_finished(&self) {
        self.inner().migration_in_progress.dec();
    }

    pub fn set_containers_tracked(&self, count: usize) {
        self.inner().containers_tracked.set(count as i64);
    }
}

/// Structured logger for server events
#[derive(Clone)]
pub struct StructuredLogger {
    server_id: String,
}

impl StructuredLogger {
    pub fn new(server_id: impl Into<String>) -> Self {
        Self {
            server_id: server_id.into(),
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn log_prediction(&self, prediction: &PredictionMessage) {
        info!(
            event = "prediction_received",
            server = %self.server_id,
            container_id = %prediction.container_id,
            request_id = prediction.timestamp,
            "Prediction data received"
        );
        debug!(
            event = "prediction_content",
            container_id = %prediction.container_id,
            timestamp = prediction.timestamp,
            predicted_cpu = prediction.predicted_cpu,
            predicted_memory = prediction.predicted_memory,
            source_host = %prediction.source_host,
            "Prediction data content"
        );
    }

    pub fn log_decision(&self, prediction: &PredictionMessage, verdict: &Verdict) {
        match verdict {
            Verdict::Migrate(directive) => {
                info!(
                    event = "migration_decision",
                    server = %self.server_id,
                    container_id = %directive.container_id,
                    source_host = %directive.source_host,
                    destination_host = %directive.destination_host,
                    decision = "migrate",
                    "Migration needed"
                );
            }
            Verdict::Skip(reason) => {
                info!(
                    event = "migration_decision",
                    server = %self.server_id,
                    container_id = %prediction.container_id,
                    decision = "skip",
                    reason = reason.as_str(),
                    detail = ?reason,
                    "Migration not needed"
                );
            }
        }
    }

    pub fn log_migration_result(
        &self,
        directive: &MigrationDirective,
        error: Option<&dyn std::error::Error>,
        elapsed_ms: u128,
    ) {
        match error {
            None => info!(
                event = "migration_result",
                server = %self.server_id,
                container_id = %directive.container_id,
                destination_host = %directive.destination_host,
                success = true,
                elapsed_ms = elapsed_ms,
                "Migration was successful"
            ),
            Some(err) => warn!(
                event = "migration_result",
                server = %self.server_id,
                container_id = %directive.container_id,
                destination_host = %directive.destination_host,
                success = false,
                elapsed_ms = elapsed_ms,
                error = %err,
                "Migration was not successful"
            ),
        }
    }

    pub fn log_startup(&self, version: &str, listen_addr: &str, migrate_enabled: bool) {
        info!(
            event = "server_started",
            server = %self.server_id,
            version = %version,
            listen_addr = %listen_addr,
            migrate_enabled = migrate_enabled,
            "Migration server started"
        );
        if !migrate_enabled {
            warn!(
                event = "migration_disabled",
                server = %self.server_id,
                "Migration feature is disabled: set MIGRATION_MIGRATE_ENABLED=true to enable"
            );
        }
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "server_shutdown",
            server = %self.server_id,
            reason = %reason,
            "Migration server shutting down"
        );
    }
}
