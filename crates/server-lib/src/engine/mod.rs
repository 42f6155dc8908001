//! Prediction processing engine
//!
//! Ties the state store, decision policy and dispatcher together. Each
//! connection runs in two phases:
//! - handshake: decode the prediction, acknowledge it, close the connection
//! - decision: evaluate the policy and, if warranted, dispatch a migration
//!
//! The prediction client is released before the decision phase starts and
//! never learns the migration outcome.

mod handler;
mod listener;


pub use handler::{handshake, HandshakeError};
pub use listener::{PredictionListener, DEFAULT_PREDICTION_PORT};

use crate::clock::{Clock, SystemClock};
use crate::dispatcher::MigrationDispatcher;
use crate::error::DispatchError;
use crate::health::HealthRegistry;
use crate::models::{MigrationDirective, PolicyConfig, PredictionMessage};
use crate::observability::{ServerMetrics, StructuredLogger};
use crate::policy::{self, SkipReason, Verdict};
use crate::selector::DestinationSelector;
use crate::state::StateStore;
use anyhow::Result;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Runtime options for the engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub policy: PolicyConfig,
    /// When false, connections are accepted and dropped without processing
    pub migrate_enabled: bool,
    /// Upper bound on reading the prediction and writing the ack
    pub handshake_timeout: Duration,
    /// Allow only one dispatch at a time across all containers
    pub exclusive_dispatch: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            policy: PolicyConfig::default(),
            migrate_enabled: true,
            handshake_timeout: Duration::from_secs(10),
            exclusive_dispatch: false,
        }
    }
}

/// Result of the decision phase for one prediction
#[derive(Debug)]
pub enum DecisionOutcome {
    Skipped(SkipReason),
    Migrated(MigrationDirective),
    MigrationFailed {
        directive: MigrationDirective,
        error: DispatchError,
    },
}

impl DecisionOutcome {
    pub fn migrated(&self) -> bool {
        matches!(self, DecisionOutcome::Migrated(_))
    }
}

/// Shared engine used by every connection handler
pub struct MigrationEngine {
    config: EngineConfig,
    store: Arc<StateStore>,
    dispatcher: Arc<dyn MigrationDispatcher>,
    selector: Arc<dyn DestinationSelector>,
    clock: Arc<dyn Clock>,
    metrics: ServerMetrics,
    logger: StructuredLogger,
    health: HealthRegistry,
    dispatch_gate: Option<Semaphore>,
}

impl MigrationEngine {
    pub fn builder() -> MigrationEngineBuilder {
        MigrationEngineBuilder::new()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    pub fn health(&self) -> &HealthRegistry {
        &self.health
    }

    pub fn metrics(&self) -> &ServerMetrics {
        &self.metrics
    }

    pub fn migrate_enabled(&self) -> bool {
        self.config.migrate_enabled
    }

    /// Decision phase: evaluate the policy and dispatch when it says so
    pub async fn process(&self, prediction: &PredictionMessage) -> DecisionOutcome {
        let started = Instant::now();
        let verdict = policy::evaluate(
            prediction,
            &self.config.policy,
            &self.store,
            self.selector.as_ref(),
        );
        self.metrics
            .record_decision(&verdict, started.elapsed().as_secs_f64());
        self.metrics.set_containers_tracked(self.store.len());
        self.logger.log_decision(prediction, &verdict);

        match verdict {
            Verdict::Skip(reason) => DecisionOutcome::Skipped(reason),
            Verdict::Migrate(directive) => self.migrate(directive).await,
        }
    }

    async fn migrate(&self, directive: MigrationDirective) -> DecisionOutcome {
        // Dropped last: the pending mark outlives the success bookkeeping below
        let _pending = PendingDispatch {
            store: &self.store,
            container_id: directive.container_id.clone(),
        };

        let _permit = match &self.dispatch_gate {
            Some(gate) => gate.acquire().await.ok(),
            None => None,
        };

        let started = Instant::now();
        let result = {
            let _in_progress = self.store.begin_migration();
            self.metrics.dispatch_started();
            let result = self.dispatcher.dispatch(&directive).await;
            self.metrics.dispatch_finished();
            result
        };
        let elapsed = started.elapsed();

        self.metrics
            .record_dispatch(result.is_ok(), elapsed.as_secs_f64());
        self.health.record_dispatch_outcome(result.is_ok()).await;

        match result {
            Ok(()) => {
                self.store
                    .record_migration(&directive.container_id, self.clock.now());
                self.store.reset_false_positives(&directive.container_id);
                self.logger
                    .log_migration_result(&directive, None, elapsed.as_millis());
                DecisionOutcome::Migrated(directive)
            }
            Err(error) => {
                let cause: &dyn std::error::Error = &error;
                self.logger
                    .log_migration_result(&directive, Some(cause), elapsed.as_millis());
                DecisionOutcome::MigrationFailed { directive, error }
            }
        }
    }
}

/// Clears the container's dispatch-pending mark when dropped
struct PendingDispatch<'a> {
    store: &'a StateStore,
    container_id: String,
}

impl Drop for PendingDispatch<'_> {
    fn drop(&mut self) {
        self.store.complete_dispatch(&self.container_id);
    }
}

/// Builder for the migration engine
pub struct MigrationEngineBuilder {
    config: EngineConfig,
    store: Option<Arc<StateStore>>,
    dispatcher: Option<Arc<dyn MigrationDispatcher>>,
    selector: Option<Arc<dyn DestinationSelector>>,
    clock: Arc<dyn Clock>,
    logger: Option<StructuredLogger>,
    health: Option<HealthRegistry>,
}

impl MigrationEngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            store: None,
            dispatcher: None,
            selector: None,
            clock: Arc::new(SystemClock),
            logger: None,
            health: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn policy(mut self, policy: PolicyConfig) -> Self {
        self.config.policy = policy;
        self
    }

    /// Share an existing store; by default one is built from the policy
    ///
    /// The store must carry the policy's immovable set.
    pub fn store(mut self, store: Arc<StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn dispatcher(mut self, dispatcher: Arc<dyn MigrationDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn selector(mut self, selector: Arc<dyn DestinationSelector>) -> Self {
        self.selector = Some(selector);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn logger(mut self, logger: StructuredLogger) -> Self {
        self.logger = Some(logger);
        self
    }

    pub fn health(mut self, health: HealthRegistry) -> Self {
        self.health = Some(health);
        self
    }

    pub fn build(self) -> Result<MigrationEngine> {
        let dispatcher = self
            .dispatcher
            .ok_or_else(|| anyhow::anyhow!("Dispatcher is required"))?;
        let selector = self
            .selector
            .ok_or_else(|| anyhow::anyhow!("Destination selector is required"))?;

        let store = match self.store {
            Some(store) => {
                anyhow::ensure!(
                    store.immovable_containers() == &self.config.policy.immovable_containers,
                    "State store immovable set does not match the policy"
                );
                store
            }
            None => Arc::new(StateStore::from_policy(&self.config.policy)),
        };
        let dispatch_gate = self.config.exclusive_dispatch.then(|| Semaphore::new(1));

        Ok(MigrationEngine {
            config: self.config,
            store,
            dispatcher,
            selector,
            clock: self.clock,
            metrics: ServerMetrics::new(),
            logger: self
                .logger
                .unwrap_or_else(|| StructuredLogger::new("migration-server")),
            health: self.health.unwrap_or_default(),
            dispatch_gate,
        })
    }
}

impl Default for MigrationEngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}
