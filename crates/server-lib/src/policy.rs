//! Migration decision policy
//!
//! Decides whether a prediction warrants moving its container. A container is
//! skipped when it is immovable or still cooling down from its last
//! migration. Otherwise every overloaded resource bumps its false-positive
//! counter, and a migration is ordered once a counter strictly exceeds its
//! tolerance.
//!
//! The cooldown check, the increments and the tolerance comparison run under
//! the container's lock, so concurrent samples for one container are totally
//! ordered and a tolerance crossing yields a single migrate verdict.

use crate::models::{MigrationDirective, PolicyConfig, PredictionMessage, ResourceKind};
use crate::selector::DestinationSelector;
use crate::state::StateStore;

/// Why a prediction did not lead to a migration
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Container is on the immovable list
    Immovable,
    /// Container migrated too recently
    Cooldown { remaining_secs: i64 },
    /// No resource reached its threshold
    WithinCapacity,
    /// Breach observed but still within tolerance
    Tolerated { cpu_count: u32, memory_count: u32 },
    /// A migration for this container is already being dispatched
    DispatchPending,
    /// The selector had no host to offer
    NoDestination,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::Immovable => "immovable",
            SkipReason::Cooldown { .. } => "cooldown",
            SkipReason::WithinCapacity => "within_capacity",
            SkipReason::Tolerated { .. } => "tolerated",
            SkipReason::DispatchPending => "dispatch_pending",
            SkipReason::NoDestination => "no_destination",
        }
    }
}

/// Outcome of evaluating one prediction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Migrate(MigrationDirective),
    Skip(SkipReason),
}

impl Verdict {
    pub fn should_migrate(&self) -> bool {
        matches!(self, Verdict::Migrate(_))
    }

    pub fn directive(&self) -> Option<&MigrationDirective> {
        match self {
            Verdict::Migrate(directive) => Some(directive),
            Verdict::Skip(_) => None,
        }
    }

    /// The verdict as a `(should_migrate, directive)` pair
    pub fn into_parts(self) -> (bool, Option<MigrationDirective>) {
        match self {
            Verdict::Migrate(directive) => (true, Some(directive)),
            Verdict::Skip(_) => (false, None),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Migrate(_) => "migrate",
            Verdict::Skip(reason) => reason.as_str(),
        }
    }
}

/// Evaluate a prediction against the policy, updating the container's counters
///
/// A migrate verdict marks the container as dispatch-pending; the caller must
/// clear the mark with [`StateStore::complete_dispatch`] once the dispatch
/// attempt finishes, whatever its outcome.
pub fn evaluate(
    prediction: &PredictionMessage,
    config: &PolicyConfig,
    store: &StateStore,
    selector: &dyn DestinationSelector,
) -> Verdict {
    if store.is_immovable(&prediction.container_id) {
        return Verdict::Skip(SkipReason::Immovable);
    }

    store.update(&prediction.container_id, |state| {
        state.predictions_seen += 1;
        state.last_prediction_timestamp = Some(
            state
                .last_prediction_timestamp
                .map_or(prediction.timestamp, |ts| ts.max(prediction.timestamp)),
        );

        if let Some(remaining_secs) =
            state.cooldown_remaining(prediction.timestamp, config.thrashing_threshold_secs)
        {
            return Verdict::Skip(SkipReason::Cooldown { remaining_secs });
        }

        let observations = [
            (ResourceKind::Cpu, prediction.predicted_cpu),
            (ResourceKind::Memory, prediction.predicted_memory),
        ];

        let mut any_overloaded = false;
        let mut breached = false;
        for (kind, predicted) in observations {
            if predicted >= config.threshold(kind) {
                any_overloaded = true;
                if state.increment(kind) > config.tolerance(kind) {
                    breached = true;
                }
            } else if config.decay_on_healthy {
                state.decay(kind);
            }
        }

        if !any_overloaded {
            return Verdict::Skip(SkipReason::WithinCapacity);
        }
        if !breached {
            return Verdict::Skip(SkipReason::Tolerated {
                cpu_count: state.cpu_false_positive_count,
                memory_count: state.memory_false_positive_count,
            });
        }
        if state.dispatch_pending {
            return Verdict::Skip(SkipReason::DispatchPending);
        }

        match selector.select(prediction) {
            Some(destination_host) => {
                state.dispatch_pending = true;
                Verdict::Migrate(MigrationDirective {
                    container_id: prediction.container_id.clone(),
                    source_host: prediction.source_host.clone(),
                    destination_host,
                })
            }
            None => Verdict::Skip(SkipReason::NoDestination),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::RoundRobinSelector;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier};

    fn config(tolerance: u32) -> PolicyConfig {
        PolicyConfig {
            thrashing_threshold_secs: 300,
            cpu_false_positive_tolerance: tolerance,
            memory_false_positive_tolerance: tolerance,
            cpu_threshold: 0.8,
            memory_threshold: 0.8,
            ..Default::default()
        }
        .with_immovable(["mysql1"])
    }

    fn prediction(id: &str, timestamp: i64, cpu: f64, memory: f64) -> PredictionMessage {
        PredictionMessage {
            container_id: id.to_string(),
            timestamp,
            predicted_cpu: cpu,
            predicted_memory: memory,
            source_host: "node-a".to_string(),
        }
    }

    fn selector() -> RoundRobinSelector {
        RoundRobinSelector::new(["node-a", "node-b"])
    }

    #[test]
    fn test_immovable_never_migrates() {
        let config = config(0);
        let store = StateStore::from_policy(&config);

        for ts in 0..10 {
            let verdict = evaluate(&prediction("mysql1", ts, 10.0, 10.0), &config, &store, &selector());
            assert_eq!(verdict, Verdict::Skip(SkipReason::Immovable));
        }
        assert!(store.snapshot("mysql1").is_none());
    }

    #[test]
    fn test_two_tolerated_then_migrate() {
        let config = config(2);
        let store = StateStore::from_policy(&config);
        let selector = selector();

        let first = evaluate(&prediction("c1", 1, 0.9, 0.1), &config, &store, &selector);
        let second = evaluate(&prediction("c1", 2, 0.9, 0.1), &config, &store, &selector);
        let third = evaluate(&prediction("c1", 3, 0.9, 0.1), &config, &store, &selector);

        assert_eq!(
            first,
            Verdict::Skip(SkipReason::Tolerated {
                cpu_count: 1,
                memory_count: 0
            })
        );
        assert!(!second.should_migrate());
        assert_eq!(
            third,
            Verdict::Migrate(MigrationDirective {
                container_id: "c1".to_string(),
                source_host: "node-a".to_string(),
                destination_host: "node-b".to_string(),
            })
        );
    }

    #[test]
    fn test_migrate_requires_strictly_exceeding_tolerance() {
        let config = config(3);
        let store = StateStore::from_policy(&config);
        let selector = selector();

        for ts in 1..=3 {
            let verdict = evaluate(&prediction("c1", ts, 0.95, 0.1), &config, &store, &selector);
            assert!(!verdict.should_migrate(), "sample {} should be tolerated", ts);
        }
        let fourth = evaluate(&prediction("c1", 4, 0.95, 0.1), &config, &store, &selector);
        assert!(fourth.should_migrate());
        assert_eq!(store.snapshot("c1").unwrap().cpu_false_positive_count, 4);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let config = config(0);
        let store = StateStore::from_policy(&config);

        let verdict = evaluate(&prediction("c1", 1, 0.8, 0.0), &config, &store, &selector());
        assert!(verdict.should_migrate());
    }

    #[test]
    fn test_memory_breach_alone_migrates() {
        let config = config(1);
        let store = StateStore::from_policy(&config);
        let selector = selector();

        evaluate(&prediction("c1", 1, 0.1, 0.85), &config, &store, &selector);
        let verdict = evaluate(&prediction("c1", 2, 0.1, 0.85), &config, &store, &selector);

        assert!(verdict.should_migrate());
        let snapshot = store.snapshot("c1").unwrap();
        assert_eq!(snapshot.cpu_false_positive_count, 0);
        assert_eq!(snapshot.memory_false_positive_count, 2);
    }

    #[test]
    fn test_healthy_sample_leaves_counters() {
        let config = config(3);
        let store = StateStore::from_policy(&config);
        let selector = selector();

        evaluate(&prediction("c1", 1, 0.9, 0.9), &config, &store, &selector);
        let verdict = evaluate(&prediction("c1", 2, 0.1, 0.1), &config, &store, &selector);

        assert_eq!(verdict, Verdict::Skip(SkipReason::WithinCapacity));
        let snapshot = store.snapshot("c1").unwrap();
        assert_eq!(snapshot.cpu_false_positive_count, 1);
        assert_eq!(snapshot.memory_false_positive_count, 1);
        assert_eq!(snapshot.predictions_seen, 2);
    }

    #[test]
    fn test_decay_on_healthy_sample() {
        let config = PolicyConfig {
            decay_on_healthy: true,
            ..config(3)
        };
        let store = StateStore::from_policy(&config);
        let selector = selector();

        evaluate(&prediction("c1", 1, 0.9, 0.9), &config, &store, &selector);
        evaluate(&prediction("c1", 2, 0.9, 0.9), &config, &store, &selector);
        // CPU still hot, memory recovered
        evaluate(&prediction("c1", 3, 0.9, 0.1), &config, &store, &selector);

        let snapshot = store.snapshot("c1").unwrap();
        assert_eq!(snapshot.cpu_false_positive_count, 3);
        assert_eq!(snapshot.memory_false_positive_count, 1);

        evaluate(&prediction("c1", 4, 0.1, 0.1), &config, &store, &selector);
        let snapshot = store.snapshot("c1").unwrap();
        assert_eq!(snapshot.cpu_false_positive_count, 2);
        assert_eq!(snapshot.memory_false_positive_count, 0);
    }

    #[test]
    fn test_cooldown_suppresses_qualifying_sample() {
        let config = config(0);
        let store = StateStore::from_policy(&config);
        store.record_migration("c1", 100);

        let verdict = evaluate(&prediction("c1", 250, 0.99, 0.99), &config, &store, &selector());

        assert_eq!(
            verdict,
            Verdict::Skip(SkipReason::Cooldown {
                remaining_secs: 150
            })
        );
        // Cooldown short-circuits before counting
        assert_eq!(store.snapshot("c1").unwrap().cpu_false_positive_count, 0);
    }

    #[test]
    fn test_cooldown_expires_at_threshold() {
        let config = config(0);
        let store = StateStore::from_policy(&config);
        store.record_migration("c1", 100);

        let verdict = evaluate(&prediction("c1", 400, 0.99, 0.1), &config, &store, &selector());
        assert!(verdict.should_migrate());
    }

    #[test]
    fn test_out_of_order_sample_inside_cooldown() {
        let config = config(0);
        let store = StateStore::from_policy(&config);
        store.record_migration("c1", 1000);

        let verdict = evaluate(&prediction("c1", 900, 0.99, 0.1), &config, &store, &selector());
        assert!(matches!(verdict, Verdict::Skip(SkipReason::Cooldown { .. })));
        assert_eq!(store.snapshot("c1").unwrap().last_prediction_timestamp, Some(900));
    }

    #[test]
    fn test_minimum_timestamp_after_migration_stays_in_cooldown() {
        let config = config(0);
        let store = StateStore::from_policy(&config);
        store.record_migration("c1", 1_700_000_000);

        let verdict = evaluate(&prediction("c1", i64::MIN, 0.99, 0.1), &config, &store, &selector());

        assert!(matches!(verdict, Verdict::Skip(SkipReason::Cooldown { .. })));
        assert!(!store.snapshot("c1").unwrap().dispatch_pending);
    }

    #[test]
    fn test_immovable_check_uses_store_set() {
        let config = config(0);
        let store = StateStore::new(HashSet::from(["web-9".to_string()]));

        let verdict = evaluate(&prediction("web-9", 1, 0.99, 0.99), &config, &store, &selector());
        assert_eq!(verdict, Verdict::Skip(SkipReason::Immovable));
    }

    #[test]
    fn test_reset_after_success_needs_fresh_crossing() {
        let config = config(1);
        let store = StateStore::from_policy(&config);
        let selector = selector();

        evaluate(&prediction("c1", 1, 0.9, 0.1), &config, &store, &selector);
        assert!(evaluate(&prediction("c1", 2, 0.9, 0.1), &config, &store, &selector).should_migrate());

        store.reset_false_positives("c1");
        store.complete_dispatch("c1");

        let verdict = evaluate(&prediction("c1", 3, 0.9, 0.1), &config, &store, &selector);
        assert_eq!(
            verdict,
            Verdict::Skip(SkipReason::Tolerated {
                cpu_count: 1,
                memory_count: 0
            })
        );
    }

    #[test]
    fn test_pending_dispatch_blocks_second_verdict() {
        let config = config(0);
        let store = StateStore::from_policy(&config);
        let selector = selector();

        assert!(evaluate(&prediction("c1", 1, 0.9, 0.1), &config, &store, &selector).should_migrate());
        assert_eq!(
            evaluate(&prediction("c1", 2, 0.9, 0.1), &config, &store, &selector),
            Verdict::Skip(SkipReason::DispatchPending)
        );

        store.complete_dispatch("c1");
        assert!(evaluate(&prediction("c1", 3, 0.9, 0.1), &config, &store, &selector).should_migrate());
    }

    #[test]
    fn test_no_destination() {
        let config = config(0);
        let store = StateStore::from_policy(&config);
        let only_source = RoundRobinSelector::new(["node-a"]);

        let verdict = evaluate(&prediction("c1", 1, 0.9, 0.1), &config, &store, &only_source);
        assert_eq!(verdict, Verdict::Skip(SkipReason::NoDestination));
        assert!(!store.snapshot("c1").unwrap().dispatch_pending);
    }

    #[test]
    fn test_verdict_parts() {
        let directive = MigrationDirective {
            container_id: "c1".to_string(),
            source_host: "node-a".to_string(),
            destination_host: "node-b".to_string(),
        };

        let (migrate, carried) = Verdict::Migrate(directive.clone()).into_parts();
        assert!(migrate);
        assert_eq!(carried, Some(directive));

        let (migrate, carried) = Verdict::Skip(SkipReason::WithinCapacity).into_parts();
        assert!(!migrate);
        assert!(carried.is_none());
    }

    #[test]
    fn test_concurrent_samples_single_verdict() {
        const SAMPLES: usize = 32;
        let config = Arc::new(config(3));
        let store = Arc::new(StateStore::from_policy(&config));
        let selector = Arc::new(selector());
        let barrier = Arc::new(Barrier::new(SAMPLES));

        store.increment_false_positive("c1", ResourceKind::Cpu);

        let threads: Vec<_> = (0..SAMPLES)
            .map(|i| {
                let (config, store, selector, barrier) =
                    (config.clone(), store.clone(), selector.clone(), barrier.clone());
                std::thread::spawn(move || {
                    barrier.wait();
                    let p = prediction("c1", i as i64, 0.95, 0.1);
                    evaluate(&p, &config, &store, selector.as_ref()).should_migrate()
                })
            })
            .collect();

        let migrations = threads
            .into_iter()
            .map(|t| t.join().unwrap())
            .filter(|migrated| *migrated)
            .count();

        assert_eq!(migrations, 1);
        assert_eq!(
            store.snapshot("c1").unwrap().cpu_false_positive_count,
            SAMPLES as u32 + 1
        );
    }
}
