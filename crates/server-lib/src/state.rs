//! Shared policy state
//!
//! Per-container entries live in a concurrent map and each entry carries its
//! own lock, so updates for one container never wait on another container.
//! Entries are created on first sight and kept for the process lifetime.
//! The migration-in-progress flag and the last system-wide migration time
//! are the only process-wide fields.

use crate::models::{ContainerStateSnapshot, PolicyConfig, ResourceKind, SystemStateSnapshot};
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::debug;

/// Mutable policy state for a single container
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerState {
    /// Completion time of the last successful migration
    pub last_migration_timestamp: Option<i64>,
    pub cpu_false_positive_count: u32,
    pub memory_false_positive_count: u32,
    /// Set together with a migrate verdict, cleared when the dispatch finishes
    pub dispatch_pending: bool,
    pub predictions_seen: u64,
    pub last_prediction_timestamp: Option<i64>,
}

impl ContainerState {
    pub fn count(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Cpu => self.cpu_false_positive_count,
            ResourceKind::Memory => self.memory_false_positive_count,
        }
    }

    fn counter_mut(&mut self, kind: ResourceKind) -> &mut u32 {
        match kind {
            ResourceKind::Cpu => &mut self.cpu_false_positive_count,
            ResourceKind::Memory => &mut self.memory_false_positive_count,
        }
    }

    /// Increment a counter and return the new value
    pub fn increment(&mut self, kind: ResourceKind) -> u32 {
        let counter = self.counter_mut(kind);
        *counter = counter.saturating_add(1);
        *counter
    }

    /// Decrement a counter towards zero and return the new value
    pub fn decay(&mut self, kind: ResourceKind) -> u32 {
        let counter = self.counter_mut(kind);
        *counter = counter.saturating_sub(1);
        *counter
    }

    pub fn reset_false_positives(&mut self) {
        self.cpu_false_positive_count = 0;
        self.memory_false_positive_count = 0;
    }

    /// Seconds left in the cooldown window at `now`, if any
    ///
    /// `now` comes straight off the wire. When `now - last` does not fit in
    /// an `i64`, a sample far in the past is inside the window and one far
    /// in the future is outside it.
    pub fn cooldown_remaining(&self, now: i64, threshold_secs: i64) -> Option<i64> {
        let last = self.last_migration_timestamp?;
        match now.checked_sub(last) {
            Some(elapsed) if elapsed >= threshold_secs => None,
            Some(elapsed) => Some(threshold_secs.saturating_sub(elapsed)),
            None if now > last => None,
            None => Some(i64::MAX),
        }
    }

    fn snapshot(&self, container_id: &str) -> ContainerStateSnapshot {
        ContainerStateSnapshot {
            container_id: container_id.to_string(),
            last_migration_timestamp: self.last_migration_timestamp,
            cpu_false_positive_count: self.cpu_false_positive_count,
            memory_false_positive_count: self.memory_false_positive_count,
            dispatch_pending: self.dispatch_pending,
            predictions_seen: self.predictions_seen,
            last_prediction_timestamp: self.last_prediction_timestamp,
        }
    }
}

/// Shared handle to one container's state
pub type ContainerHandle = Arc<Mutex<ContainerState>>;

#[derive(Debug, Default)]
struct SystemState {
    last_system_migration_timestamp: Option<i64>,
}

/// Store for all mutable migration policy state
#[derive(Debug)]
pub struct StateStore {
    containers: DashMap<String, ContainerHandle>,
    system: Mutex<SystemState>,
    migration_in_progress: AtomicBool,
    immovable: HashSet<String>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(HashSet::new())
    }
}

// Container state has no multi-step invariants; poisoned locks are usable.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl StateStore {
    /// Create a store with the given immovable container set
    pub fn new(immovable: HashSet<String>) -> Self {
        Self {
            containers: DashMap::new(),
            system: Mutex::new(SystemState::default()),
            migration_in_progress: AtomicBool::new(false),
            immovable,
        }
    }

    /// Create a store whose immovable set comes from the policy
    pub fn from_policy(policy: &PolicyConfig) -> Self {
        Self::new(policy.immovable_containers.clone())
    }

    pub fn immovable_containers(&self) -> &HashSet<String> {
        &self.immovable
    }

    /// Get the entry for a container, creating it if needed
    pub fn get_or_create(&self, container_id: &str) -> ContainerHandle {
        if let Some(handle) = self.containers.get(container_id) {
            return handle.value().clone();
        }

        self.containers
            .entry(container_id.to_string())
            .or_insert_with(|| {
                debug!(container_id = %container_id, "Tracking new container");
                Arc::new(Mutex::new(ContainerState::default()))
            })
            .value()
            .clone()
    }

    /// Run `f` with exclusive access to one container's state
    pub fn update<R>(&self, container_id: &str, f: impl FnOnce(&mut ContainerState) -> R) -> R {
        let handle = self.get_or_create(container_id);
        let mut state = lock(&handle);
        f(&mut state)
    }

    /// Record a completed migration for a container and for the system
    pub fn record_migration(&self, container_id: &str, time: i64) {
        let handle = self.get_or_create(container_id);
        let mut state = lock(&handle);
        state.last_migration_timestamp = Some(time);
        lock(&self.system).last_system_migration_timestamp = Some(time);
    }

    pub fn reset_false_positives(&self, container_id: &str) {
        self.update(container_id, ContainerState::reset_false_positives);
    }

    /// Atomically increment a counter and return the new value
    pub fn increment_false_positive(&self, container_id: &str, kind: ResourceKind) -> u32 {
        self.update(container_id, |state| state.increment(kind))
    }

    /// Clear the pending-dispatch mark set by a migrate verdict
    pub fn complete_dispatch(&self, container_id: &str) {
        self.update(container_id, |state| state.dispatch_pending = false);
    }

    pub fn set_migration_in_progress(&self, in_progress: bool) {
        self.migration_in_progress
            .store(in_progress, Ordering::SeqCst);
    }

    pub fn migration_in_progress(&self) -> bool {
        self.migration_in_progress.load(Ordering::SeqCst)
    }

    /// Mark a migration as in progress until the guard is dropped
    pub fn begin_migration(&self) -> MigrationInProgressGuard<'_> {
        self.set_migration_in_progress(true);
        MigrationInProgressGuard { store: self }
    }

    pub fn is_immovable(&self, container_id: &str) -> bool {
        self.immovable.contains(container_id)
    }

    pub fn last_system_migration_timestamp(&self) -> Option<i64> {
        lock(&self.system).last_system_migration_timestamp
    }

    pub fn snapshot(&self, container_id: &str) -> Option<ContainerStateSnapshot> {
        let handle = self.containers.get(container_id)?.value().clone();
        let state = lock(&handle);
        Some(state.snapshot(container_id))
    }

    /// Snapshots of every tracked container, ordered by id
    pub fn snapshots(&self) -> Vec<ContainerStateSnapshot> {
        let handles: Vec<(String, ContainerHandle)> = self
            .containers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        let mut snapshots: Vec<_> = handles
            .iter()
            .map(|(id, handle)| lock(handle).snapshot(id))
            .collect();
        snapshots.sort_by(|a, b| a.container_id.cmp(&b.container_id));
        snapshots
    }

    pub fn system_snapshot(&self) -> SystemStateSnapshot {
        SystemStateSnapshot {
            last_system_migration_timestamp: self.last_system_migration_timestamp(),
            migration_in_progress: self.migration_in_progress(),
            containers_tracked: self.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }
}

/// Clears the migration-in-progress flag when dropped
#[must_use = "the flag is cleared as soon as the guard is dropped"]
pub struct MigrationInProgressGuard<'a> {
    store: &'a StateStore,
}

impl Drop for MigrationInProgressGuard<'_> {
    fn drop(&mut self) {
        self.store.set_migration_in_progress(false);
    }
}
