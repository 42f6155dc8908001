//! Core data models for the migration server

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// One forecast sample for a running container
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionMessage {
    pub container_id: String,
    /// Seconds since epoch. Samples may arrive out of order.
    pub timestamp: i64,
    pub predicted_cpu: f64,
    pub predicted_memory: f64,
    /// Host currently running the container
    pub source_host: String,
}

/// Resolved instruction handed to the migration mechanism
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationDirective {
    pub container_id: String,
    pub source_host: String,
    pub destination_host: String,
}

/// Resource dimension tracked by the false-positive counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Cpu,
    Memory,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Cpu => "cpu",
            ResourceKind::Memory => "memory",
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decision policy parameters, fixed for the process lifetime
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Containers that must never be migrated
    pub immovable_containers: HashSet<String>,
    /// Minimum seconds between two migrations of the same container
    pub thrashing_threshold_secs: i64,
    pub cpu_false_positive_tolerance: u32,
    pub memory_false_positive_tolerance: u32,
    /// Utilization at or above which the CPU is considered overloaded
    pub cpu_threshold: f64,
    /// Utilization at or above which memory is considered overloaded
    pub memory_threshold: f64,
    /// Decrement a resource's counter on each healthy sample for that resource
    #[serde(default)]
    pub decay_on_healthy: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            immovable_containers: HashSet::new(),
            thrashing_threshold_secs: 300,
            cpu_false_positive_tolerance: 3,
            memory_false_positive_tolerance: 3,
            cpu_threshold: 0.8,
            memory_threshold: 0.8,
            decay_on_healthy: false,
        }
    }
}

impl PolicyConfig {
    /// Build the immovable set from raw identifiers, dropping blanks
    pub fn with_immovable<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.immovable_containers = ids
            .into_iter()
            .map(|id| id.as_ref().trim().to_string())
            .filter(|id| !id.is_empty())
            .collect();
        self
    }

    pub fn tolerance(&self, kind: ResourceKind) -> u32 {
        match kind {
            ResourceKind::Cpu => self.cpu_false_positive_tolerance,
            ResourceKind::Memory => self.memory_false_positive_tolerance,
        }
    }

    pub fn threshold(&self, kind: ResourceKind) -> f64 {
        match kind {
            ResourceKind::Cpu => self.cpu_threshold,
            ResourceKind::Memory => self.memory_threshold,
        }
    }
}

/// Point-in-time copy of one container's policy state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerStateSnapshot {
    pub container_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_migration_timestamp: Option<i64>,
    pub cpu_false_positive_count: u32,
    pub memory_false_positive_count: u32,
    pub dispatch_pending: bool,
    pub predictions_seen: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_prediction_timestamp: Option<i64>,
}

/// Point-in-time copy of the process-wide migration state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStateSnapshot {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_system_migration_timestamp: Option<i64>,
    pub migration_in_progress: bool,
    pub containers_tracked: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_immovable_drops_blank_ids() {
        let config = PolicyConfig::default().with_immovable(["mysql1", "", " mysql2 "]);

        assert!(config.immovable_containers.contains("mysql1"));
        assert!(config.immovable_containers.contains("mysql2"));
        assert!(!config.immovable_containers.contains(""));
        assert_eq!(config.immovable_containers.len(), 2);
    }

    #[test]
    fn test_per_resource_lookup() {
        let config = PolicyConfig {
            cpu_false_positive_tolerance: 2,
            memory_false_positive_tolerance: 5,
            cpu_threshold: 0.7,
            memory_threshold: 0.9,
            ..Default::default()
        };

        assert_eq!(config.tolerance(ResourceKind::Cpu), 2);
        assert_eq!(config.tolerance(ResourceKind::Memory), 5);
        assert_eq!(config.threshold(ResourceKind::Cpu), 0.7);
        assert_eq!(config.threshold(ResourceKind::Memory), 0.9);
    }
}
