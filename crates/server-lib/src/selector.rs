//! Destination host selection
//!
//! Placement is pluggable; the server ships a round-robin pool.

use crate::models::PredictionMessage;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Chooses where an overloaded container should go
pub trait DestinationSelector: Send + Sync {
    /// Pick a destination host, or `None` when no host can take the container
    fn select(&self, prediction: &PredictionMessage) -> Option<String>;
}

/// Rotates through a fixed pool of hosts, skipping the source host
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    hosts: Vec<String>,
    next: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut hosts: Vec<String> = hosts
            .into_iter()
            .map(Into::into)
            .filter(|h| !h.trim().is_empty())
            .collect();
        hosts.dedup();

        Self {
            hosts,
            next: AtomicUsize::new(0),
        }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }
}

impl DestinationSelector for RoundRobinSelector {
    fn select(&self, prediction: &PredictionMessage) -> Option<String> {
        let candidates: Vec<&String> = self
            .hosts
            .iter()
            .filter(|h| **h != prediction.source_host)
            .collect();

        if candidates.is_empty() {
            return None;
        }

        let idx = self.next.fetch_add(1, Ordering::Relaxed) % candidates.len();
        Some(candidates[idx].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction_from(host: &str) -> PredictionMessage {
        PredictionMessage {
            container_id: "c1".to_string(),
            timestamp: 0,
            predicted_cpu: 1.0,
            predicted_memory: 0.0,
            source_host: host.to_string(),
        }
    }

    #[test]
    fn test_rotates_and_skips_source() {
        let selector = RoundRobinSelector::new(["node-a", "node-b", "node-c"]);
        let from_a = prediction_from("node-a");

        let picks: Vec<_> = (0..4).filter_map(|_| selector.select(&from_a)).collect();
        assert_eq!(picks, vec!["node-b", "node-c", "node-b", "node-c"]);
    }

    #[test]
    fn test_no_candidate() {
        let selector = RoundRobinSelector::new(["node-a"]);
        assert_eq!(selector.select(&prediction_from("node-a")), None);

        let empty = RoundRobinSelector::new(Vec::<String>::new());
        assert_eq!(empty.select(&prediction_from("node-a")), None);
    }

    #[test]
    fn test_blank_hosts_ignored() {
        let selector = RoundRobinSelector::new(["", "node-b", " "]);
        assert_eq!(selector.hosts(), ["node-b".to_string()]);
    }
}
