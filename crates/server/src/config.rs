//! Server configuration
//!
//! Read once at startup from `MIGRATION_*` environment variables, layered
//! over an optional file named by `MIGRATION_CONFIG_FILE`.

use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use server_lib::dispatcher::DEFAULT_AGENT_PORT;
use server_lib::engine::DEFAULT_PREDICTION_PORT;
use server_lib::{EngineConfig, PolicyConfig};
use std::time::Duration;

const ENV_PREFIX: &str = "MIGRATION";
const CONFIG_FILE_VAR: &str = "MIGRATION_CONFIG_FILE";

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Name used in structured logs
    #[serde(default = "default_server_id")]
    pub server_id: String,

    /// Port for prediction traffic
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,

    /// Port for health/metrics/state endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Migration processing switch; off by default
    #[serde(default)]
    pub migrate_enabled: bool,

    #[serde(default)]
    pub immovable_containers: Vec<String>,

    #[serde(default = "default_thrashing_threshold")]
    pub thrashing_threshold_secs: i64,

    #[serde(default = "default_tolerance")]
    pub cpu_false_positive_tolerance: u32,

    #[serde(default = "default_tolerance")]
    pub memory_false_positive_tolerance: u32,

    #[serde(default = "default_threshold")]
    pub cpu_threshold: f64,

    #[serde(default = "default_threshold")]
    pub memory_threshold: f64,

    #[serde(default)]
    pub decay_on_healthy: bool,

    /// Serialize dispatches across all containers
    #[serde(default)]
    pub exclusive_dispatch: bool,

    /// Hosts that may receive migrated containers
    #[serde(default)]
    pub destination_hosts: Vec<String>,

    /// Port of the migration agent on each host
    #[serde(default = "default_agent_port")]
    pub agent_port: u16,

    #[serde(default = "default_dispatch_timeout")]
    pub dispatch_timeout_secs: u64,

    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Log directives instead of contacting migration agents
    #[serde(default)]
    pub dry_run: bool,
}

fn default_server_id() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "migration-server".to_string())
}

fn default_listen_port() -> u16 {
    DEFAULT_PREDICTION_PORT
}

fn default_api_port() -> u16 {
    8080
}

fn default_thrashing_threshold() -> i64 {
    300
}

fn default_tolerance() -> u32 {
    3
}

fn default_threshold() -> f64 {
    0.8
}

fn default_agent_port() -> u16 {
    DEFAULT_AGENT_PORT
}

fn default_dispatch_timeout() -> u64 {
    120
}

fn default_handshake_timeout() -> u64 {
    10
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("immovable_containers")
        .with_list_parse_key("destination_hosts")
}

impl ServerConfig {
    /// Load configuration from the optional file and the environment
    pub fn load() -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Ok(path) = std::env::var(CONFIG_FILE_VAR) {
            builder = builder.add_source(config::File::with_name(&path));
        }

        let config = builder
            .add_source(environment())
            .build()
            .context("Failed to read configuration")?;

        Self::from_config(config)
    }

    fn from_config(config: config::Config) -> Result<Self> {
        let server_config: Self = config
            .try_deserialize()
            .context("Invalid server configuration")?;
        server_config.validate()?;
        Ok(server_config)
    }

    fn validate(&self) -> Result<()> {
        ensure!(self.listen_port != 0, "listen_port must be non-zero");
        ensure!(self.api_port != 0, "api_port must be non-zero");
        ensure!(
            self.listen_port != self.api_port,
            "listen_port and api_port must differ"
        );
        ensure!(
            self.cpu_threshold.is_finite() && self.cpu_threshold > 0.0,
            "cpu_threshold must be a positive number"
        );
        ensure!(
            self.memory_threshold.is_finite() && self.memory_threshold > 0.0,
            "memory_threshold must be a positive number"
        );
        ensure!(
            self.thrashing_threshold_secs >= 0,
            "thrashing_threshold_secs must not be negative"
        );
        ensure!(
            self.handshake_timeout_secs > 0,
            "handshake_timeout_secs must be positive"
        );
        ensure!(
            self.dispatch_timeout_secs > 0,
            "dispatch_timeout_secs must be positive"
        );
        Ok(())
    }

    pub fn policy(&self) -> PolicyConfig {
        PolicyConfig {
            thrashing_threshold_secs: self.thrashing_threshold_secs,
            cpu_false_positive_tolerance: self.cpu_false_positive_tolerance,
            memory_false_positive_tolerance: self.memory_false_positive_tolerance,
            cpu_threshold: self.cpu_threshold,
            memory_threshold: self.memory_threshold,
            decay_on_healthy: self.decay_on_healthy,
            ..Default::default()
        }
        .with_immovable(&self.immovable_containers)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            policy: self.policy(),
            migrate_enabled: self.migrate_enabled,
            handshake_timeout: Duration::from_secs(self.handshake_timeout_secs),
            exclusive_dispatch: self.exclusive_dispatch,
        }
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_env(vars: &[(&str, &str)]) -> Result<ServerConfig> {
        let source: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        let config = config::Config::builder()
            .add_source(environment().source(Some(source)))
            .build()?;
        ServerConfig::from_config(config)
    }

    #[test]
    fn test_defaults() {
        let config = from_env(&[]).unwrap();

        assert_eq!(config.listen_port, 5051);
        assert_eq!(config.api_port, 8080);
        assert!(!config.migrate_enabled);
        assert!(config.immovable_containers.is_empty());
        assert_eq!(config.thrashing_threshold_secs, 300);
        assert_eq!(config.cpu_false_positive_tolerance, 3);
        assert_eq!(config.cpu_threshold, 0.8);
        assert_eq!(config.agent_port, 5052);
        assert!(!config.dry_run);
    }

    #[test]
    fn test_environment_overrides() {
        let config = from_env(&[
            ("MIGRATION_MIGRATE_ENABLED", "true"),
            ("MIGRATION_IMMOVABLE_CONTAINERS", "mysql1,mysql2,ff7a945953c7"),
            ("MIGRATION_DESTINATION_HOSTS", "node-b,node-c"),
            ("MIGRATION_CPU_THRESHOLD", "0.9"),
            ("MIGRATION_THRASHING_THRESHOLD_SECS", "600"),
        ])
        .unwrap();

        assert!(config.migrate_enabled);
        assert_eq!(
            config.immovable_containers,
            vec!["mysql1", "mysql2", "ff7a945953c7"]
        );
        assert_eq!(config.destination_hosts, vec!["node-b", "node-c"]);
        assert_eq!(config.cpu_threshold, 0.9);

        let policy = config.policy();
        assert!(policy.immovable_containers.contains("ff7a945953c7"));
        assert_eq!(policy.thrashing_threshold_secs, 600);
    }

    #[test]
    fn test_engine_config_mapping() {
        let config = from_env(&[
            ("MIGRATION_MIGRATE_ENABLED", "true"),
            ("MIGRATION_HANDSHAKE_TIMEOUT_SECS", "3"),
            ("MIGRATION_EXCLUSIVE_DISPATCH", "true"),
        ])
        .unwrap();

        let engine = config.engine_config();
        assert!(engine.migrate_enabled);
        assert!(engine.exclusive_dispatch);
        assert_eq!(engine.handshake_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_rejects_invalid_values() {
        assert!(from_env(&[("MIGRATION_CPU_THRESHOLD", "0")]).is_err());
        assert!(from_env(&[("MIGRATION_API_PORT", "5051")]).is_err());
        assert!(from_env(&[("MIGRATION_THRASHING_THRESHOLD_SECS", "-1")]).is_err());
    }
}
