//! Container migration server CLI
//!
//! Sends test predictions to the server and inspects its migration state
//! and health.

mod client;
mod commands;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{health, predict, state};
use server_lib::protocol::PredictionData;
use std::time::Duration;

/// Container migration server CLI
#[derive(Parser, Debug)]
#[command(name = "migctl")]
#[command(author, version, about = "CLI for the container migration server", long_about = None)]
pub struct Cli {
    /// HTTP API endpoint (can also be set via MIGCTL_API_URL env var)
    #[arg(long, env = "MIGCTL_API_URL", default_value = "http://localhost:8080")]
    pub api_url: String,

    /// Prediction endpoint as host:port
    #[arg(long, env = "MIGCTL_SERVER", default_value = "127.0.0.1:5051")]
    pub server: String,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send one prediction and wait for the ack
    Predict {
        /// Container to report on
        container_id: String,

        /// Predicted CPU utilization (fraction of capacity)
        #[arg(long)]
        cpu: f64,

        /// Predicted memory utilization (fraction of capacity)
        #[arg(long)]
        memory: f64,

        /// Host currently running the container
        #[arg(long)]
        source_host: String,

        /// Sample time in Unix seconds (defaults to now)
        #[arg(long)]
        timestamp: Option<i64>,

        /// Seconds to wait for the ack
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },

    /// List tracked containers and their counters
    Containers,

    /// Show one container's state
    Container {
        container_id: String,
    },

    /// Show system-wide migration state
    System,

    /// Show server health and readiness
    Health,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        output::print_error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Predict {
            container_id,
            cpu,
            memory,
            source_host,
            timestamp,
            timeout,
        } => {
            let data = PredictionData {
                timestamp: timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp()),
                container_id,
                predicted_cpu: cpu,
                predicted_memory: memory,
                source_host,
            };
            predict::predict(&cli.server, data, Duration::from_secs(timeout), cli.format).await?;
        }
        Commands::Containers => {
            let client = client::ApiClient::new(&cli.api_url)?;
            state::list_containers(&client, cli.format).await?;
        }
        Commands::Container { container_id } => {
            let client = client::ApiClient::new(&cli.api_url)?;
            state::show_container(&client, &container_id, cli.format).await?;
        }
        Commands::System => {
            let client = client::ApiClient::new(&cli.api_url)?;
            state::show_system(&client, cli.format).await?;
        }
        Commands::Health => {
            let client = client::ApiClient::new(&cli.api_url)?;
            health::show_health(&client, cli.format).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use output::OutputFormat;

    #[test]
    fn test_parse_predict() {
        let cli = Cli::try_parse_from([
            "migctl",
            "--server",
            "10.0.0.5:5051",
            "predict",
            "web-1",
            "--cpu",
            "0.92",
            "--memory",
            "0.4",
            "--source-host",
            "node-a",
            "--timestamp",
            "1700000000",
        ])
        .unwrap();

        assert_eq!(cli.server, "10.0.0.5:5051");
        match cli.command {
            Commands::Predict {
                container_id,
                cpu,
                source_host,
                timestamp,
                timeout,
                ..
            } => {
                assert_eq!(container_id, "web-1");
                assert_eq!(cpu, 0.92);
                assert_eq!(source_host, "node-a");
                assert_eq!(timestamp, Some(1_700_000_000));
                assert_eq!(timeout, 10);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_predict_requires_utilization() {
        let result = Cli::try_parse_from(["migctl", "predict", "web-1", "--source-host", "node-a"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_container_with_json_output() {
        let cli = Cli::try_parse_from(["migctl", "-f", "json", "container", "web-1"]).unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        assert!(matches!(cli.command, Commands::Container { ref container_id } if container_id == "web-1"));
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["migctl", "system"]).unwrap();

        assert_eq!(cli.format, OutputFormat::Table);
        assert!(matches!(cli.command, Commands::System));
    }
}
