//! Inspect the server's per-container and system migration state

use anyhow::Result;
use colored::Colorize;
use server_lib::ContainerStateSnapshot;
use tabled::Tabled;

use crate::client::{ApiClient, ApiError};
use crate::output::{
    color_counter, color_status, format_timestamp, print_info, print_json, print_table,
    print_warning, OutputFormat,
};

/// Row for the containers table
#[derive(Tabled)]
struct ContainerRow {
    #[tabled(rename = "Container")]
    container_id: String,
    #[tabled(rename = "CPU FP")]
    cpu: String,
    #[tabled(rename = "Mem FP")]
    memory: String,
    #[tabled(rename = "Seen")]
    predictions_seen: u64,
    #[tabled(rename = "Last Prediction")]
    last_prediction: String,
    #[tabled(rename = "Last Migration")]
    last_migration: String,
    #[tabled(rename = "State")]
    state: String,
}

impl From<&ContainerStateSnapshot> for ContainerRow {
    fn from(snapshot: &ContainerStateSnapshot) -> Self {
        Self {
            container_id: snapshot.container_id.clone(),
            cpu: color_counter(snapshot.cpu_false_positive_count),
            memory: color_counter(snapshot.memory_false_positive_count),
            predictions_seen: snapshot.predictions_seen,
            last_prediction: format_timestamp(snapshot.last_prediction_timestamp),
            last_migration: format_timestamp(snapshot.last_migration_timestamp),
            state: color_status(dispatch_state(snapshot)),
        }
    }
}

fn dispatch_state(snapshot: &ContainerStateSnapshot) -> &'static str {
    if snapshot.dispatch_pending {
        "migrating"
    } else {
        "idle"
    }
}

/// List every container the server is tracking
pub async fn list_containers(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let containers = client.containers().await?;

    let rows: Vec<ContainerRow> = containers.iter().map(ContainerRow::from).collect();
    print_table(rows, &containers, format);

    if format == OutputFormat::Table && !containers.is_empty() {
        println!("\nTotal: {} containers", containers.len());
    }
    Ok(())
}

/// Show one container's policy state
pub async fn show_container(client: &ApiClient, container_id: &str, format: OutputFormat) -> Result<()> {
    let snapshot = match client.container(container_id).await {
        Ok(snapshot) => snapshot,
        Err(e) if matches!(e.downcast_ref::<ApiError>(), Some(ApiError::NotFound(_))) => {
            print_warning(&format!(
                "Container {} has not sent any predictions yet",
                container_id
            ));
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    match format {
        OutputFormat::Json => print_json(&snapshot),
        OutputFormat::Table => {
            println!("{}", "Container State".bold());
            println!("{}", "=".repeat(50));
            println!("Container:            {}", snapshot.container_id.cyan());
            println!("State:                {}", color_status(dispatch_state(&snapshot)));
            println!(
                "CPU false positives:  {}",
                color_counter(snapshot.cpu_false_positive_count)
            );
            println!(
                "Mem false positives:  {}",
                color_counter(snapshot.memory_false_positive_count)
            );
            println!("Predictions seen:     {}", snapshot.predictions_seen);
            println!(
                "Last prediction:      {}",
                format_timestamp(snapshot.last_prediction_timestamp)
            );
            println!(
                "Last migration:       {}",
                format_timestamp(snapshot.last_migration_timestamp)
            );
        }
    }
    Ok(())
}

/// Show process-wide migration state
pub async fn show_system(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let system = client.system().await?;

    match format {
        OutputFormat::Json => print_json(&system),
        OutputFormat::Table => {
            println!("{}", "System State".bold());
            println!("{}", "=".repeat(50));
            let activity = if system.migration_in_progress {
                "migrating"
            } else {
                "idle"
            };
            println!("Activity:             {}", color_status(activity));
            println!("Containers tracked:   {}", system.containers_tracked);
            println!(
                "Last migration:       {}",
                format_timestamp(system.last_system_migration_timestamp)
            );
            if system.last_system_migration_timestamp.is_none() {
                print_info("No migration has completed since the server started");
            }
        }
    }
    Ok(())
}
