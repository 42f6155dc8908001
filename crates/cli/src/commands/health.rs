//! Server health and readiness

use anyhow::Result;
use colored::Colorize;
use serde_json::json;
use server_lib::ComponentStatus;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{color_status, format_timestamp, print_json, OutputFormat};

#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
    #[tabled(rename = "Checked")]
    checked: String,
}

fn status_label(status: ComponentStatus) -> &'static str {
    match status {
        ComponentStatus::Healthy => "healthy",
        ComponentStatus::Degraded => "degraded",
        ComponentStatus::Unhealthy => "unhealthy",
    }
}

pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;
    let readiness = client.readiness().await?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "health": health,
            "readiness": readiness,
        })),
        OutputFormat::Table => {
            let ready = if readiness.ready { "ready" } else { "not ready" };
            println!(
                "{} {} ({})",
                "Server:".bold(),
                color_status(status_label(health.status)),
                color_status(ready)
            );
            if let Some(reason) = &readiness.reason {
                println!("Reason: {}", reason);
            }
            println!();

            let mut names: Vec<&String> = health.components.keys().collect();
            names.sort();
            let rows: Vec<ComponentRow> = names
                .into_iter()
                .map(|name| {
                    let component = &health.components[name];
                    ComponentRow {
                        name: name.clone(),
                        status: color_status(status_label(component.status)),
                        message: component.message.clone().unwrap_or_default(),
                        checked: format_timestamp(Some(component.last_check_timestamp)),
                    }
                })
                .collect();

            let table = tabled::Table::new(rows)
                .with(tabled::settings::Style::rounded())
                .to_string();
            println!("{}", table);
        }
    }

    Ok(())
}
