//! Send a single prediction to the migration server

use anyhow::{bail, Context, Result};
use colored::Colorize;
use serde_json::json;
use server_lib::protocol::{read_frame, write_frame, PredictionAck, PredictionData};
use server_lib::PredictionMessage;
use std::time::Duration;
use tokio::net::TcpStream;

use crate::output::{format_timestamp, format_utilization, print_json, print_success, OutputFormat};

/// Deliver one prediction and wait for the server's ack
pub async fn send_prediction(
    server: &str,
    prediction: &PredictionMessage,
    timeout: Duration,
) -> Result<PredictionAck> {
    let exchange = async {
        let mut stream = TcpStream::connect(server)
            .await
            .with_context(|| format!("Failed to connect to {}", server))?;

        write_frame(&mut stream, &PredictionData::from(prediction))
            .await
            .context("Failed to send prediction")?;

        read_frame::<PredictionAck, _>(&mut stream)
            .await
            .context("Server closed the connection without acknowledging")
    };

    let ack = tokio::time::timeout(timeout, exchange)
        .await
        .with_context(|| format!("No ack from {} within {:?}", server, timeout))??;

    if ack.timestamp != prediction.timestamp {
        bail!(
            "Ack timestamp {} does not match prediction {}",
            ack.timestamp,
            prediction.timestamp
        );
    }
    Ok(ack)
}

pub async fn predict(
    server: &str,
    data: PredictionData,
    timeout: Duration,
    format: OutputFormat,
) -> Result<()> {
    let prediction = PredictionMessage::try_from(data).context("Invalid prediction")?;
    let ack = send_prediction(server, &prediction, timeout).await?;

    match format {
        OutputFormat::Json => print_json(&json!({
            "server": server,
            "container_id": prediction.container_id,
            "timestamp": ack.timestamp,
            "accepted": ack.accepted,
        })),
        OutputFormat::Table => {
            print_success(&format!(
                "Prediction for {} acknowledged by {}",
                prediction.container_id.cyan(),
                server
            ));
            println!("  Timestamp: {}", format_timestamp(Some(ack.timestamp)));
            println!("  CPU:       {}", format_utilization(prediction.predicted_cpu));
            println!("  Memory:    {}", format_utilization(prediction.predicted_memory));
            println!("  Source:    {}", prediction.source_host);
        }
    }

    Ok(())
}
