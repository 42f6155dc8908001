//! Per-connection handling

use super::{DecisionOutcome, MigrationEngine};
use crate::error::ProtocolError;
use crate::models::PredictionMessage;
use crate::protocol::{read_frame, write_frame, PredictionAck, PredictionData};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info};

/// Why a connection was aborted before decision processing
#[derive(Debug, Error)]
pub enum HandshakeError {
    #[error("bad prediction data message from client: {0}")]
    Decode(ProtocolError),

    #[error("failed to send prediction ack: {0}")]
    Ack(ProtocolError),
}

/// Handshake phase: read one prediction, acknowledge it and close the stream
///
/// Nothing is written when the prediction cannot be decoded.
pub async fn handshake<S>(stream: &mut S, timeout: Duration) -> Result<PredictionMessage, HandshakeError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let data: PredictionData = tokio::time::timeout(timeout, read_frame(stream))
        .await
        .map_err(|_| HandshakeError::Decode(ProtocolError::Timeout))?
        .map_err(HandshakeError::Decode)?;
    let prediction = PredictionMessage::try_from(data).map_err(HandshakeError::Decode)?;

    let ack = PredictionAck::accepted(prediction.timestamp);
    tokio::time::timeout(timeout, write_frame(stream, &ack))
        .await
        .map_err(|_| HandshakeError::Ack(ProtocolError::Timeout))?
        .map_err(HandshakeError::Ack)?;

    // The ack is already flushed; a failed shutdown only affects the peer's EOF
    if let Err(e) = stream.shutdown().await {
        debug!(error = %e, "Failed to shut down prediction connection");
    }

    Ok(prediction)
}

impl MigrationEngine {
    /// Serve one prediction connection from handshake to migration outcome
    ///
    /// Returns `None` when the connection was aborted during the handshake.
    pub async fn handle_connection<S>(&self, mut stream: S) -> Option<DecisionOutcome>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let prediction = match handshake(&mut stream, self.config.handshake_timeout).await {
            Ok(prediction) => prediction,
            Err(e @ HandshakeError::Decode(_)) => {
                error!(error = %e, "Bad prediction data message from client");
                self.metrics.inc_decode_errors();
                return None;
            }
            Err(e @ HandshakeError::Ack(_)) => {
                error!(error = %e, "Prediction data ack failed");
                self.metrics.inc_ack_errors();
                return None;
            }
        };
        drop(stream);

        self.metrics.inc_predictions_received();
        self.logger.log_prediction(&prediction);
        info!(request_id = prediction.timestamp, "Prediction data ack sent");

        Some(self.process(&prediction).await)
    }
}
