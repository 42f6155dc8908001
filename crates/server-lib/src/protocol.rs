//! Wire protocol for prediction and migration exchanges
//!
//! Every message is a protobuf record preceded by a varint length prefix,
//! the same framing produced by `Message::encode_length_delimited`.
//! One frame travels in each direction per connection.

use crate::error::ProtocolError;
use crate::models::{MigrationDirective, PredictionMessage};
use prost::Message;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Largest frame body accepted from a peer
pub const MAX_FRAME_SIZE: usize = 64 * 1024;

/// Longest possible varint length prefix
const MAX_PREFIX_LEN: usize = 10;

/// Prediction sample sent by the prediction agent
#[derive(Clone, PartialEq, Message)]
pub struct PredictionData {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(string, tag = "2")]
    pub container_id: String,
    #[prost(double, tag = "3")]
    pub predicted_cpu: f64,
    #[prost(double, tag = "4")]
    pub predicted_memory: f64,
    #[prost(string, tag = "5")]
    pub source_host: String,
}

/// Acknowledgment returned before any decision processing
#[derive(Clone, PartialEq, Message)]
pub struct PredictionAck {
    #[prost(int64, tag = "1")]
    pub timestamp: i64,
    #[prost(bool, tag = "2")]
    pub accepted: bool,
}

impl PredictionAck {
    pub fn accepted(timestamp: i64) -> Self {
        Self {
            timestamp,
            accepted: true,
        }
    }
}

/// Command sent to the migration agent on the source host
#[derive(Clone, PartialEq, Message)]
pub struct MigrationCommand {
    #[prost(string, tag = "1")]
    pub container_id: String,
    #[prost(string, tag = "2")]
    pub source_host: String,
    #[prost(string, tag = "3")]
    pub destination_host: String,
    #[prost(int64, tag = "4")]
    pub issued_at: i64,
}

/// Result reported by the migration agent
#[derive(Clone, PartialEq, Message)]
pub struct MigrationOutcome {
    #[prost(bool, tag = "1")]
    pub success: bool,
    #[prost(string, tag = "2")]
    pub message: String,
}

impl MigrationCommand {
    pub fn from_directive(directive: &MigrationDirective, issued_at: i64) -> Self {
        Self {
            container_id: directive.container_id.clone(),
            source_host: directive.source_host.clone(),
            destination_host: directive.destination_host.clone(),
            issued_at,
        }
    }
}

impl TryFrom<PredictionData> for PredictionMessage {
    type Error = ProtocolError;

    fn try_from(data: PredictionData) -> Result<Self, Self::Error> {
        if data.container_id.trim().is_empty() {
            return Err(ProtocolError::Invalid("empty container id".to_string()));
        }
        if data.source_host.trim().is_empty() {
            return Err(ProtocolError::Invalid("empty source host".to_string()));
        }
        if !data.predicted_cpu.is_finite() || !data.predicted_memory.is_finite() {
            return Err(ProtocolError::Invalid(format!(
                "non-finite utilization (cpu={}, memory={})",
                data.predicted_cpu, data.predicted_memory
            )));
        }

        Ok(PredictionMessage {
            container_id: data.container_id,
            timestamp: data.timestamp,
            predicted_cpu: data.predicted_cpu,
            predicted_memory: data.predicted_memory,
            source_host: data.source_host,
        })
    }
}

impl From<&PredictionMessage> for PredictionData {
    fn from(msg: &PredictionMessage) -> Self {
        Self {
            timestamp: msg.timestamp,
            container_id: msg.container_id.clone(),
            predicted_cpu: msg.predicted_cpu,
            predicted_memory: msg.predicted_memory,
            source_host: msg.source_host.clone(),
        }
    }
}

/// Read one length-delimited message
pub async fn read_frame<M, R>(reader: &mut R) -> Result<M, ProtocolError>
where
    M: Message + Default,
    R: AsyncRead + Unpin,
{
    let len = read_length_prefix(reader).await?;
    if len > MAX_FRAME_SIZE {
        return Err(ProtocolError::FrameTooLarge {
            size: len,
            limit: MAX_FRAME_SIZE,
        });
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await.map_err(eof_as_truncated)?;

    Ok(M::decode(body.as_slice())?)
}

/// Write one length-delimited message and flush it
pub async fn write_frame<M, W>(writer: &mut W, msg: &M) -> Result<(), ProtocolError>
where
    M: Message,
    W: AsyncWrite + Unpin,
{
    let buf = msg.encode_length_delimited_to_vec();
    writer.write_all(&buf).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_length_prefix<R>(reader: &mut R) -> Result<usize, ProtocolError>
where
    R: AsyncRead + Unpin,
{
    let mut prefix = [0u8; MAX_PREFIX_LEN];

    for i in 0..MAX_PREFIX_LEN {
        let byte = reader.read_u8().await.map_err(eof_as_truncated)?;
        prefix[i] = byte;
        if byte & 0x80 == 0 {
            return prost::decode_length_delimiter(&prefix[..=i])
                .map_err(|_| ProtocolError::InvalidLength);
        }
    }

    Err(ProtocolError::InvalidLength)
}

fn eof_as_truncated(err: std::io::Error) -> ProtocolError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        ProtocolError::Truncated
    } else {
        ProtocolError::Io(err)
    }
}
