//! Error types for the migration server
//!
//! Each message already includes its cause, so no variant exposes a
//! separate `source()`.

use std::net::SocketAddr;
use thiserror::Error;

/// Failures while reading or writing a framed wire message
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("connection closed before a complete frame was received")]
    Truncated,

    #[error("frame of {size} bytes exceeds the {limit} byte limit")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("invalid length prefix")]
    InvalidLength,

    #[error("failed to decode message: {0}")]
    Decode(prost::DecodeError),

    #[error("invalid prediction: {0}")]
    Invalid(String),

    #[error("timed out waiting for the peer")]
    Timeout,

    #[error("i/o error: {0}")]
    Io(std::io::Error),
}

impl From<prost::DecodeError> for ProtocolError {
    fn from(err: prost::DecodeError) -> Self {
        ProtocolError::Decode(err)
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        ProtocolError::Io(err)
    }
}

/// Failures reported by a migration dispatcher
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("migration agent at {addr} unreachable: {cause}")]
    Unreachable { addr: String, cause: std::io::Error },

    #[error("migration agent protocol error: {0}")]
    Protocol(ProtocolError),

    #[error("migration of {container_id} rejected: {message}")]
    Rejected {
        container_id: String,
        message: String,
    },

    #[error("migration of {container_id} timed out after {secs}s")]
    Timeout { container_id: String, secs: u64 },
}

impl From<ProtocolError> for DispatchError {
    fn from(err: ProtocolError) -> Self {
        DispatchError::Protocol(err)
    }
}

/// Fatal server errors
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind listener on {addr}: {cause}")]
    Bind { addr: SocketAddr, cause: std::io::Error },

    #[error("listener i/o error: {0}")]
    Io(std::io::Error),
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        ServerError::Io(err)
    }
}
