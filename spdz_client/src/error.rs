use std::{io, path::PathBuf};

use thiserror::Error;

/// Malformed or truncated field element buffer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Buffer truncated: expected {expected} bytes, {available} available")]
    Truncated { expected: usize, available: usize },

    #[error("Non-canonical field element at position {0}")]
    NonCanonical(usize),

    #[error("{0} unexpected trailing bytes in buffer")]
    TrailingBytes(usize),
}

/// Connection to an engine failed or was dropped.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Cannot connect to engine {engine} at {address}: {source}")]
    Connect {
        engine: usize,
        address: String,
        source: io::Error,
    },

    #[error("Error while sending message to engine {0}")]
    Send(usize),

    #[error("Error while receiving message from engine {0}")]
    Recv(usize),

    #[error("Engine {0} closed the connection")]
    Closed(usize),
}

/// Invalid startup configuration. Raised before any network activity.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("Invalid session configuration: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid field parameters: {0}")]
    FieldParams(String),

    #[error("Malformed dataset at line {line}: {reason}")]
    Dataset { line: usize, reason: String },

    #[error("Fixed-point value {0} is out of range")]
    FixedPointRange(f64),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// A cheating or faulty engine was detected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    #[error("Incorrect triple at {0}")]
    InconsistentTriple(usize),

    #[error("Authenticated result failed the y * r = w check")]
    UnauthenticatedResult,

    #[error("Reconstructed value at {0} does not fit a signed 64-bit integer")]
    SignedOverflow(usize),

    #[error("Engine {0} received a different broadcast than engine 0")]
    InconsistentBroadcast(usize),
}

/// Top-level client error. Every variant is fatal for the session.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Wire format error: {0}")]
    Codec(#[from] CodecError),
}

pub type Result<T> = std::result::Result<T, ClientError>;
