//! Error types for span reporting.

use std::time::Duration;
use thiserror::Error;

/// A span could not be turned into wire bytes.
#[derive(Debug, Error)]
pub enum EncodeError {
    /// JSON serialization failed
    #[error("json serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Zipkin treats an all-zero trace or span id as absent
    #[error("span {field} must be non-zero")]
    MissingId { field: &'static str },

    /// A length-prefixed field does not fit its i32 length
    #[error("{field} is too long to encode ({len} bytes)")]
    FieldTooLong { field: &'static str, len: usize },
}

/// Errors returned by [`Sender`](crate::Sender) implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SendError {
    /// Transport-layer error (network, broker)
    #[error("transport error: {0}")]
    Transport(String),

    /// The collector answered with a non-success status
    #[error("collector returned HTTP {status}")]
    Http { status: u16 },

    /// The message exceeds what the sender accepts
    #[error("message of {size} bytes exceeds the maximum of {max} bytes")]
    MessageTooLarge { size: usize, max: usize },

    /// Local I/O failure (file sender, compression)
    #[error("i/o error: {0}")]
    Io(String),

    /// The sender has been closed
    #[error("sender is closed")]
    Closed,
}

impl SendError {
    /// Stable, low-cardinality label used as the metrics cause.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::Http { .. } => "http",
            Self::MessageTooLarge { .. } => "message_too_large",
            Self::Io(_) => "io",
            Self::Closed => "closed",
        }
    }

    /// Returns `true` if retrying the same message can never succeed.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::MessageTooLarge { .. } | Self::Closed)
    }
}

impl From<std::io::Error> for SendError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// The only error surfaced by [`AsyncReporter::report`](crate::AsyncReporter::report).
///
/// Encoding failures, full queues and transport failures are counted as
/// drops instead; a closed reporter is caller misuse and is reported back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReportError {
    /// The reporter has been closed
    #[error("reporter is closed")]
    Closed,
}

/// Invalid reporter or sender configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A size option must be positive
    #[error("{option} must be greater than zero")]
    ZeroSize { option: &'static str },

    /// The close timeout must be positive
    #[error("close timeout must be greater than zero (got {0:?})")]
    ZeroCloseTimeout(Duration),

    /// The encoding is not one of JSON, PROTO3, THRIFT
    #[error("unknown encoding: {0}")]
    UnknownEncoding(String),

    /// An explicit encoding does not match what the sender transmits
    #[error("encoding {requested} does not match sender encoding {sender}")]
    EncodingMismatch {
        requested: crate::Encoding,
        sender: crate::Encoding,
    },

    /// A flush task is needed but no Tokio runtime is running
    #[error("a Tokio runtime is required when message timeout is non-zero")]
    NoRuntime,

    /// The sender endpoint cannot be used
    #[error("invalid endpoint {endpoint}: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    /// A configuration document could not be parsed
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
}
