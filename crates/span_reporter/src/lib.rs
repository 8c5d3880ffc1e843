//! Asynchronous Span Reporter
//!
//! Accepts finished spans from any number of concurrent producers, encodes
//! them (JSON, PROTO3 or THRIFT), buffers them under a span-count and a byte
//! bound, and sends them in messages to a pluggable [`Sender`] whenever a
//! message fills up or a timeout elapses.
//!
//! - Producers never wait on I/O: [`AsyncReporter::report`] encodes and
//!   enqueues, and a single background task does the sending.
//! - Nothing is retried: a full queue, an oversized span or a failed send
//!   drops spans and counts them through [`ReporterMetrics`].
//! - [`AsyncReporter::close`] is bounded by `close_timeout` and idempotent.
//!
//! # Native async traits
//!
//! [`Sender`] uses native async fn in traits; [`SenderBoxed`] is its
//! object-safe counterpart used for dynamic dispatch.

pub mod buffer;
pub mod config;
pub mod encoding;
pub mod error;
pub mod lifecycle;
pub mod metrics;
pub mod reporter;
pub mod sender;
pub mod span;

// Re-export main types
pub use buffer::{Batch, BoundedBuffer};
pub use config::ReporterConfig;
pub use encoding::{EncodedSpan, Encoding};
pub use error::{ConfigError, EncodeError, ReportError, SendError};
pub use lifecycle::ReporterState;
pub use metrics::{InMemoryReporterMetrics, NoopMetrics, ReporterMetrics};
pub use reporter::{AsyncReporter, AsyncReporterBuilder};
pub use sender::{CheckResult, FileSender, HttpSender, HttpSenderBuilder, NoopSender, Sender, SenderBoxed};
pub use span::{Annotation, Endpoint, Span, SpanKind};
