//! Configuration for reporter behavior.

use crate::encoding::Encoding;
use crate::error::ConfigError;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Configuration for [`AsyncReporter`](crate::AsyncReporter).
///
/// Deserializable from JSON, with durations given in milliseconds:
///
/// ```
/// use span_reporter::ReporterConfig;
///
/// let config = ReporterConfig::from_json(r#"{"encoding": "proto3", "message_timeout_ms": 0}"#).unwrap();
/// assert!(config.is_synchronous());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReporterConfig {
    /// Expected encoding; must match the sender when set.
    ///
    /// Default: the sender's encoding
    pub encoding: Option<Encoding>,

    /// Upper bound on one message, capped by the sender's own maximum.
    ///
    /// Default: the sender's maximum
    pub message_max_bytes: Option<usize>,

    /// Maximum time a span waits before its message is sent.
    /// Zero disables the flush task: messages are sent by the reporting caller.
    ///
    /// Default: 1s
    #[serde(rename = "message_timeout_ms", deserialize_with = "millis")]
    pub message_timeout: Duration,

    /// How long `close()` may spend on the final drain.
    ///
    /// Default: 1s
    #[serde(rename = "close_timeout_ms", deserialize_with = "millis")]
    pub close_timeout: Duration,

    /// Maximum number of spans waiting to be sent.
    ///
    /// Default: 10 000
    pub queued_max_spans: usize,

    /// Maximum summed encoded size of spans waiting to be sent.
    ///
    /// Default: 1 MiB
    pub queued_max_bytes: usize,
}

fn millis<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            encoding: None,
            message_max_bytes: None,
            message_timeout: Duration::from_secs(1),
            close_timeout: Duration::from_secs(1),
            queued_max_spans: 10_000,
            queued_max_bytes: 1024 * 1024,
        }
    }
}

impl ReporterConfig {
    /// Short flush interval and a small queue.
    pub fn low_latency() -> Self {
        Self {
            message_timeout: Duration::from_millis(50),
            queued_max_spans: 1_000,
            ..Self::default()
        }
    }

    /// No flush task; callers send full messages inline and `flush()` sends the rest.
    pub fn synchronous() -> Self {
        Self {
            message_timeout: Duration::ZERO,
            ..Self::default()
        }
    }

    /// Parses a JSON document; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = Some(encoding);
        self
    }

    pub fn with_message_max_bytes(mut self, bytes: usize) -> Self {
        self.message_max_bytes = Some(bytes);
        self
    }

    pub fn with_message_timeout(mut self, timeout: Duration) -> Self {
        self.message_timeout = timeout;
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout = timeout;
        self
    }

    pub fn with_queued_max_spans(mut self, spans: usize) -> Self {
        self.queued_max_spans = spans;
        self
    }

    pub fn with_queued_max_bytes(mut self, bytes: usize) -> Self {
        self.queued_max_bytes = bytes;
        self
    }

    #[inline]
    pub fn is_synchronous(&self) -> bool {
        self.message_timeout.is_zero()
    }

    /// Rejects values that would make the reporter unable to buffer or close.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.message_max_bytes == Some(0) {
            return Err(ConfigError::ZeroSize {
                option: "message_max_bytes",
            });
        }
        if self.queued_max_spans == 0 {
            return Err(ConfigError::ZeroSize {
                option: "queued_max_spans",
            });
        }
        if self.queued_max_bytes == 0 {
            return Err(ConfigError::ZeroSize {
                option: "queued_max_bytes",
            });
        }
        if self.close_timeout.is_zero() {
            return Err(ConfigError::ZeroCloseTimeout(self.close_timeout));
        }
        Ok(())
    }
}
