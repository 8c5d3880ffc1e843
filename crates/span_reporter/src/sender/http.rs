use super::{ensure_fits, CheckResult, Sender};
use crate::encoding::{EncodedSpan, Encoding};
use crate::error::{ConfigError, SendError};
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, Url};
use std::fmt;
use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::debug;

/// Builder for [`HttpSender`]
#[derive(Debug, Clone)]
pub struct HttpSenderBuilder {
    endpoint: String,
    encoding: Encoding,
    message_max_bytes: usize,
    compression: bool,
    timeout: Duration,
}

impl HttpSenderBuilder {
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    /// Largest request body before compression. Default: 5 MiB
    pub fn message_max_bytes(mut self, bytes: usize) -> Self {
        self.message_max_bytes = bytes;
        self
    }

    /// Gzip request bodies. Default: on
    pub fn compression(mut self, enabled: bool) -> Self {
        self.compression = enabled;
        self
    }

    /// Per-request timeout. Default: 10s
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> Result<HttpSender, ConfigError> {
        let invalid = |reason: String| ConfigError::InvalidEndpoint {
            endpoint: redact_str(&self.endpoint),
            reason,
        };
        let url = Url::parse(&self.endpoint).map_err(|e| invalid(e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {}", url.scheme())));
        }
        if self.message_max_bytes == 0 {
            return Err(ConfigError::ZeroSize {
                option: "message_max_bytes",
            });
        }
        let client = Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| invalid(e.to_string()))?;

        Ok(HttpSender {
            summary: redact(&url),
            client,
            url,
            encoding: self.encoding,
            message_max_bytes: self.message_max_bytes,
            compression: self.compression,
            closed: AtomicBool::new(false),
        })
    }
}

/// Posts messages to a Zipkin-compatible HTTP collector
/// (for example `http://localhost:9411/api/v2/spans`).
#[derive(Debug)]
pub struct HttpSender {
    client: Client,
    url: Url,
    summary: String,
    encoding: Encoding,
    message_max_bytes: usize,
    compression: bool,
    closed: AtomicBool,
}

impl HttpSender {
    pub fn builder(endpoint: impl Into<String>) -> HttpSenderBuilder {
        HttpSenderBuilder {
            endpoint: endpoint.into(),
            encoding: Encoding::Json,
            message_max_bytes: 5 * 1024 * 1024,
            compression: true,
            timeout: Duration::from_secs(10),
        }
    }

    async fn post(&self, body: Vec<u8>) -> Result<(), SendError> {
        let mut request = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, self.encoding.media_type());
        let body = if self.compression {
            request = request.header(CONTENT_ENCODING, "gzip");
            gzip(&body)?
        } else {
            body
        };

        let response = request
            .body(body)
            .send()
            .await
            .map_err(|e| SendError::Transport(e.without_url().to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(SendError::Http {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}

fn gzip(data: &[u8]) -> Result<Vec<u8>, SendError> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::fast());
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

/// Endpoint without userinfo, query or fragment
fn redact(url: &Url) -> String {
    let mut url = url.clone();
    // Fails only for URLs that cannot carry credentials
    let _ = url.set_username("");
    let _ = url.set_password(None);
    url.set_query(None);
    url.set_fragment(None);
    url.to_string()
}

fn redact_str(endpoint: &str) -> String {
    Url::parse(endpoint).map_or_else(|_| "<unparsable>".to_string(), |url| redact(&url))
}

impl fmt::Display for HttpSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HttpSender{{endpoint={}}}", self.summary)
    }
}

impl Sender for HttpSender {
    fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn message_max_bytes(&self) -> usize {
        self.message_max_bytes
    }

    async fn send(&self, spans: Vec<EncodedSpan>) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }
        let message = self.encoding.encode_list(&spans);
        ensure_fits(message.len(), self.message_max_bytes)?;
        debug!(spans = spans.len(), bytes = message.len(), "posting message");
        self.post(message).await
    }

    async fn check(&self) -> CheckResult {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }
        self.post(self.encoding.encode_list(&[])).await
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
