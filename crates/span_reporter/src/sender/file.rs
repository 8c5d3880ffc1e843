use super::{ensure_fits, CheckResult, Sender};
use crate::encoding::{EncodedSpan, Encoding};
use crate::error::SendError;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::AsyncWriteExt;

const DEFAULT_MESSAGE_MAX_BYTES: usize = 5 * 1024 * 1024;

/// Appends each message to a local file, for development.
///
/// JSON messages are written one per line; binary encodings are appended as-is.
#[derive(Debug)]
pub struct FileSender {
    path: PathBuf,
    encoding: Encoding,
    message_max_bytes: usize,
    closed: AtomicBool,
}

impl FileSender {
    pub fn new(path: impl Into<PathBuf>, encoding: Encoding) -> Self {
        Self {
            path: path.into(),
            encoding,
            message_max_bytes: DEFAULT_MESSAGE_MAX_BYTES,
            closed: AtomicBool::new(false),
        }
    }

    pub fn with_message_max_bytes(mut self, bytes: usize) -> Self {
        self.message_max_bytes = bytes;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> std::io::Result<tokio::fs::File> {
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
    }
}

impl fmt::Display for FileSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileSender{{path={}}}", self.path.display())
    }
}

impl Sender for FileSender {
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
        let mut message = self.encoding.encode_list(&spans);
        ensure_fits(message.len(), self.message_max_bytes)?;
        if self.encoding == Encoding::Json {
            message.push(b'\n');
        }

        let mut file = self.open().await?;
        file.write_all(&message).await?;
        file.flush().await?;
        Ok(())
    }

    async fn check(&self) -> CheckResult {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }
        self.open().await?;
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

/// Sender that discards all messages (for benchmarking)
#[derive(Debug, Clone, Copy)]
pub struct NoopSender {
    encoding: Encoding,
    message_max_bytes: usize,
}

impl NoopSender {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            message_max_bytes: DEFAULT_MESSAGE_MAX_BYTES,
        }
    }

    pub fn with_message_max_bytes(mut self, bytes: usize) -> Self {
        self.message_max_bytes = bytes;
        self
    }
}

impl Default for NoopSender {
    fn default() -> Self {
        Self::new(Encoding::Json)
    }
}

impl fmt::Display for NoopSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("NoopSender")
    }
}

impl Sender for NoopSender {
    fn encoding(&self) -> Encoding {
        self.encoding
    }

    fn message_max_bytes(&self) -> usize {
        self.message_max_bytes
    }

    async fn send(&self, _spans: Vec<EncodedSpan>) -> Result<(), SendError> {
        Ok(())
    }

    async fn check(&self) -> CheckResult {
        Ok(())
    }

    fn close(&self) {}
}
