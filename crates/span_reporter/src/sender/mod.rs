//! Transports that deliver encoded span messages.
//!
//! [`Sender`] uses native async fn in traits (no `#[async_trait]`). The
//! reporter stores senders as `Arc<dyn SenderBoxed>`; every `Sender` gets the
//! object-safe [`SenderBoxed`] through a blanket impl.

mod file;
mod http;

pub use file::{FileSender, NoopSender};
pub use http::{HttpSender, HttpSenderBuilder};

use crate::encoding::{EncodedSpan, Encoding};
use crate::error::SendError;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

/// Outcome of a sender health check
pub type CheckResult = Result<(), SendError>;

/// Transport for lists of encoded spans.
///
/// `Display` must give a short summary safe to log: endpoint or destination,
/// never credentials.
pub trait Sender: Send + Sync + fmt::Display {
    /// Encoding every span passed to [`send`](Self::send) must use
    fn encoding(&self) -> Encoding;

    /// Largest message, framing included, this transport accepts
    fn message_max_bytes(&self) -> usize;

    /// Size of the message carrying `spans`.
    fn message_size_in_bytes(&self, spans: &[EncodedSpan]) -> usize {
        self.encoding().message_size_in_bytes(spans)
    }

    /// Sends one message. Not retried by the reporter.
    fn send(&self, spans: Vec<EncodedSpan>) -> impl Future<Output = Result<(), SendError>> + Send;

    /// Verifies the transport can currently deliver.
    fn check(&self) -> impl Future<Output = CheckResult> + Send;

    /// Releases resources; later sends fail with [`SendError::Closed`].
    fn close(&self);
}

/// Object-safe version of [`Sender`] for dynamic dispatch.
pub trait SenderBoxed: Send + Sync + fmt::Display {
    fn encoding(&self) -> Encoding;

    fn message_max_bytes(&self) -> usize;

    fn message_size_in_bytes(&self, spans: &[EncodedSpan]) -> usize;

    /// Sends one message (boxed future for object safety).
    fn send_boxed(
        &self,
        spans: Vec<EncodedSpan>,
    ) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + '_>>;

    fn check_boxed(&self) -> Pin<Box<dyn Future<Output = CheckResult> + Send + '_>>;

    fn close(&self);
}

/// Blanket implementation: any Sender can be used as SenderBoxed
impl<T: Sender> SenderBoxed for T {
    fn encoding(&self) -> Encoding {
        Sender::encoding(self)
    }

    fn message_max_bytes(&self) -> usize {
        Sender::message_max_bytes(self)
    }

    fn message_size_in_bytes(&self, spans: &[EncodedSpan]) -> usize {
        Sender::message_size_in_bytes(self, spans)
    }

    fn send_boxed(
        &self,
        spans: Vec<EncodedSpan>,
    ) -> Pin<Box<dyn Future<Output = Result<(), SendError>> + Send + '_>> {
        Box::pin(self.send(spans))
    }

    fn check_boxed(&self) -> Pin<Box<dyn Future<Output = CheckResult> + Send + '_>> {
        Box::pin(self.check())
    }

    fn close(&self) {
        Sender::close(self);
    }
}

/// Rejects messages larger than `max` before any I/O happens.
pub(crate) fn ensure_fits(size: usize, max: usize) -> Result<(), SendError> {
    if size > max {
        return Err(SendError::MessageTooLarge { size, max });
    }
    Ok(())
}
