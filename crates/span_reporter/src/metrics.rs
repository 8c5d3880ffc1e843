use crate::error::SendError;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Sink for reporter counters and gauges.
///
/// Called from producer tasks and the flush task concurrently, so
/// implementations must be cheap and non-blocking.
pub trait ReporterMetrics: Send + Sync {
    /// A message was accepted by the sender
    fn increment_messages(&self);

    /// A message failed to send; its spans are counted separately
    fn increment_messages_dropped(&self, cause: &SendError);

    /// Encoded size of a message that was sent
    fn increment_message_bytes(&self, quantity: usize);

    /// Spans that passed encoding
    fn increment_spans(&self, quantity: usize);

    /// Encoded size of spans that passed encoding
    fn increment_span_bytes(&self, quantity: usize);

    /// Spans lost for any reason (encoding, capacity, size, send failure, shutdown)
    fn increment_spans_dropped(&self, quantity: usize);

    fn update_queued_spans(&self, update: usize);

    fn update_queued_bytes(&self, update: usize);
}

/// Discards every update
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl ReporterMetrics for NoopMetrics {
    fn increment_messages(&self) {}
    fn increment_messages_dropped(&self, _cause: &SendError) {}
    fn increment_message_bytes(&self, _quantity: usize) {}
    fn increment_spans(&self, _quantity: usize) {}
    fn increment_span_bytes(&self, _quantity: usize) {}
    fn increment_spans_dropped(&self, _quantity: usize) {}
    fn update_queued_spans(&self, _update: usize) {}
    fn update_queued_bytes(&self, _update: usize) {}
}

/// Thread-safe in-process metrics (uses atomics)
#[derive(Debug, Default)]
pub struct InMemoryReporterMetrics {
    messages: AtomicU64,
    messages_dropped: AtomicU64,
    message_bytes: AtomicU64,
    spans: AtomicU64,
    span_bytes: AtomicU64,
    spans_dropped: AtomicU64,
    queued_spans: AtomicUsize,
    queued_bytes: AtomicUsize,
    dropped_by_cause: Mutex<HashMap<&'static str, u64>>,
}

impl InMemoryReporterMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> u64 {
        self.messages.load(Ordering::Relaxed)
    }

    pub fn messages_dropped(&self) -> u64 {
        self.messages_dropped.load(Ordering::Relaxed)
    }

    /// Failed messages grouped by [`SendError::kind`]
    pub fn messages_dropped_by_cause(&self) -> HashMap<&'static str, u64> {
        self.dropped_by_cause.lock().clone()
    }

    pub fn message_bytes(&self) -> u64 {
        self.message_bytes.load(Ordering::Relaxed)
    }

    pub fn spans(&self) -> u64 {
        self.spans.load(Ordering::Relaxed)
    }

    pub fn span_bytes(&self) -> u64 {
        self.span_bytes.load(Ordering::Relaxed)
    }

    pub fn spans_dropped(&self) -> u64 {
        self.spans_dropped.load(Ordering::Relaxed)
    }

    pub fn queued_spans(&self) -> usize {
        self.queued_spans.load(Ordering::Relaxed)
    }

    pub fn queued_bytes(&self) -> usize {
        self.queued_bytes.load(Ordering::Relaxed)
    }

    /// Resets every counter and gauge to zero.
    pub fn clear(&self) {
        for counter in [
            &self.messages,
            &self.messages_dropped,
            &self.message_bytes,
            &self.spans,
            &self.span_bytes,
            &self.spans_dropped,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        self.queued_spans.store(0, Ordering::Relaxed);
        self.queued_bytes.store(0, Ordering::Relaxed);
        self.dropped_by_cause.lock().clear();
    }
}

impl ReporterMetrics for InMemoryReporterMetrics {
    fn increment_messages(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
    }

    fn increment_messages_dropped(&self, cause: &SendError) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
        *self.dropped_by_cause.lock().entry(cause.kind()).or_default() += 1;
    }

    fn increment_message_bytes(&self, quantity: usize) {
        self.message_bytes.fetch_add(quantity as u64, Ordering::Relaxed);
    }

    fn increment_spans(&self, quantity: usize) {
        self.spans.fetch_add(quantity as u64, Ordering::Relaxed);
    }

    fn increment_span_bytes(&self, quantity: usize) {
        self.span_bytes.fetch_add(quantity as u64, Ordering::Relaxed);
    }

    fn increment_spans_dropped(&self, quantity: usize) {
        self.spans_dropped.fetch_add(quantity as u64, Ordering::Relaxed);
    }

    fn update_queued_spans(&self, update: usize) {
        self.queued_spans.store(update, Ordering::Relaxed);
    }

    fn update_queued_bytes(&self, update: usize) {
        self.queued_bytes.store(update, Ordering::Relaxed);
    }
}
