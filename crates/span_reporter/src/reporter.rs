//! The asynchronous batch reporter.
//!
//! Producers call [`AsyncReporter::report`], which encodes the span and offers
//! it to a [`BoundedBuffer`]. A single flush task drains the buffer into
//! messages no larger than the effective `message_max_bytes` and hands them to
//! the sender, waking when a producer fills a message or when
//! `message_timeout` elapses. With a zero `message_timeout` there is no task:
//! the producer whose span fills a message sends it before `report` returns.

use crate::buffer::BoundedBuffer;
use crate::config::ReporterConfig;
use crate::encoding::Encoding;
use crate::error::{ConfigError, ReportError, SendError};
use crate::lifecycle::{Lifecycle, ReporterState};
use crate::metrics::{NoopMetrics, ReporterMetrics};
use crate::sender::{CheckResult, SenderBoxed};
use crate::span::Span;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Who is driving a flush, and so who accounts for a message that never completes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flusher {
    /// The flush task or `close()` itself; `close()` cancels these on timeout
    Closer,
    /// A producer or `flush()` caller, which always sees its send through
    Caller,
}

/// State shared between the reporter handle and its flush task
struct Shared {
    sender: Arc<dyn SenderBoxed>,
    encoding: Encoding,
    message_max_bytes: usize,
    message_timeout: Duration,
    close_timeout: Duration,
    buffer: BoundedBuffer,
    metrics: Arc<dyn ReporterMetrics>,
    lifecycle: Lifecycle,
    /// Signaled when pending spans fill a message
    threshold: Notify,
    /// Signaled once by `close()` or drop
    shutdown: Notify,
    /// Serializes drain + send so messages leave in buffer order
    flush_lock: tokio::sync::Mutex<()>,
    /// Spans in a message sent by a [`Flusher::Closer`] that has not completed
    in_flight: AtomicUsize,
}

impl Shared {
    /// Encodes and buffers one span. Returns `true` if a full message is now pending.
    fn enqueue(&self, span: &Span) -> bool {
        self.metrics.increment_spans(1);
        let encoded = match self.encoding.encode(span) {
            Ok(encoded) => encoded,
            Err(e) => {
                warn!(error = %e, span_id = span.id, "failed to encode span, dropping it");
                self.metrics.increment_spans_dropped(1);
                return false;
            }
        };

        let size = encoded.len();
        self.metrics.increment_span_bytes(size);

        if self.encoding.list_size_in_bytes(1, size) > self.message_max_bytes {
            debug!(
                size,
                max = self.message_max_bytes,
                "span larger than message_max_bytes, dropping it"
            );
            self.metrics.increment_spans_dropped(1);
            return false;
        }
        if !self.buffer.offer(encoded) {
            debug!(size, queued = self.buffer.len(), "queue full, dropping span");
            self.metrics.increment_spans_dropped(1);
            return false;
        }
        self.message_is_full()
    }

    /// Whether the pending spans, framed as one message, reach the message limit.
    fn message_is_full(&self) -> bool {
        let pending = self
            .encoding
            .list_size_in_bytes(self.buffer.len(), self.buffer.size_in_bytes());
        !self.buffer.is_empty() && pending >= self.message_max_bytes
    }

    fn update_queued(&self) {
        self.metrics.update_queued_spans(self.buffer.len());
        self.metrics.update_queued_bytes(self.buffer.size_in_bytes());
    }

    /// Drains one message and sends it. Returns `false` once nothing was pending.
    async fn flush_once(&self, flusher: Flusher) -> bool {
        let _flushing = self.flush_lock.lock().await;

        let batch = self
            .buffer
            .drain_message(self.encoding, self.message_max_bytes);
        self.update_queued();
        if batch.discarded > 0 {
            self.metrics.increment_spans_dropped(batch.discarded);
        }
        if batch.is_empty() {
            return batch.discarded > 0;
        }

        let span_count = batch.len();
        let message_bytes = self.sender.message_size_in_bytes(&batch.spans);
        let cancellable = flusher == Flusher::Closer;
        if cancellable {
            self.in_flight.store(span_count, Ordering::Release);
        }
        let result = self.sender.send_boxed(batch.spans).await;
        let owned = if cancellable {
            // Zero if close() gave up on this message and already counted it
            self.in_flight.swap(0, Ordering::AcqRel)
        } else {
            span_count
        };

        match result {
            Ok(()) => {
                self.metrics.increment_messages();
                self.metrics.increment_message_bytes(message_bytes);
                debug!(spans = span_count, bytes = message_bytes, "sent message");
            }
            Err(e) => {
                if e.is_terminal() {
                    error!(error = %e, spans = span_count, "sender rejected message, dropping its spans");
                } else {
                    warn!(error = %e, spans = span_count, "failed to send message, dropping its spans");
                }
                self.metrics.increment_messages_dropped(&e);
                self.metrics.increment_spans_dropped(owned);
            }
        }
        true
    }

    /// Sends messages until the buffer is empty.
    async fn flush_pending(&self, flusher: Flusher) {
        while self.flush_once(flusher).await {}
    }

    /// Sends messages while pending spans fill a whole message.
    async fn flush_full_messages(&self) {
        while self.message_is_full() && self.flush_once(Flusher::Caller).await {}
    }

    /// Counts everything still buffered, or being sent by a cancelled flush, as dropped.
    fn abandon_remaining(&self) -> usize {
        let abandoned = self.buffer.clear() + self.in_flight.swap(0, Ordering::AcqRel);
        if abandoned > 0 {
            self.metrics.increment_spans_dropped(abandoned);
        }
        self.update_queued();
        abandoned
    }
}

async fn flush_loop(shared: Arc<Shared>) {
    debug!(timeout = ?shared.message_timeout, "flush loop started");
    loop {
        let deadline = Instant::now() + shared.message_timeout;
        tokio::select! {
            biased;
            () = shared.shutdown.notified() => break,
            () = shared.threshold.notified() => {}
            () = tokio::time::sleep_until(deadline) => {}
        }
        shared.flush_pending(Flusher::Closer).await;
    }

    // Final drain
    shared.flush_pending(Flusher::Closer).await;
    shared.lifecycle.finish_close();
    debug!("flush loop exited");
}

/// Asynchronous, size- and time-bounded span reporter.
///
/// ```no_run
/// use span_reporter::{AsyncReporter, HttpSender, Span};
/// use std::sync::Arc;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let sender = HttpSender::builder("http://localhost:9411/api/v2/spans").build()?;
/// let reporter = AsyncReporter::builder(Arc::new(sender)).build()?;
///
/// let mut span = Span::new(1, 1, "get /users");
/// span.finish();
/// reporter.report(&span).await?;
///
/// reporter.close().await;
/// # Ok(())
/// # }
/// ```
pub struct AsyncReporter {
    shared: Arc<Shared>,
    flush_task: parking_lot::Mutex<Option<JoinHandle<()>>>,
}

impl AsyncReporter {
    pub fn builder(sender: Arc<dyn SenderBoxed>) -> AsyncReporterBuilder {
        AsyncReporterBuilder {
            sender,
            metrics: Arc::new(NoopMetrics),
            config: ReporterConfig::default(),
        }
    }

    /// Encodes and queues a span for sending.
    ///
    /// Spans that cannot be encoded, do not fit a message, or do not fit the
    /// queue are dropped and counted; only a closed reporter is an error.
    pub async fn report(&self, span: &Span) -> Result<(), ReportError> {
        let shared = &self.shared;
        let message_full = {
            let Some(_active) = shared.lifecycle.enter() else {
                shared.metrics.increment_spans_dropped(1);
                return Err(ReportError::Closed);
            };
            shared.enqueue(span)
        };

        if message_full {
            if shared.message_timeout.is_zero() {
                shared.flush_full_messages().await;
            } else {
                shared.threshold.notify_one();
            }
        }
        Ok(())
    }

    /// Sends everything currently buffered, one message at a time.
    pub async fn flush(&self) {
        self.shared.flush_pending(Flusher::Caller).await;
    }

    /// Delegates to the sender's health check.
    pub async fn check(&self) -> CheckResult {
        if self.state() == ReporterState::Closed {
            return Err(SendError::Closed);
        }
        self.shared.sender.check_boxed().await
    }

    /// Stops accepting spans and sends what is buffered, waiting at most
    /// `close_timeout`. Spans still unsent at the deadline are counted as dropped.
    ///
    /// Only the first call does anything; the sender is left open.
    pub async fn close(&self) {
        let shared = &self.shared;
        if !shared.lifecycle.begin_close() {
            return;
        }
        let started = Instant::now();
        let flush_task = self.flush_task.lock().take();

        let completed = match flush_task {
            Some(mut task) => {
                let joined = tokio::time::timeout(shared.close_timeout, async {
                    shared.lifecycle.wait_idle().await;
                    shared.shutdown.notify_one();
                    (&mut task).await
                })
                .await;
                match joined {
                    Ok(Ok(())) => true,
                    Ok(Err(e)) => {
                        error!(error = %e, "flush task failed");
                        false
                    }
                    Err(_) => {
                        task.abort();
                        // Returns once the task reaches its next await point
                        let _ = task.await;
                        false
                    }
                }
            }
            None => tokio::time::timeout(shared.close_timeout, async {
                shared.lifecycle.wait_idle().await;
                shared.flush_pending(Flusher::Closer).await;
            })
            .await
            .is_ok(),
        };

        let abandoned = shared.abandon_remaining();
        shared.lifecycle.finish_close();
        if abandoned > 0 {
            warn!(
                spans = abandoned,
                timeout = ?shared.close_timeout,
                completed,
                "reporter closed before all spans were sent"
            );
        }
        info!(elapsed = ?started.elapsed(), sender = %shared.sender, "reporter closed");
    }

    pub fn state(&self) -> ReporterState {
        self.shared.lifecycle.state()
    }

    pub fn metrics(&self) -> &Arc<dyn ReporterMetrics> {
        &self.shared.metrics
    }

    /// Effective limit: the smaller of the configured and the sender's maximum
    pub fn message_max_bytes(&self) -> usize {
        self.shared.message_max_bytes
    }

    pub fn encoding(&self) -> Encoding {
        self.shared.encoding
    }

    /// Spans waiting to be sent (snapshot)
    pub fn queued_spans(&self) -> usize {
        self.shared.buffer.len()
    }
}

impl std::fmt::Debug for AsyncReporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncReporter")
            .field("sender", &self.shared.sender.to_string())
            .field("state", &self.state())
            .field("buffer", &self.shared.buffer)
            .finish_non_exhaustive()
    }
}

impl Drop for AsyncReporter {
    fn drop(&mut self) {
        let shared = &self.shared;
        if !shared.lifecycle.begin_close() {
            return;
        }
        // Detach the flush task; it drains and exits on its own
        if self.flush_task.get_mut().take().is_some() {
            shared.shutdown.notify_one();
            return;
        }
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let shared = Arc::clone(shared);
                runtime.spawn(async move {
                    shared.flush_pending(Flusher::Caller).await;
                    shared.lifecycle.finish_close();
                });
            }
            Err(_) => {
                let abandoned = shared.abandon_remaining();
                shared.lifecycle.finish_close();
                if abandoned > 0 {
                    warn!(spans = abandoned, "reporter dropped outside a runtime, spans lost");
                }
            }
        }
    }
}

/// Builder for [`AsyncReporter`]
pub struct AsyncReporterBuilder {
    sender: Arc<dyn SenderBoxed>,
    metrics: Arc<dyn ReporterMetrics>,
    config: ReporterConfig,
}

impl AsyncReporterBuilder {
    pub fn metrics(mut self, metrics: Arc<dyn ReporterMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Replaces every option at once.
    pub fn config(mut self, config: ReporterConfig) -> Self {
        self.config = config;
        self
    }

    /// Requires the sender to use `encoding`; `build()` fails otherwise.
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.config.encoding = Some(encoding);
        self
    }

    pub fn message_max_bytes(mut self, bytes: usize) -> Self {
        self.config.message_max_bytes = Some(bytes);
        self
    }

    pub fn message_timeout(mut self, timeout: Duration) -> Self {
        self.config.message_timeout = timeout;
        self
    }

    pub fn close_timeout(mut self, timeout: Duration) -> Self {
        self.config.close_timeout = timeout;
        self
    }

    pub fn queued_max_spans(mut self, spans: usize) -> Self {
        self.config.queued_max_spans = spans;
        self
    }

    pub fn queued_max_bytes(mut self, bytes: usize) -> Self {
        self.config.queued_max_bytes = bytes;
        self
    }

    /// Validates the configuration and, unless synchronous, spawns the flush
    /// task on the current Tokio runtime.
    pub fn build(self) -> Result<AsyncReporter, ConfigError> {
        let config = self.config;
        config.validate()?;

        let sender_encoding = self.sender.encoding();
        if let Some(requested) = config.encoding {
            if requested != sender_encoding {
                return Err(ConfigError::EncodingMismatch {
                    requested,
                    sender: sender_encoding,
                });
            }
        }
        let sender_max = self.sender.message_max_bytes();
        if sender_max == 0 {
            return Err(ConfigError::ZeroSize {
                option: "sender message_max_bytes",
            });
        }
        let message_max_bytes = config
            .message_max_bytes
            .map_or(sender_max, |configured| configured.min(sender_max));

        let runtime = if config.is_synchronous() {
            None
        } else {
            Some(tokio::runtime::Handle::try_current().map_err(|_| ConfigError::NoRuntime)?)
        };

        let shared = Arc::new(Shared {
            sender: self.sender,
            encoding: sender_encoding,
            message_max_bytes,
            message_timeout: config.message_timeout,
            close_timeout: config.close_timeout,
            buffer: BoundedBuffer::new(config.queued_max_spans, config.queued_max_bytes),
            metrics: self.metrics,
            lifecycle: Lifecycle::new(),
            threshold: Notify::new(),
            shutdown: Notify::new(),
            flush_lock: tokio::sync::Mutex::new(()),
            in_flight: AtomicUsize::new(0),
        });

        let flush_task = runtime.map(|runtime| {
            let span = info_span!("flush_loop", sender = %shared.sender);
            runtime.spawn(flush_loop(Arc::clone(&shared)).instrument(span))
        });
        debug!(
            sender = %shared.sender,
            encoding = %sender_encoding,
            message_max_bytes,
            synchronous = flush_task.is_none(),
            "reporter started"
        );

        Ok(AsyncReporter {
            shared,
            flush_task: parking_lot::Mutex::new(flush_task),
        })
    }
}
