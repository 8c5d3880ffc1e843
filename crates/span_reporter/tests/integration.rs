use span_reporter::{
    AsyncReporter, EncodedSpan, Encoding, InMemoryReporterMetrics, ReportError, ReporterConfig, ReporterState,
    SendError, Sender, Span,
};
use span_reporter::sender::CheckResult;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Records every message it is given
struct RecordingSender {
    message_max_bytes: usize,
    messages: std::sync::Mutex<Vec<Vec<EncodedSpan>>>,
}

impl RecordingSender {
    fn new(message_max_bytes: usize) -> Self {
        Self {
            message_max_bytes,
            messages: std::sync::Mutex::new(Vec::new()),
        }
    }

    fn message_count(&self) -> usize {
        self.messages.lock().unwrap().len()
    }

    fn messages(&self) -> Vec<Vec<EncodedSpan>> {
        self.messages.lock().unwrap().clone()
    }

    fn span_ids(&self) -> Vec<u64> {
        self.messages().iter().flatten().map(span_id).collect()
    }
}

impl fmt::Display for RecordingSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RecordingSender")
    }
}

// Rust 2024: Use native async fn in traits
impl Sender for RecordingSender {
    fn encoding(&self) -> Encoding {
        Encoding::Json
    }

    fn message_max_bytes(&self) -> usize {
        self.message_max_bytes
    }

    async fn send(&self, spans: Vec<EncodedSpan>) -> Result<(), SendError> {
        self.messages.lock().unwrap().push(spans);
        Ok(())
    }

    async fn check(&self) -> CheckResult {
        Ok(())
    }

    fn close(&self) {}
}

/// Fails every send
struct FailingSender;

impl fmt::Display for FailingSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FailingSender")
    }
}

impl Sender for FailingSender {
    fn encoding(&self) -> Encoding {
        Encoding::Json
    }

    fn message_max_bytes(&self) -> usize {
        1024 * 1024
    }

    async fn send(&self, _spans: Vec<EncodedSpan>) -> Result<(), SendError> {
        Err(SendError::Http { status: 503 })
    }

    async fn check(&self) -> CheckResult {
        Err(SendError::Transport("connection refused".into()))
    }

    fn close(&self) {}
}

// Slow sender for close timeout testing
struct SlowSender {
    delay: Duration,
    sent: std::sync::Mutex<usize>,
}

impl SlowSender {
    fn new(delay: Duration) -> Self {
        Self {
            delay,
            sent: std::sync::Mutex::new(0),
        }
    }
}

impl fmt::Display for SlowSender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SlowSender")
    }
}

impl Sender for SlowSender {
    fn encoding(&self) -> Encoding {
        Encoding::Json
    }

    fn message_max_bytes(&self) -> usize {
        1024 * 1024
    }

    async fn send(&self, spans: Vec<EncodedSpan>) -> Result<(), SendError> {
        tokio::time::sleep(self.delay).await;
        *self.sent.lock().unwrap() += spans.len();
        Ok(())
    }

    async fn check(&self) -> CheckResult {
        Ok(())
    }

    fn close(&self) {}
}

/// A span whose JSON encoding is exactly 100 bytes
fn fixed_span(id: u64) -> Span {
    Span::new(1, id, "x".repeat(36)).with_timing(0, 0)
}

fn span_id(encoded: &EncodedSpan) -> u64 {
    let value: serde_json::Value = serde_json::from_slice(encoded).unwrap();
    u64::from_str_radix(value["id"].as_str().unwrap(), 16).unwrap()
}

#[tokio::test]
async fn test_no_loss_before_threshold() {
    let sender = Arc::new(RecordingSender::new(1024 * 1024));
    let reporter = AsyncReporter::builder(sender.clone())
        .message_timeout(Duration::from_secs(30))
        .build()
        .unwrap();

    for id in 1..=100 {
        reporter.report(&fixed_span(id)).await.unwrap();
    }
    // Far below the message limit and the timeout: nothing sent yet
    assert_eq!(sender.message_count(), 0);
    assert_eq!(reporter.queued_spans(), 100);

    reporter.close().await;
    assert_eq!(sender.span_ids(), (1..=100).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_messages_never_exceed_max_bytes() {
    let sender = Arc::new(RecordingSender::new(512));
    let reporter = AsyncReporter::builder(sender.clone())
        .message_timeout(Duration::from_millis(10))
        .build()
        .unwrap();

    for id in 1..=50 {
        reporter.report(&fixed_span(id)).await.unwrap();
    }
    reporter.close().await;

    let messages = sender.messages();
    assert!(messages.len() >= 10);
    for message in &messages {
        assert!(Encoding::Json.message_size_in_bytes(message) <= 512);
    }
    assert_eq!(sender.span_ids(), (1..=50).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_threshold_wakes_flush_task_before_timeout() {
    let sender = Arc::new(RecordingSender::new(512));
    let reporter = AsyncReporter::builder(sender.clone())
        .message_timeout(Duration::from_secs(30))
        .build()
        .unwrap();

    // Six 100-byte spans do not fit one 512-byte message
    for id in 1..=6 {
        reporter.report(&fixed_span(id)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert!(sender.message_count() >= 1);
    reporter.close().await;
    assert_eq!(sender.span_ids().len(), 6);
}

#[tokio::test]
async fn test_report_after_close_is_rejected() {
    let sender = Arc::new(RecordingSender::new(1024 * 1024));
    let metrics = Arc::new(InMemoryReporterMetrics::new());
    let reporter = AsyncReporter::builder(sender.clone())
        .metrics(metrics.clone())
        .message_timeout(Duration::from_millis(10))
        .build()
        .unwrap();

    reporter.report(&fixed_span(1)).await.unwrap();
    reporter.close().await;
    assert_eq!(reporter.state(), ReporterState::Closed);
    let sent = sender.message_count();

    assert_eq!(reporter.report(&fixed_span(2)).await, Err(ReportError::Closed));
    assert_eq!(metrics.spans_dropped(), 1);

    // No background flush runs after close
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(sender.message_count(), sent);
    assert_eq!(sender.span_ids(), vec![1]);
}

#[tokio::test]
async fn test_synchronous_mode_sends_exactly_up_to_boundary() {
    let sender = Arc::new(RecordingSender::new(1024 * 1024));
    let reporter = AsyncReporter::builder(sender.clone())
        .config(ReporterConfig::synchronous().with_message_max_bytes(512))
        .build()
        .unwrap();
    assert_eq!(Encoding::Json.encode(&fixed_span(1)).unwrap().len(), 100);

    // Five spans frame to 506 bytes: still below the limit
    for id in 1..=5 {
        reporter.report(&fixed_span(id)).await.unwrap();
    }
    assert_eq!(sender.message_count(), 0);

    // The sixth crosses 512 and is sent inline, before report returns
    reporter.report(&fixed_span(6)).await.unwrap();
    let messages = sender.messages();
    assert_eq!(messages.len(), 1);
    let ids: Vec<u64> = messages[0].iter().map(span_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(reporter.queued_spans(), 1);

    reporter.flush().await;
    assert_eq!(sender.span_ids(), vec![1, 2, 3, 4, 5, 6]);
}

#[tokio::test]
async fn test_queue_rejects_newest_when_full() {
    let sender = Arc::new(RecordingSender::new(1024 * 1024));
    let metrics = Arc::new(InMemoryReporterMetrics::new());
    let reporter = AsyncReporter::builder(sender.clone())
        .metrics(metrics.clone())
        .config(ReporterConfig::synchronous().with_queued_max_spans(10))
        .build()
        .unwrap();

    for id in 1..=11 {
        reporter.report(&fixed_span(id)).await.unwrap();
    }
    assert_eq!(metrics.spans(), 11);
    assert_eq!(metrics.spans_dropped(), 1);
    assert_eq!(reporter.queued_spans(), 10);

    reporter.close().await;
    assert_eq!(sender.span_ids(), (1..=10).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_failing_sender_does_not_stop_reporter() {
    let metrics = Arc::new(InMemoryReporterMetrics::new());
    let reporter = AsyncReporter::builder(Arc::new(FailingSender))
        .metrics(metrics.clone())
        .message_timeout(Duration::from_millis(10))
        .build()
        .unwrap();

    for id in 1..=10 {
        reporter.report(&fixed_span(id)).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(reporter.state(), ReporterState::Running);
    assert!(reporter.check().await.is_err());

    // Still accepting and attempting
    for id in 11..=20 {
        reporter.report(&fixed_span(id)).await.unwrap();
    }
    reporter.close().await;

    assert_eq!(metrics.messages(), 0);
    assert!(metrics.messages_dropped() >= 2);
    assert_eq!(metrics.messages_dropped_by_cause().get("http"), Some(&metrics.messages_dropped()));
    assert_eq!(metrics.spans_dropped(), 20);
}

#[tokio::test]
async fn test_close_is_bounded_by_close_timeout() {
    let sender = Arc::new(SlowSender::new(Duration::from_secs(5)));
    let metrics = Arc::new(InMemoryReporterMetrics::new());
    let reporter = AsyncReporter::builder(sender.clone())
        .metrics(metrics.clone())
        .message_timeout(Duration::from_millis(10))
        .close_timeout(Duration::from_millis(500))
        .build()
        .unwrap();

    for id in 1..=5 {
        reporter.report(&fixed_span(id)).await.unwrap();
    }
    // Let the flush task start sending
    tokio::time::sleep(Duration::from_millis(50)).await;

    let started = Instant::now();
    reporter.close().await;
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(450), "closed too early: {elapsed:?}");
    assert!(elapsed < Duration::from_millis(1500), "closed too late: {elapsed:?}");
    assert_eq!(reporter.state(), ReporterState::Closed);
    assert_eq!(metrics.spans_dropped(), 5);
    assert_eq!(*sender.sent.lock().unwrap(), 0);
}

#[tokio::test]
async fn test_close_twice_is_close_once() {
    let sender = Arc::new(RecordingSender::new(1024 * 1024));
    let metrics = Arc::new(InMemoryReporterMetrics::new());
    let reporter = AsyncReporter::builder(sender.clone())
        .metrics(metrics.clone())
        .message_timeout(Duration::from_secs(30))
        .build()
        .unwrap();

    for id in 1..=3 {
        reporter.report(&fixed_span(id)).await.unwrap();
    }
    reporter.close().await;
    let messages = sender.message_count();
    let sent = metrics.messages();

    reporter.close().await;
    assert_eq!(sender.message_count(), messages);
    assert_eq!(metrics.messages(), sent);
    assert_eq!(metrics.spans_dropped(), 0);
    assert_eq!(sender.span_ids(), vec![1, 2, 3]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_producers_keep_order() {
    let sender = Arc::new(RecordingSender::new(2048));
    let reporter = Arc::new(
        AsyncReporter::builder(sender.clone())
            .message_timeout(Duration::from_millis(5))
            .build()
            .unwrap(),
    );

    let mut tasks = vec![];
    for producer_id in 0..4u64 {
        let reporter = Arc::clone(&reporter);
        tasks.push(tokio::spawn(async move {
            for seq in 0..250u64 {
                reporter.report(&fixed_span((producer_id + 1) << 48 | seq)).await.unwrap();
            }
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }
    reporter.close().await;

    let ids = sender.span_ids();
    assert_eq!(ids.len(), 1_000);
    for producer_id in 0..4u64 {
        let seqs: Vec<u64> = ids
            .iter()
            .filter(|id| *id >> 48 == producer_id + 1)
            .map(|id| id & 0xFFFF)
            .collect();
        assert_eq!(seqs, (0..250).collect::<Vec<_>>(), "producer {producer_id} out of order");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_report_racing_close_is_sent_or_counted_once() {
    let sender = Arc::new(RecordingSender::new(4096));
    let metrics = Arc::new(InMemoryReporterMetrics::new());
    let reporter = Arc::new(
        AsyncReporter::builder(sender.clone())
            .metrics(metrics.clone())
            .message_timeout(Duration::from_millis(1))
            .close_timeout(Duration::from_secs(5))
            .build()
            .unwrap(),
    );

    let mut tasks = vec![];
    for producer_id in 0..4u64 {
        let reporter = Arc::clone(&reporter);
        tasks.push(tokio::spawn(async move {
            let mut rejected = 0u64;
            for seq in 0..500u64 {
                if reporter.report(&fixed_span((producer_id + 1) << 48 | seq)).await.is_err() {
                    rejected += 1;
                }
            }
            rejected
        }));
    }
    tokio::time::sleep(Duration::from_millis(2)).await;
    reporter.close().await;

    let mut rejected = 0;
    for task in tasks {
        rejected += task.await.unwrap();
    }

    let mut ids = sender.span_ids();
    let sent = ids.len() as u64;
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len() as u64, sent, "a span was sent twice");
    assert_eq!(sent + metrics.spans_dropped(), 2_000);
    assert_eq!(metrics.spans_dropped(), rejected);
}

#[tokio::test]
async fn test_dropping_reporter_flushes_in_background() {
    let sender = Arc::new(RecordingSender::new(1024 * 1024));
    let reporter = AsyncReporter::builder(sender.clone())
        .message_timeout(Duration::from_secs(30))
        .build()
        .unwrap();

    for id in 1..=3 {
        reporter.report(&fixed_span(id)).await.unwrap();
    }
    drop(reporter);
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(sender.span_ids(), vec![1, 2, 3]);
}

#[tokio::test]
async fn test_unencodable_span_is_counted_not_surfaced() {
    let sender = Arc::new(RecordingSender::new(1024 * 1024));
    let metrics = Arc::new(InMemoryReporterMetrics::new());
    let reporter = AsyncReporter::builder(sender.clone())
        .metrics(metrics.clone())
        .config(ReporterConfig::synchronous())
        .build()
        .unwrap();

    // A zero span id cannot be encoded
    assert_eq!(reporter.report(&fixed_span(0)).await, Ok(()));
    reporter.report(&fixed_span(1)).await.unwrap();
    reporter.close().await;

    assert_eq!(metrics.spans(), 2);
    assert_eq!(metrics.span_bytes(), 100);
    assert_eq!(metrics.spans_dropped(), 1);
    assert_eq!(sender.span_ids(), vec![1]);
}

#[tokio::test]
async fn test_close_timeout_leaves_caller_flush_to_account_for_its_message() {
    let sender = Arc::new(SlowSender::new(Duration::from_millis(800)));
    let metrics = Arc::new(InMemoryReporterMetrics::new());
    let reporter = Arc::new(
        AsyncReporter::builder(sender.clone())
            .metrics(metrics.clone())
            .config(ReporterConfig::synchronous())
            .close_timeout(Duration::from_millis(200))
            .build()
            .unwrap(),
    );

    for id in 1..=3 {
        reporter.report(&fixed_span(id)).await.unwrap();
    }
    let flush = tokio::spawn({
        let reporter = Arc::clone(&reporter);
        async move { reporter.flush().await }
    });
    // Let the flush take the message
    tokio::time::sleep(Duration::from_millis(50)).await;

    reporter.close().await;
    assert_eq!(reporter.state(), ReporterState::Closed);
    assert_eq!(metrics.spans_dropped(), 0);

    flush.await.unwrap();
    assert_eq!(*sender.sent.lock().unwrap(), 3);
    assert_eq!(metrics.messages(), 1);
    assert_eq!(metrics.spans_dropped(), 0);
}

#[tokio::test]
async fn test_metrics_track_messages_and_queue() {
    let sender = Arc::new(RecordingSender::new(1024 * 1024));
    let metrics = Arc::new(InMemoryReporterMetrics::new());
    let reporter = AsyncReporter::builder(sender.clone())
        .metrics(metrics.clone())
        .config(ReporterConfig::synchronous())
        .build()
        .unwrap();

    for id in 1..=4 {
        reporter.report(&fixed_span(id)).await.unwrap();
    }
    assert_eq!(metrics.span_bytes(), 400);

    reporter.flush().await;
    assert_eq!(metrics.messages(), 1);
    // [ + 4 spans + 3 commas + ]
    assert_eq!(metrics.message_bytes(), 405);
    assert_eq!(metrics.queued_spans(), 0);
    assert_eq!(metrics.queued_bytes(), 0);
    assert!(reporter.check().await.is_ok());

    reporter.close().await;
    assert_eq!(reporter.check().await, Err(SendError::Closed));
}
