//! # Span Reporter Demo
//!
//! Several producer tasks report spans concurrently through one
//! `AsyncReporter`, which batches them into messages for a Zipkin collector
//! (or a local file when no endpoint is given). The reporter is then closed
//! and its metrics are printed.
//!
//! ## Running
//!
//! ```bash
//! # Write JSON messages to ./spans.json
//! cargo run -p span_reporter --bin demo --release
//!
//! # Send proto3 messages to a local Zipkin
//! cargo run -p span_reporter --bin demo --release -- \
//!     --endpoint http://localhost:9411/api/v2/spans --encoding proto3
//!
//! # Quick mode (2 producers, 50 spans each), with debug logging
//! RUST_LOG=span_reporter=debug cargo run -p span_reporter --bin demo -- --quick
//! ```

use rand::Rng;
use span_reporter::{
    AsyncReporter, Encoding, Endpoint, FileSender, HttpSender, InMemoryReporterMetrics, ReporterConfig, SenderBoxed,
    Span, SpanKind,
};
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

struct Args {
    endpoint: Option<String>,
    file: String,
    encoding: Encoding,
    producers: usize,
    spans: usize,
}

fn parse_args() -> Result<Args, Box<dyn std::error::Error>> {
    let mut args = Args {
        endpoint: None,
        file: "spans.json".to_string(),
        encoding: Encoding::Json,
        producers: 8,
        spans: 500,
    };
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        let mut value = || iter.next().ok_or_else(|| format!("{arg} needs a value"));
        match arg.as_str() {
            "--endpoint" => args.endpoint = Some(value()?),
            "--file" => args.file = value()?,
            "--encoding" => args.encoding = value()?.parse()?,
            "--producers" => args.producers = value()?.parse()?,
            "--spans" => args.spans = value()?.parse()?,
            "--quick" => {
                args.producers = 2;
                args.spans = 50;
            }
            other => return Err(format!("unknown argument {other}").into()),
        }
    }
    Ok(args)
}

// Simulated service operations
const OPERATIONS: [(&str, Option<SpanKind>); 6] = [
    ("get /api/users", Some(SpanKind::Server)),
    ("select users", Some(SpanKind::Client)),
    ("cache get", Some(SpanKind::Client)),
    ("publish user.updated", Some(SpanKind::Producer)),
    ("validate input", None),
    ("render response", None),
];

fn make_span(producer_id: usize, seq: usize, trace_id: u128, parent_id: Option<u64>) -> Span {
    let mut rng = rand::thread_rng();
    let (name, kind) = OPERATIONS[seq % OPERATIONS.len()];
    let duration = rng.gen_range(50..20_000);
    let timestamp = span_reporter::span::now_micros().saturating_sub(duration);

    let mut span = Span::new(trace_id, rng.gen_range(1..=u64::MAX), name)
        .with_timing(timestamp, duration)
        .with_local_endpoint(
            Endpoint::new(format!("service-{}", producer_id % 4))
                .with_ipv4(Ipv4Addr::new(10, 0, 0, (producer_id % 250) as u8 + 1)),
        );
    if let Some(parent_id) = parent_id {
        span = span.with_parent(parent_id);
    }
    if let Some(kind) = kind {
        span = span.with_kind(kind);
        span = span.with_remote_endpoint(Endpoint::new("backend").with_port(8080));
    }
    span.set_tag("producer", producer_id.to_string());
    if rng.gen_bool(0.1) {
        span.set_tag("error", "simulated failure");
    }
    span
}

async fn run_producer(producer_id: usize, span_count: usize, reporter: Arc<AsyncReporter>) -> usize {
    let mut reported = 0;
    let mut trace_id = 0u128;
    let mut root_id = 0u64;

    for seq in 0..span_count {
        // A new trace every 5 spans; the rest are children of its root
        let parent_id = if seq % 5 == 0 {
            trace_id = rand::random::<u128>().max(1);
            None
        } else {
            Some(root_id)
        };
        let span = make_span(producer_id, seq, trace_id, parent_id);
        if parent_id.is_none() {
            root_id = span.id;
        }

        match reporter.report(&span).await {
            Ok(()) => reported += 1,
            Err(e) => {
                warn!(producer_id, error = %e, "report rejected");
                break;
            }
        }
        if seq % 50 == 49 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
    reported
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = parse_args()?;
    let sender: Arc<dyn SenderBoxed> = match &args.endpoint {
        Some(endpoint) => Arc::new(HttpSender::builder(endpoint.as_str()).encoding(args.encoding).build()?),
        None => Arc::new(FileSender::new(&args.file, args.encoding)),
    };
    if let Err(e) = sender.check_boxed().await {
        warn!(sender = %sender, error = %e, "sender check failed, spans will be dropped");
    }

    let metrics = Arc::new(InMemoryReporterMetrics::new());
    let reporter = Arc::new(
        AsyncReporter::builder(Arc::clone(&sender))
            .metrics(metrics.clone())
            .config(ReporterConfig::low_latency().with_message_max_bytes(64 * 1024))
            .build()?,
    );
    info!(
        sender = %sender,
        encoding = %reporter.encoding(),
        producers = args.producers,
        spans_per_producer = args.spans,
        "starting demo"
    );

    let started = Instant::now();
    let tasks: Vec<_> = (0..args.producers)
        .map(|producer_id| tokio::spawn(run_producer(producer_id, args.spans, Arc::clone(&reporter))))
        .collect();
    let mut reported = 0;
    for task in tasks {
        reported += task.await?;
    }

    reporter.close().await;
    sender.close();
    let elapsed = started.elapsed();

    println!("\nSpan reporter demo ({sender})");
    println!("  reported spans:     {reported:>10}");
    println!("  encoded spans:      {:>10}", metrics.spans());
    println!("  encoded bytes:      {:>10}", metrics.span_bytes());
    println!("  messages sent:      {:>10}", metrics.messages());
    println!("  message bytes:      {:>10}", metrics.message_bytes());
    println!("  messages failed:    {:>10}", metrics.messages_dropped());
    for (cause, count) in metrics.messages_dropped_by_cause() {
        println!("    {cause:<18}{count:>10}");
    }
    println!("  spans dropped:      {:>10}", metrics.spans_dropped());
    println!(
        "  elapsed:            {:>10.1?} ({:.0} spans/s)",
        elapsed,
        reported as f64 / elapsed.as_secs_f64()
    );
    Ok(())
}
