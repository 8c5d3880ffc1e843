//! Benchmark of the report path: encoding plus lock-free buffer admission.
//!
//! Run with: cargo bench -p span_reporter --bench report_throughput

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use span_reporter::{AsyncReporter, BoundedBuffer, EncodedSpan, Encoding, Endpoint, NoopSender, Span, SpanKind};
use std::sync::Arc;
use std::time::Duration;

const SPANS_PER_ITER: u64 = 1_000;

fn sample_span(id: u64) -> Span {
    let mut span = Span::new(0x463a_c35c_9f64_13ad_48485a3953bb6124, id, "get /api/users")
        .with_parent(0x48485a3953bb6124)
        .with_kind(SpanKind::Server)
        .with_timing(1_700_000_000_000_000, 1_250)
        .with_local_endpoint(Endpoint::new("frontend").with_port(8080));
    span.set_tag("http.method", "GET");
    span.set_tag("http.path", "/api/users");
    span
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");
    group.throughput(Throughput::Elements(1));
    let span = sample_span(1);

    for encoding in [Encoding::Json, Encoding::Proto3, Encoding::Thrift] {
        group.bench_with_input(BenchmarkId::from_parameter(encoding), &encoding, |b, encoding| {
            b.iter(|| encoding.encode(black_box(&span)));
        });
    }
    group.finish();
}

fn bench_buffer(c: &mut Criterion) {
    let mut group = c.benchmark_group("buffer");
    group.throughput(Throughput::Elements(SPANS_PER_ITER));
    let encoded = EncodedSpan::new(vec![0u8; 200]);

    group.bench_function("offer_drain", |b| {
        let buffer = BoundedBuffer::new(10_000, 1024 * 1024);
        b.iter(|| {
            for _ in 0..SPANS_PER_ITER {
                buffer.offer(encoded.clone());
            }
            while !buffer.drain_message(Encoding::Json, 64 * 1024).is_empty() {}
        });
    });
    group.finish();
}

fn bench_report(c: &mut Criterion) {
    let mut group = c.benchmark_group("report");
    group.throughput(Throughput::Elements(SPANS_PER_ITER));
    let runtime = tokio::runtime::Runtime::new().unwrap();

    for encoding in [Encoding::Json, Encoding::Proto3] {
        let reporter = runtime.block_on(async {
            AsyncReporter::builder(Arc::new(NoopSender::new(encoding)))
                .message_timeout(Duration::from_millis(10))
                .queued_max_spans(100_000)
                .queued_max_bytes(64 * 1024 * 1024)
                .build()
                .unwrap()
        });
        let spans: Vec<Span> = (0..SPANS_PER_ITER).map(sample_span).collect();

        group.bench_function(BenchmarkId::new("noop_sender", encoding), |b| {
            b.to_async(&runtime).iter(|| async {
                for span in &spans {
                    reporter.report(span).await.unwrap();
                }
            });
        });
        runtime.block_on(reporter.close());
    }
    group.finish();
}

criterion_group!(benches, bench_encode, bench_buffer, bench_report);
criterion_main!(benches);
