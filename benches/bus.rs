//! Benchmarks for the event pipeline hot paths.
//!
//! Validates that publish stays non-blocking under load and that percentile
//! aggregation over a full history snapshot remains cheap enough for a
//! metrics endpoint.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fakeai::config::FakeAiConfig;
use fakeai::events::{Event, EventPayload};
use fakeai::pipeline::MetricsPipeline;
use fakeai::streaming::percentile;

fn bench_publish(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let _guard = rt.enter();
    let pipeline = MetricsPipeline::new(&FakeAiConfig::default());

    pipeline
        .publish(Event::new("bench-stream", EventPayload::StreamStarted {
            model: "llama3:8b".to_string(),
        }))
        .unwrap();

    c.bench_function("publish_token_event", |b| {
        b.iter(|| {
            pipeline
                .publish(black_box(Event::new(
                    "bench-stream",
                    EventPayload::TokenGenerated {
                        token_count_delta: 1,
                    },
                )))
                .unwrap();
        })
    });

    rt.block_on(pipeline.shutdown());
}

fn bench_percentiles(c: &mut Criterion) {
    let samples: Vec<f64> = (0..10_000).map(|i| (i % 997) as f64).collect();

    c.bench_function("summarize_10k_samples", |b| {
        b.iter(|| percentile::summarize(black_box(samples.clone())))
    });
}

criterion_group!(benches, bench_publish, bench_percentiles);
criterion_main!(benches);
