//! Broadcast hub fan-out benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use parley_bench::sample_message;
use parley_core::{Hub, HubConfig};
use parley_protocol::ServerFrame;

/// Benchmark publishing one frame to many connections.
fn bench_publish(c: &mut Criterion) {
    let mut group = c.benchmark_group("publish");

    for connections in [10usize, 100, 1000, 10_000] {
        let hub = Hub::with_config(HubConfig {
            outbound_capacity: 16,
        });
        let mut receivers: Vec<_> = (0..connections).map(|_| hub.register().1).collect();
        let frame = ServerFrame::new_message(sample_message("alice_bob", 1));

        group.throughput(Throughput::Elements(connections as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(connections),
            &connections,
            |b, _| {
                b.iter(|| {
                    let report = hub.publish(black_box(frame.clone()));
                    for rx in &mut receivers {
                        while rx.try_recv().is_ok() {}
                    }
                    report
                });
            },
        );
    }

    group.finish();
}

/// Benchmark publishing when every connection is backed up.
fn bench_publish_saturated(c: &mut Criterion) {
    let hub = Hub::with_config(HubConfig {
        outbound_capacity: 1,
    });
    let _receivers: Vec<_> = (0..1000).map(|_| hub.register().1).collect();
    hub.publish(ServerFrame::pong(None));

    let frame = ServerFrame::new_message(sample_message("alice_bob", 2));
    c.bench_function("publish_saturated_1000", |b| {
        b.iter(|| hub.publish(black_box(frame.clone())));
    });
}

criterion_group!(benches, bench_publish, bench_publish_saturated);
criterion_main!(benches);
