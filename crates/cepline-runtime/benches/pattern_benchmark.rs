//! Benchmarks for window and pattern operators
//!
//! Run with: cargo bench -p cepline-runtime
//!
//! Benchmark groups:
//! - count_windows: tumbling and sliding windows over a stream
//! - patterns: single pattern evaluation over prepared windows
//! - pipeline: window plus pattern, end to end

use cepline_runtime::event::{EventOccurrence, Item, SharedEvent, Window};
use cepline_runtime::factory;
use cepline_runtime::location::{Haversine, Point};
use cepline_runtime::pattern::{all, increasing, n_highest_values, relative_avg_distance, value_avg};
use cepline_runtime::stream::{Collector, Operator};
use cepline_runtime::window::{sliding_count_window, tumbling_count_window};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::Arc;

/// Generate readings cycling over `event_types`
fn generate_events(count: usize, event_types: &[&str]) -> Vec<EventOccurrence> {
    (0..count)
        .map(|i| {
            EventOccurrence::new(event_types[i % event_types.len()], "bench")
                .with_attribute("id", i as i64)
                .with_attribute("value", ((i * 37) % 1000) as f64)
                .with_attribute(
                    "location",
                    Point::new(38.7 + (i % 50) as f64 * 0.001, -9.1 - (i % 20) as f64 * 0.001),
                )
        })
        .collect()
}

fn generate_window(count: usize, event_types: &[&str]) -> Window {
    generate_events(count, event_types)
        .into_iter()
        .map(Arc::new)
        .collect::<Vec<SharedEvent>>()
}

fn drain<O: Operator<Item, Output = Item>>(events: &[EventOccurrence], op: O) -> usize {
    let out = Collector::new();
    factory::from_events(events.to_vec())
        .pipe(op)
        .subscribe(out.observer());
    out.len()
}

fn bench_count_windows(c: &mut Criterion) {
    let mut group = c.benchmark_group("count_windows");

    for size in [1_000, 10_000].iter() {
        let events = generate_events(*size, &["A"]);
        group.throughput(Throughput::Elements(*size as u64));

        group.bench_with_input(BenchmarkId::new("tumbling_100", size), size, |b, _| {
            b.iter(|| black_box(drain(&events, tumbling_count_window(100).unwrap())))
        });

        group.bench_with_input(BenchmarkId::new("sliding_10", size), size, |b, _| {
            b.iter(|| black_box(drain(&events, sliding_count_window(10).unwrap())))
        });
    }

    group.finish();
}

fn bench_patterns(c: &mut Criterion) {
    let mut group = c.benchmark_group("patterns");

    for size in [100, 1_000].iter() {
        let window = generate_window(*size, &["A", "B", "C"]);
        group.throughput(Throughput::Elements(*size as u64));

        let avg = value_avg(["A", "B"], "value", |v| v > 100.0, "Avg");
        group.bench_with_input(BenchmarkId::new("value_avg", size), size, |b, _| {
            b.iter(|| black_box(avg.derive(&window)))
        });

        let trend = increasing(["A"], "value", "Up");
        group.bench_with_input(BenchmarkId::new("increasing", size), size, |b, _| {
            b.iter(|| black_box(trend.derive(&window)))
        });

        let top = n_highest_values(["B"], 10, "value", "Top").unwrap();
        group.bench_with_input(BenchmarkId::new("n_highest_10", size), size, |b, _| {
            b.iter(|| black_box(top.derive(&window)))
        });

        let spread = relative_avg_distance(
            ["C"],
            "location",
            Haversine::default(),
            |d| d > 10.0,
            "Spread",
        );
        group.bench_with_input(BenchmarkId::new("relative_avg_distance", size), size, |b, _| {
            b.iter(|| black_box(spread.derive(&window)))
        });
    }

    // the conjunction grows with the product of group sizes
    for size in [9, 30].iter() {
        let window = generate_window(*size, &["A", "B", "C"]);
        let conj = all(["A", "B", "C"], "ABC").unwrap();
        group.bench_with_input(BenchmarkId::new("all_three_types", size), size, |b, _| {
            b.iter(|| black_box(conj.derive(&window)))
        });
    }

    group.finish();
}

fn bench_pipeline(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline");
    let events = generate_events(10_000, &["A", "B"]);
    group.throughput(Throughput::Elements(events.len() as u64));

    group.bench_function("tumbling_then_avg", |b| {
        b.iter(|| {
            let out = Collector::new();
            factory::from_events(events.clone())
                .pipe(tumbling_count_window(50).unwrap())
                .pipe(value_avg(["A"], "value", |v| v > 400.0, "High"))
                .subscribe(out.observer());
            black_box(out.len())
        })
    });

    group.finish();
}

criterion_group!(benches, bench_count_windows, bench_patterns, bench_pipeline);
criterion_main!(benches);
