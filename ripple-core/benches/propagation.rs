//! Benchmarks for delta propagation.
//!
//! Compares the per-change cost of maintained pipelines against folding the
//! whole sequence again.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ripple_core::prelude::*;
use ripple_core::reactive::{Property, PropertyNode};
use ripple_core::sequence::ObservableVec;

fn build_source(size: usize) -> ObservableVec<i64> {
    (0..size as i64).collect()
}

fn bench_pipeline_replace(c: &mut Criterion) {
    let mut group = c.benchmark_group("pipeline_replace");

    for size in [100, 1_000, 10_000] {
        group.bench_with_input(BenchmarkId::new("incremental", size), &size, |b, &size| {
            let items = build_source(size);
            let total = items
                .as_sequence()
                .map(|v| v * 3)
                .filter(|v| v % 2 == 0)
                .sum();
            let _subscription = total.subscribe(|_| {}).unwrap();
            let mut next = 0i64;
            b.iter(|| {
                next += 1;
                items.replace(size / 2, next).unwrap();
                black_box(total.value().unwrap())
            });
        });

        group.bench_with_input(BenchmarkId::new("from_scratch", size), &size, |b, &size| {
            let items = build_source(size);
            let total = items
                .as_sequence()
                .map(|v| v * 3)
                .filter(|v| v % 2 == 0)
                .sum();
            let mut next = 0i64;
            b.iter(|| {
                next += 1;
                items.replace(size / 2, next).unwrap();
                black_box(total.value().unwrap())
            });
        });
    }

    group.finish();
}

fn bench_attach(c: &mut Criterion) {
    let mut group = c.benchmark_group("attach");

    for size in [1_000, 10_000] {
        let items = build_source(size);
        group.bench_with_input(BenchmarkId::new("count", size), &size, |b, _| {
            b.iter(|| {
                let count = items.as_sequence().count();
                let subscription = count.subscribe(|_| {}).unwrap();
                black_box(count.value().unwrap());
                drop(subscription);
            });
        });
    }

    group.finish();
}

fn bench_push(c: &mut Criterion) {
    c.bench_function("push_through_minimum", |b| {
        let items = build_source(1_000);
        let smallest = items.as_sequence().minimum();
        let _subscription = smallest.subscribe(|_| {}).unwrap();
        let mut next = 0i64;
        b.iter(|| {
            next -= 1;
            items.push(next).unwrap();
        });
    });
}

fn bench_property_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("property_chain");

    for depth in [1, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let property = Property::new(0i64);
            let mut tail = PropertyNode::new(property.clone());
            for _ in 0..depth {
                tail = tail.map(|v| v + 1);
            }
            let _subscription = tail.subscribe(|_| {}).unwrap();
            let mut next = 0i64;
            b.iter(|| {
                next += 1;
                property.set(next).unwrap();
                black_box(tail.value().unwrap())
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_pipeline_replace,
    bench_attach,
    bench_push,
    bench_property_chain
);
criterion_main!(benches);
