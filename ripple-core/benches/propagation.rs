//! Write propagation benchmarks
//!
//! Measures how the cost of a signal write grows with the number of
//! subscribers and with the depth of a computed chain.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::cell::Cell;
use std::rc::Rc;

use ripple_core::{Computed, DisposeFn, Runtime};

fn fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("fan_out");

    for effects in [1usize, 10, 100, 1000] {
        group.throughput(Throughput::Elements(effects as u64));
        group.bench_with_input(BenchmarkId::from_parameter(effects), &effects, |b, &n| {
            let runtime = Runtime::new();
            let source = runtime.signal(0u64);
            let total = Rc::new(Cell::new(0u64));

            let _disposers: Vec<DisposeFn> = (0..n)
                .map(|_| {
                    let (source, total) = (source.clone(), total.clone());
                    runtime.effect(move || total.set(total.get() + source.get()))
                })
                .collect();

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                source.set(black_box(next));
            });
            black_box(total.get());
        });
    }

    group.finish();
}

fn computed_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("computed_chain");

    for depth in [1usize, 10, 100] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            let runtime = Runtime::new();
            let source = runtime.signal(0u64);

            let mut tail: Computed<u64> = runtime.computed({
                let source = source.clone();
                move || source.get() + 1
            });
            for _ in 1..depth {
                let previous = tail.clone();
                tail = runtime.computed(move || previous.get() + 1);
            }

            let seen = Rc::new(Cell::new(0u64));
            let _dispose = runtime.effect({
                let (tail, seen) = (tail.clone(), seen.clone());
                move || seen.set(tail.get())
            });

            let mut next = 0u64;
            b.iter(|| {
                next += 1;
                source.set(black_box(next));
            });
            black_box(seen.get());
        });
    }

    group.finish();
}

fn batched_writes(c: &mut Criterion) {
    c.bench_function("batched_writes_100", |b| {
        let runtime = Runtime::new();
        let signals: Vec<_> = (0..100u64).map(|i| runtime.signal(i)).collect();
        let _dispose = runtime.effect({
            let signals = signals.clone();
            move || {
                black_box(signals.iter().map(|s| s.get()).sum::<u64>());
            }
        });

        let mut round = 0u64;
        b.iter(|| {
            round += 1;
            runtime.batch(|| {
                for signal in &signals {
                    signal.set(round);
                }
            });
        });
    });
}

criterion_group!(benches, fan_out, computed_chain, batched_writes);
criterion_main!(benches);
