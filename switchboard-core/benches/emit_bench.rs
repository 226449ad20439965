//! Benchmarks for signal emission and connection management
//!
//! Run with: cargo bench -p switchboard-core --bench emit_bench

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use switchboard_core::{CollectAll, LastValue, RunAll, Signal, Slot, SyncSignal, Trackable};

// =============================================================================
// Emission
// =============================================================================

fn bench_emit(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal/emit");

    for slots in [1usize, 10, 100] {
        let signal: Signal<u64, u64, RunAll> = Signal::new();
        for i in 0..slots as u64 {
            signal.connect(move |x: &u64| x.wrapping_add(i));
        }
        group.bench_with_input(BenchmarkId::new("run_all", slots), &signal, |b, signal| {
            b.iter(|| signal.emit(black_box(&7)))
        });

        let collect: Signal<u64, u64, CollectAll> = Signal::new();
        for i in 0..slots as u64 {
            collect.connect(move |x: &u64| x.wrapping_mul(i));
        }
        group.bench_with_input(BenchmarkId::new("collect_all", slots), &collect, |b, signal| {
            b.iter(|| black_box(signal.emit(black_box(&7))))
        });

        let sync: SyncSignal<u64, u64, LastValue> = SyncSignal::new();
        for i in 0..slots as u64 {
            sync.connect(move |x: &u64| x ^ i);
        }
        group.bench_with_input(BenchmarkId::new("sync_last_value", slots), &sync, |b, signal| {
            b.iter(|| black_box(signal.emit(black_box(&7))))
        });
    }

    group.finish();
}

// =============================================================================
// Connection churn
// =============================================================================

fn bench_connect(c: &mut Criterion) {
    let mut group = c.benchmark_group("signal/connect");

    group.bench_function("connect_disconnect", |b| {
        let signal: Signal<u64, u64> = Signal::new();
        b.iter(|| {
            let conn = signal.connect(|x: &u64| *x);
            conn.disconnect();
        })
    });

    group.bench_function("connect_group_disconnect", |b| {
        let signal: Signal<u64, u64, LastValue, u32> = Signal::new();
        let mut n = 0u32;
        b.iter(|| {
            n = n.wrapping_add(1);
            let conn = signal.connect_group(n % 16, |x: &u64| *x);
            conn.disconnect();
        })
    });

    group.bench_function("tracked_connect_drop", |b| {
        let signal: Signal<u64, u64> = Signal::new();
        b.iter(|| {
            let owner = Trackable::new();
            signal.connect_slot(Slot::new(|x: &u64| *x).track(&owner));
            drop(owner);
        })
    });

    group.finish();
}

criterion_group!(benches, bench_emit, bench_connect);
criterion_main!(benches);
