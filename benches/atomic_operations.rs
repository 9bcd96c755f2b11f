use coherence_bench::{CellRegistry, CoherenceState, Inducer, OpKind, DEFAULT_VALUE};
use criterion::{criterion_group, criterion_main, Criterion};
use std::sync::atomic::Ordering;

fn bench_atomics(c: &mut Criterion) {
    let mut group = c.benchmark_group("atomics");

    let cells = CellRegistry::new(1, 1, DEFAULT_VALUE);
    let cell = cells.cell(0).unwrap();
    let scratch = cells.scratch(0).unwrap();

    for op in OpKind::ALL {
        let func = op.func();
        group.bench_function(op.name(), |b| {
            b.iter(|| {
                let x = func(cell, scratch);
                cell.store(DEFAULT_VALUE, Ordering::Relaxed);
                x
            });
        });
    }

    let failing = CellRegistry::new(1, 1, -1);
    let scratch = failing.scratch(0).unwrap();
    group.bench_function("cas_fail", |b| {
        let func = OpKind::CompareAndSwap.func();
        b.iter(|| func(cell, scratch));
    });

    group.finish();
}

fn bench_modified(c: &mut Criterion) {
    let mut group = c.benchmark_group("modified");

    let cells = CellRegistry::new(1, 1, DEFAULT_VALUE);
    let cell = cells.cell(0).unwrap();
    let scratch = cells.scratch(0).unwrap();
    let inducer = Inducer::new(Some(CoherenceState::Modified), None).unwrap();

    for op in [OpKind::CompareAndSwap, OpKind::Load] {
        let func = op.func();
        group.bench_function(op.name(), |b| {
            b.iter(|| {
                inducer.induce(cell);
                let x = func(cell, scratch);
                cell.store(DEFAULT_VALUE, Ordering::Relaxed);
                x
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_atomics, bench_modified);
criterion_main!(benches);
