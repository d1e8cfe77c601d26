use criterion::{BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::{TimeDelta, Utc};
use jobforge_engine::sweep::sweep;
use jobforge_engine::{InMemoryJobStore, Job, JobStore, RetentionPolicy, Transition, WorkType, WorkUnit};

fn job() -> Job {
    Job::enqueued(WorkType::new("bench"), WorkUnit::new(|_ctx| async { Ok(()) }))
}

/// Registry pre-filled with `n` jobs, half of them finished.
fn populated(n: usize) -> InMemoryJobStore {
    let store = InMemoryJobStore::new();
    for i in 0..n {
        let id = store.insert(job()).unwrap();
        if i % 2 == 0 {
            store.transition(id, Transition::Start).unwrap();
            store.transition(id, Transition::Succeed).unwrap();
        }
    }
    store
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_insert");
    for n in [100usize, 1_000, 10_000] {
        group.throughput(Throughput::Elements(n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, &n| {
            b.iter_batched(
                || (0..n).map(|_| job()).collect::<Vec<_>>(),
                |jobs| {
                    let store = InMemoryJobStore::new();
                    for job in jobs {
                        black_box(store.insert(job).unwrap());
                    }
                },
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

fn bench_lifecycle(c: &mut Criterion) {
    let store = populated(10_000);
    c.bench_function("registry_lifecycle_10k", |b| {
        b.iter(|| {
            let id = store.insert(job()).unwrap();
            store.transition(id, Transition::Start).unwrap();
            black_box(store.transition(id, Transition::Succeed).unwrap());
            store.remove(id).unwrap();
        });
    });
}

fn bench_stats(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_stats");
    for n in [1_000usize, 10_000] {
        let store = populated(n);
        group.bench_with_input(BenchmarkId::from_parameter(n), &store, |b, store| {
            b.iter(|| black_box(store.stats().unwrap()));
        });
    }
    group.finish();
}

fn bench_sweep(c: &mut Criterion) {
    let policy = RetentionPolicy::default();
    c.bench_function("retention_sweep_10k", |b| {
        b.iter_batched(
            || populated(10_000),
            |store| black_box(sweep(&store, &policy, Utc::now() + TimeDelta::hours(2)).unwrap()),
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(benches, bench_insert, bench_lifecycle, bench_stats, bench_sweep);
criterion_main!(benches);
