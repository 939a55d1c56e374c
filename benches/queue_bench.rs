//! Benchmarks for the orchestration hot paths.
//!
//! Benchmarks cover:
//! - Pending queue push/pop with mixed priorities
//! - Executor dispatch, with and without queueing
//! - Timing state deadline lookups
//! - Jitter sampling

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::time::Duration;

use prometheus_fleet::core::scheduler::TimingState;
use prometheus_fleet::core::{Priority, Spawn, TaskExecutor};
use prometheus_fleet::infra::queue::PendingQueue;
use prometheus_fleet::util::jitter::Jitter;

use tokio::runtime::Runtime;

#[derive(Clone)]
struct BenchSpawner;

impl Spawn for BenchSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(fut);
    }
}

// ============================================================================
// Pending Queue Benchmarks
// ============================================================================

fn bench_queue_push_pop(c: &mut Criterion) {
    let mut group = c.benchmark_group("pending_queue_push_pop");

    for size in [100u64, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut q = PendingQueue::new();
                for i in 0..size {
                    q.push((i % 4) as Priority, "bench", i);
                }
                while let Some(task) = q.pop() {
                    black_box(task.job);
                }
            });
        });
    }
    group.finish();
}

fn bench_queue_drain_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("pending_queue_drain_all");

    for size in [100u64, 1_000, 5_000] {
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let mut q = PendingQueue::new();
                for i in 0..size {
                    q.push(((i * 7) % 5) as Priority, format!("task-{i}"), i);
                }
                black_box(q.drain_all().len());
            });
        });
    }
    group.finish();
}

// ============================================================================
// Executor Benchmarks (Async)
// ============================================================================

fn bench_executor_dispatch(c: &mut Criterion) {
    let mut group = c.benchmark_group("executor_dispatch");

    for workers in [1usize, 4, 16] {
        group.throughput(Throughput::Elements(200));
        group.bench_with_input(
            BenchmarkId::from_parameter(workers),
            &workers,
            |b, &workers| {
                b.to_async(Runtime::new().unwrap()).iter(|| async move {
                    let executor = TaskExecutor::new(workers, BenchSpawner);
                    let handles: Vec<_> = (0..200u64)
                        .map(|i| executor.submit("bench", (i % 5) as Priority, async move { i * 2 }))
                        .collect();
                    let results = futures::future::join_all(handles).await;
                    black_box(results.len());
                });
            },
        );
    }
    group.finish();
}

fn bench_executor_clear_queue(c: &mut Criterion) {
    c.bench_function("executor_clear_queue_1000", |b| {
        b.to_async(Runtime::new().unwrap()).iter(|| async {
            let executor = TaskExecutor::new(1, BenchSpawner);
            let blocker = executor.submit("blocker", 0, tokio::time::sleep(Duration::from_millis(1)));
            for i in 0..1_000 {
                drop(executor.submit("queued", i, async {}));
            }
            black_box(executor.clear_queue());
            let _ = blocker.await;
        });
    });
}

// ============================================================================
// Timing Benchmarks
// ============================================================================

fn bench_timing_eligibility(c: &mut Criterion) {
    let timing = TimingState::new();
    for account in 0..1_000 {
        for category in ["scavenging", "building", "recruiting", "farming"] {
            timing.defer(
                &format!("acct-{account}"),
                category,
                0,
                Duration::from_secs(u64::from(account % 2 == 0) * 600),
            );
        }
    }

    c.bench_function("timing_is_eligible_4000", |b| {
        b.iter(|| {
            let mut eligible = 0;
            for account in 0..1_000 {
                let id = format!("acct-{account}");
                for category in ["scavenging", "building", "recruiting", "farming"] {
                    if timing.is_eligible(&id, category, 1_000) {
                        eligible += 1;
                    }
                }
            }
            black_box(eligible);
        });
    });
}

fn bench_jitter_sample(c: &mut Criterion) {
    let jitter = Jitter::new(Duration::from_secs(600), 0.2);
    c.bench_function("jitter_sample", |b| b.iter(|| black_box(jitter.sample())));
}

criterion_group!(
    benches,
    bench_queue_push_pop,
    bench_queue_drain_all,
    bench_executor_dispatch,
    bench_executor_clear_queue,
    bench_timing_eligibility,
    bench_jitter_sample,
);
criterion_main!(benches);
