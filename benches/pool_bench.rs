//! Benchmarks for the slotted worker pool.
//!
//! Benchmarks cover:
//! - Submission cost with and without inline payloads
//! - Fail-fast rejection on a full queue
//! - End-to-end dispatch throughput across worker counts

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::thread;

use crossbeam_channel::Receiver;

use slotted_pool::config::WorkerPoolConfig;
use slotted_pool::core::{PoolError, ThreadContext, WorkerPool};

// ============================================================================
// Task Routines
// ============================================================================

fn tally(ctx: &mut ThreadContext<u64, ()>) {
    let sum: u64 = ctx.payload().iter().map(|&b| u64::from(b)).sum();
    *ctx.resource_mut() += black_box(sum) + 1;
}

fn bench_pool(threads: usize, capacity: usize, payload: usize) -> WorkerPool<u64, ()> {
    let config = WorkerPoolConfig::new()
        .with_thread_count(threads)
        .with_queue_capacity(capacity)
        .with_max_task_payload(payload);
    WorkerPool::with_resource_factory(config, |_| 0).unwrap()
}

/// Submits `count` tasks, yielding whenever the queue pushes back, and waits
/// until all of them have run.
fn submit_and_drain(pool: &WorkerPool<u64, ()>, count: u64, payload: &[u8]) {
    let target = pool.stats().completed_tasks + count;
    for flags in 0..count {
        loop {
            match pool.add(tally, None, payload, flags) {
                Ok(()) => break,
                Err(rejected) if matches!(rejected.error(), PoolError::QueueFull) => {
                    thread::yield_now();
                }
                Err(rejected) => panic!("unexpected rejection: {rejected}"),
            }
        }
    }
    while pool.stats().completed_tasks < target {
        thread::yield_now();
    }
}

// ============================================================================
// Submission Benchmarks
// ============================================================================

fn bench_add_payload_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_payload_sizes");

    for size in [0_usize, 64, 1_024, 16_384] {
        let pool = bench_pool(2, 1_024, size);
        let payload = vec![7_u8; size];
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &payload, |b, payload| {
            b.iter(|| submit_and_drain(&pool, 256, black_box(payload)));
        });
        pool.shutdown().unwrap();
    }
    group.finish();
}

fn bench_queue_full_rejection(c: &mut Criterion) {
    fn hold(ctx: &mut ThreadContext<(), Receiver<()>>) {
        if let Some(release) = ctx.take_argument() {
            let _ = release.recv();
        }
    }
    fn noop(_ctx: &mut ThreadContext<(), Receiver<()>>) {}

    let mut group = c.benchmark_group("queue_full_rejection");

    group.bench_function("reject_when_full", |b| {
        let config = WorkerPoolConfig::new().with_thread_count(1).with_queue_capacity(1);
        let pool = WorkerPool::without_resources(config).unwrap();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);

        // Occupy the single worker and the single slot for the whole run.
        pool.add(hold, Some(release_rx), &[], 0).unwrap();
        while pool.stats().busy_workers == 0 {
            thread::yield_now();
        }
        pool.add(noop, None, &[], 1).unwrap();

        b.iter(|| {
            let rejected = pool.add(noop, None, &[], 2).unwrap_err();
            black_box(rejected.into_parts());
        });

        drop(release_tx);
        pool.shutdown().unwrap();
    });
    group.finish();
}

// ============================================================================
// Dispatch Benchmarks
// ============================================================================

fn bench_dispatch_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_throughput");
    let tasks = 4_096_u64;

    for threads in [1_usize, 2, 4, 8] {
        let pool = bench_pool(threads, 256, 16);
        group.throughput(Throughput::Elements(tasks));
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, _| {
            b.iter(|| submit_and_drain(&pool, tasks, b"sixteen-byte-tag"));
        });
        let report = pool.shutdown().unwrap();
        black_box(report.resources.iter().sum::<u64>());
    }
    group.finish();
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(submit_benches, bench_add_payload_sizes, bench_queue_full_rejection);

criterion_group!(dispatch_benches, bench_dispatch_throughput);

criterion_main!(submit_benches, dispatch_benches);
