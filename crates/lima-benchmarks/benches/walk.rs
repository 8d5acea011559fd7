//! Graph traversal performance benchmarks
//!
//! Benchmarks the walker over the two shapes that bound its behavior: deep
//! linear chains (maximum recursion, no parallelism to exploit) and wide
//! fan-out (maximum parallelism, minimal depth), in both execution modes.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lima_benchmarks::criterion_config;
use lima_graph::{
    graph_run, graph_run_sync, BoxError, Cancellation, DepResults, FnSource, RunOptions,
};
use std::sync::Arc;

fn identity_visit(
    n: &u64,
    _signal: &Cancellation,
    _path: &[u64],
    _deps: &DepResults<u64, u64>,
) -> Result<u64, BoxError> {
    Ok(*n)
}

/// Source over a linear chain 0 -> 1 -> ... -> depth-1
fn chain_source(
    depth: u64,
) -> Arc<
    FnSource<
        u64,
        u64,
        impl Fn(&u64) -> Result<Vec<u64>, BoxError> + Send + Sync + 'static,
        fn(&u64, &Cancellation, &[u64], &DepResults<u64, u64>) -> Result<u64, BoxError>,
    >,
> {
    Arc::new(FnSource::new(
        move |n: &u64| -> Result<Vec<u64>, BoxError> {
            Ok(if n + 1 < depth { vec![n + 1] } else { Vec::new() })
        },
        identity_visit as fn(&u64, &Cancellation, &[u64], &DepResults<u64, u64>) -> Result<u64, BoxError>,
    ))
}

/// Source over a root fanning out to `width` independent leaves
fn fanout_source(
    width: u64,
) -> Arc<
    FnSource<
        u64,
        u64,
        impl Fn(&u64) -> Result<Vec<u64>, BoxError> + Send + Sync + 'static,
        fn(&u64, &Cancellation, &[u64], &DepResults<u64, u64>) -> Result<u64, BoxError>,
    >,
> {
    Arc::new(FnSource::new(
        move |n: &u64| -> Result<Vec<u64>, BoxError> {
            Ok(if *n == 0 { (1..=width).collect() } else { Vec::new() })
        },
        identity_visit as fn(&u64, &Cancellation, &[u64], &DepResults<u64, u64>) -> Result<u64, BoxError>,
    ))
}

fn bench_chain_walk(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("chain_walk");

    for depth in [10u64, 100, 1000] {
        group.throughput(Throughput::Elements(depth));
        group.bench_with_input(BenchmarkId::new("concurrent", depth), &depth, |b, &depth| {
            b.iter(|| {
                let results = rt
                    .block_on(graph_run(
                        vec![0],
                        chain_source(depth),
                        RunOptions::default(),
                    ))
                    .unwrap();
                black_box(results)
            });
        });
        group.bench_with_input(BenchmarkId::new("sequential", depth), &depth, |b, &depth| {
            b.iter(|| {
                let results =
                    graph_run_sync(vec![0], chain_source(depth), RunOptions::default()).unwrap();
                black_box(results)
            });
        });
    }

    group.finish();
}

fn bench_fanout_walk(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("fanout_walk");

    for width in [10u64, 100, 1000] {
        group.throughput(Throughput::Elements(width + 1));
        group.bench_with_input(BenchmarkId::new("concurrent", width), &width, |b, &width| {
            b.iter(|| {
                let results = rt
                    .block_on(graph_run(
                        vec![0],
                        fanout_source(width),
                        RunOptions::default(),
                    ))
                    .unwrap();
                black_box(results)
            });
        });
        group.bench_with_input(BenchmarkId::new("sequential", width), &width, |b, &width| {
            b.iter(|| {
                let results =
                    graph_run_sync(vec![0], fanout_source(width), RunOptions::default()).unwrap();
                black_box(results)
            });
        });
    }

    group.finish();
}

criterion_group! {
    name = benches;
    config = criterion_config();
    targets = bench_chain_walk, bench_fanout_walk
}
criterion_main!(benches);
