//! Throughput benchmarks for cascade pipelines.

use cascade::prelude::*;
use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tokio::runtime::Runtime;

/// Items pushed through the fan-out pipeline per iteration.
const FAN_OUT_ITEMS: u32 = 256;

/// A chain of `depth` incrementing stages, each with `workers` workers.
fn chain(depth: usize, workers: usize) -> Pipeline<u32, u32> {
    let mut pipeline = Pipeline::new(Stage::map(|n: u32| n + 1).with_workers(workers));
    for _ in 1..depth {
        pipeline = pipeline.append(Stage::map(|n: u32| n + 1).with_workers(workers));
    }
    pipeline
}

fn bench_handle(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("pipeline_handle");

    for (depth, workers) in [(1, 1), (3, 1), (3, 4)] {
        let pipeline = chain(depth, workers);
        let label = format!("depth{depth}_workers{workers}");
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(
            BenchmarkId::from_parameter(label),
            &pipeline,
            |b, pipeline| {
                b.iter(|| {
                    rt.block_on(async {
                        let cancel = CancellationToken::new();
                        let (payloads, _) =
                            pipeline.handle(&cancel, black_box(1)).await.collect().await;
                        black_box(payloads)
                    })
                });
            },
        );
    }

    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("pipeline_fan_out");

    for workers in [1usize, 4] {
        let pipeline = Pipeline::new(Stage::new(
            |_cancel, writer: Writer<u32>, count: u32| async move {
                for n in 0..count {
                    writer.write(n).await;
                }
            },
        ))
        .append(Stage::map(|n: u32| n + 1).with_workers(workers));

        group.throughput(Throughput::Elements(FAN_OUT_ITEMS as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(workers),
            &pipeline,
            |b, pipeline| {
                b.iter(|| {
                    rt.block_on(async {
                        let cancel = CancellationToken::new();
                        let (sum, _) = pipeline
                            .handle(&cancel, black_box(FAN_OUT_ITEMS))
                            .await
                            .fold(0u64, |acc, v| acc + v as u64, ErrorPolicy::FailFast)
                            .await;
                        black_box(sum)
                    })
                });
            },
        );
    }

    group.finish();
}

fn bench_worker_submission(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("worker_submission");

    group.throughput(Throughput::Elements(1));
    group.bench_function("submit", |b| {
        let cancel = CancellationToken::new();
        let worker = rt.block_on(async {
            Worker::spawn(
                cancel.clone(),
                |stream: ResultStream<u32>| async move {
                    let _ = stream.collect().await;
                },
                chain(2, 1),
            )
        });

        b.iter(|| {
            rt.block_on(async { worker.handle(black_box(1)).await.unwrap() });
        });

        cancel.cancel();
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_handle,
    bench_fan_out,
    bench_worker_submission
);
criterion_main!(benches);
