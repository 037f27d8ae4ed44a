//! Benchmarks for the job scheduler.
//!
//! Benchmarks cover:
//! - Canonical JSON keys used by the memoize strategy
//! - Schedule-to-result latency per strategy
//! - Fan-out of many jobs scheduled at once

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::Rng;
use serde_json::{json, Map, Value};
use std::hint::black_box;

use prometheus_jobs::core::{
    create_value_handler, JobContext, JobRegistry, JobStrategyKind, RegisterOptions,
    ScheduleOptions, Scheduler,
};
use prometheus_jobs::util::canonical_json;

use tokio::runtime::Runtime;

// ============================================================================
// Fixtures
// ============================================================================

fn random_object(width: usize) -> Value {
    let mut rng = rand::rng();
    let mut map = Map::new();
    for i in 0..width {
        let key = format!("key-{}-{i}", rng.random_range(0..10_000));
        map.insert(key, json!({"n": rng.random_range(0..1_000), "tags": ["a", "b"]}));
    }
    Value::Object(map)
}

fn sum_scheduler(kind: JobStrategyKind) -> Scheduler {
    let registry = JobRegistry::new();
    registry
        .register(
            "sum",
            create_value_handler(|input: Value, _ctx: JobContext| {
                let total: f64 = input
                    .as_array()
                    .into_iter()
                    .flatten()
                    .filter_map(Value::as_f64)
                    .sum();
                Ok(json!(total))
            }),
            RegisterOptions::new()
                .with_strategy(kind)
                .with_input(json!({"type": "array", "items": {"type": "number"}})),
        )
        .expect("register sum");
    Scheduler::new(registry)
}

// ============================================================================
// Canonical JSON
// ============================================================================

fn bench_canonical_json(c: &mut Criterion) {
    let mut group = c.benchmark_group("canonical_json");
    for width in [8_usize, 64, 512] {
        let value = random_object(width);
        group.throughput(Throughput::Elements(width as u64));
        group.bench_with_input(BenchmarkId::from_parameter(width), &value, |b, value| {
            b.iter(|| black_box(canonical_json(black_box(value))));
        });
    }
    group.finish();
}

// ============================================================================
// Scheduling
// ============================================================================

fn bench_schedule_result(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_result");
    for kind in [
        JobStrategyKind::Parallelize,
        JobStrategyKind::Serialize,
        JobStrategyKind::Memoize,
    ] {
        let scheduler = sum_scheduler(kind);
        group.bench_with_input(BenchmarkId::from_parameter(kind), &scheduler, |b, scheduler| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let job = scheduler
                    .schedule("sum", json!([1, 2, 3, 4]), ScheduleOptions::default())
                    .unwrap();
                black_box(job.result().await.unwrap())
            });
        });
    }
    group.finish();
}

fn bench_fan_out(c: &mut Criterion) {
    let mut group = c.benchmark_group("schedule_fan_out");
    for count in [10_u64, 100] {
        let scheduler = sum_scheduler(JobStrategyKind::Parallelize);
        group.throughput(Throughput::Elements(count));
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            let scheduler = scheduler.clone();
            b.to_async(Runtime::new().unwrap()).iter(|| {
                let scheduler = scheduler.clone();
                async move {
                    let jobs: Vec<_> = (0..count)
                        .map(|i| {
                            scheduler
                                .schedule("sum", json!([i, 1]), ScheduleOptions::default())
                                .unwrap()
                        })
                        .collect();
                    for job in &jobs {
                        job.start();
                    }
                    for job in jobs {
                        black_box(job.result().await.unwrap());
                    }
                }
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_canonical_json, bench_schedule_result, bench_fan_out);
criterion_main!(benches);
