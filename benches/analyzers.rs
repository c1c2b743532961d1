//! Benchmarks for session normalization and analyzer execution
//!
//! Covers:
//! - Normalizing a raw bundle into a `Session` (the cost of a cache miss after fetch)
//! - Each built-in analyzer over a 3-driver race with full telemetry
//! - A full pipeline request served from a warm cache

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use paddock::analyzers::AnalyzerRegistry;
use paddock::loader;
use paddock::test_utils::{MockSource, full_race};
use paddock::{AnalyzerParams, Paddock, PaddockConfig, SessionKey, SessionType};
use std::hint::black_box;
use std::sync::Arc;

const RACE_LAPS: u32 = 20;

fn race_key() -> SessionKey {
    SessionKey::new(2024, "Monza", SessionType::Race)
}

fn bench_normalize(c: &mut Criterion) {
    let fixture = full_race(race_key(), RACE_LAPS);
    let bundle = fixture.bundle();

    let mut group = c.benchmark_group("normalize");
    group.throughput(Throughput::Elements(bundle.telemetry.len() as u64));
    group.bench_function("full_race", |b| {
        b.iter(|| {
            let session = loader::normalize(race_key(), black_box(bundle.clone())).expect("fixture is valid");
            black_box(session)
        })
    });
    group.finish();
}

fn bench_analyzers(c: &mut Criterion) {
    let session = full_race(race_key(), RACE_LAPS).session();
    let registry = AnalyzerRegistry::with_defaults();
    let params = AnalyzerParams::default();

    let mut group = c.benchmark_group("analyzers");
    for name in registry.names() {
        let analyzer = registry.get(name).expect("registered");
        group.bench_with_input(BenchmarkId::from_parameter(name), &session, |b, session| {
            b.iter(|| black_box(analyzer.analyze(black_box(session), &params)))
        });
    }
    group.finish();
}

fn bench_warm_pipeline(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().expect("runtime");
    let source = MockSource::new().with_fixture(&full_race(race_key(), RACE_LAPS));
    let paddock = Paddock::from_config(&PaddockConfig::default(), Arc::new(source));
    let key = race_key();
    let all = paddock.registry().names();
    let params = AnalyzerParams::default();

    runtime.block_on(paddock.run(&key, &all, &params));

    c.bench_function("pipeline_warm_all_analyzers", |b| {
        b.iter(|| black_box(runtime.block_on(paddock.run(&key, &all, &params))))
    });
}

criterion_group!(benches, bench_normalize, bench_analyzers, bench_warm_pipeline);
criterion_main!(benches);
