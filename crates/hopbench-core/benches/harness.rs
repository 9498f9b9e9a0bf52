//! Harness overhead benchmarks.
//!
//! Measures the cost the harness adds around adapter calls, using an
//! adapter that returns immediately, plus the statistics and report steps.

use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use hopbench_core::{
    compute_stats, BackendKind, BackendResult, ComparisonReport, Harness, QueryAdapter,
    QueryError, QueryOutcome, QueryTarget, TimingSample, TwoHopFeatures,
};

struct NoopAdapter {
    features: TwoHopFeatures,
}

impl QueryAdapter for NoopAdapter {
    fn name(&self) -> &str {
        "noop"
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn execute(
        &mut self,
        _target: &QueryTarget,
        _timeout: Duration,
    ) -> Result<QueryOutcome, QueryError> {
        Ok(QueryOutcome::from_features(self.features))
    }
}

fn targets(n: usize) -> Vec<QueryTarget> {
    (0..n as u64).map(QueryTarget::from).collect()
}

fn noop() -> NoopAdapter {
    NoopAdapter {
        features: TwoHopFeatures {
            num_unique_2hop_receivers: 12,
            num_2hop_transactions: 40,
            ..Default::default()
        },
    }
}

fn bench_measure_single(c: &mut Criterion) {
    let harness = Harness::default();
    let mut adapter = noop();
    let target = QueryTarget::from("CUST_000001");

    c.bench_function("harness/measure_single", |b| {
        b.iter(|| black_box(harness.measure_single(&mut adapter, &target).unwrap()));
    });
}

fn bench_measure_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("harness/measure_batch");
    let harness = Harness::default();

    for size in [10, 100, 1000] {
        let targets = targets(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &targets, |b, targets| {
            let mut adapter = noop();
            b.iter(|| black_box(harness.measure_batch(&mut adapter, targets, 1).unwrap()));
        });
    }

    group.finish();
}

fn bench_stats_and_report(c: &mut Criterion) {
    let samples: Vec<TimingSample> = (0..1000)
        .map(|i| {
            TimingSample::from_secs(
                "noop",
                QueryTarget::from(i as u64),
                0.001 + (i % 17) as f64 * 1e-4,
                QueryOutcome::NoData,
            )
        })
        .collect();

    c.bench_function("stats/compute_1000", |b| {
        b.iter(|| black_box(compute_stats(&samples).unwrap()));
    });

    let results: Vec<BackendResult> = ["postgresql", "neo4j", "puppygraph"]
        .iter()
        .map(|name| BackendResult::Measured {
            backend: name.to_string(),
            single: samples[0].clone(),
            samples: samples.clone(),
        })
        .collect();

    c.bench_function("report/build_and_csv", |b| {
        b.iter(|| {
            let report = ComparisonReport::build(&results, "postgresql").unwrap();
            black_box(report.summary_csv())
        });
    });
}

criterion_group!(
    benches,
    bench_measure_single,
    bench_measure_batch,
    bench_stats_and_report
);
criterion_main!(benches);
