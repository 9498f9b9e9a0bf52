//! End-to-end tests: generated dataset, in-memory adapter, runner, report
//! and result files.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fs;
use std::time::Duration;

use chrono::NaiveDate;
use hopbench_core::dataset::{write_csv, CUSTOMERS_FILE};
use hopbench_core::io::{detailed_file_name, CHART_FILE, SUMMARY_FILE};
use hopbench_core::{
    generate, read_customer_ids, read_report, run_all, select_targets, write_report,
    BackendKind, BackendResult, ComparisonReport, Connector, Dataset, DatasetSpec, Phase,
    QueryAdapter, QueryError, QueryOutcome, QueryTarget, RowStatus, RunSettings, Speedup,
    TwoHopFeatures,
};

/// Answers the 2-hop aggregation directly from a generated dataset.
struct MemoryAdapter {
    name: String,
    out_edges: HashMap<String, Vec<(String, f64)>>,
    customers: HashMap<String, (f64, f64)>,
}

impl MemoryAdapter {
    fn new(name: &str, dataset: &Dataset) -> Self {
        let mut out_edges: HashMap<String, Vec<(String, f64)>> = HashMap::new();
        for t in dataset.transfers.iter().filter(|t| t.is_completed()) {
            out_edges
                .entry(t.from_customer_id.clone())
                .or_default()
                .push((t.to_customer_id.clone(), t.amount));
        }
        let customers = dataset
            .customers
            .iter()
            .map(|c| (c.customer_id.clone(), (c.risk_score, c.account_balance)))
            .collect();
        Self {
            name: name.to_string(),
            out_edges,
            customers,
        }
    }

    fn features(&self, id: &str) -> TwoHopFeatures {
        // Ordered so every instance sums the amounts in the same order.
        let first_hop: BTreeSet<&str> = self
            .out_edges
            .get(id)
            .map(|edges| edges.iter().map(|(to, _)| to.as_str()).collect())
            .unwrap_or_default();

        let mut receivers = HashSet::new();
        let mut count = 0u64;
        let (mut total, mut max, mut min) = (0.0, f64::MIN, f64::MAX);
        let (mut risk, mut balance) = (0.0, 0.0);
        for hop in first_hop {
            for (to, amount) in self.out_edges.get(hop).into_iter().flatten() {
                receivers.insert(to.as_str());
                count += 1;
                total += amount;
                max = max.max(*amount);
                min = min.min(*amount);
                let (r, b) = self.customers[to];
                risk += r;
                balance += b;
            }
        }
        if count == 0 {
            return TwoHopFeatures::default();
        }
        let n = count as f64;
        TwoHopFeatures {
            num_unique_2hop_receivers: receivers.len() as u64,
            num_2hop_transactions: count,
            avg_2hop_transaction_amount: total / n,
            total_2hop_transaction_amount: total,
            max_2hop_transaction_amount: max,
            min_2hop_transaction_amount: min,
            avg_2hop_receiver_risk_score: risk / n,
            avg_2hop_receiver_balance: balance / n,
        }
    }
}

impl QueryAdapter for MemoryAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> BackendKind {
        BackendKind::NativeGraph
    }

    fn execute(
        &mut self,
        target: &QueryTarget,
        _timeout: Duration,
    ) -> Result<QueryOutcome, QueryError> {
        if !self.customers.contains_key(target.as_str()) {
            return Err(QueryError::Malformed(format!("unknown customer {}", target)));
        }
        Ok(QueryOutcome::from_features(self.features(target.as_str())))
    }
}

fn dataset() -> Dataset {
    let spec = DatasetSpec::new(100, 800, 50)
        .with_seed(11)
        .with_reference_date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap());
    generate(&spec).unwrap()
}

fn connectors(data: &Dataset) -> Vec<(String, Connector<'_>)> {
    let postgres: Connector<'_> = Box::new(move || {
        Ok(Box::new(MemoryAdapter::new("postgresql", data)) as Box<dyn QueryAdapter>)
    });
    let neo4j: Connector<'_> =
        Box::new(|| Err(QueryError::Connection("connection refused".to_string())));
    let puppygraph: Connector<'_> = Box::new(move || {
        Ok(Box::new(MemoryAdapter::new("puppygraph", data)) as Box<dyn QueryAdapter>)
    });

    vec![
        ("postgresql".to_string(), postgres),
        ("neo4j".to_string(), neo4j),
        ("puppygraph".to_string(), puppygraph),
    ]
}

#[test]
fn test_generated_targets_run_through_all_backends() {
    let data = dataset();
    let dir = tempfile::tempdir().unwrap();
    write_csv(&data, dir.path()).unwrap();

    let ids = read_customer_ids(dir.path().join(CUSTOMERS_FILE)).unwrap();
    let targets = select_targets(&ids, 10, 42);
    assert_eq!(targets.len(), 10);

    let settings = RunSettings {
        repetitions: 2,
        ..RunSettings::default()
    };
    let results = run_all(connectors(&data), &targets, &settings).unwrap();

    assert_eq!(results.len(), 3);
    assert_eq!(results[0].samples().len(), 20);
    assert!(matches!(
        &results[1],
        BackendResult::Failed { phase: Phase::Connect, .. }
    ));
    assert_eq!(results[2].samples().len(), 20);

    // Both in-memory backends answer identically, target by target.
    for (a, b) in results[0].samples().iter().zip(results[2].samples()) {
        assert_eq!(a.target(), b.target());
        assert_eq!(a.outcome(), b.outcome());
    }

    // Samples follow target-then-repetition order.
    let order: Vec<&QueryTarget> = results[0].samples().iter().map(|s| s.target()).collect();
    for (i, target) in targets.iter().enumerate() {
        assert_eq!(order[2 * i], target);
        assert_eq!(order[2 * i + 1], target);
    }

    let report = ComparisonReport::build(&results, "postgresql").unwrap();
    let names: Vec<&str> = report.rows.iter().map(|r| r.backend.as_str()).collect();
    assert_eq!(names, vec!["postgresql", "neo4j", "puppygraph"]);
    assert_eq!(report.rows[0].speedup, Speedup::Baseline);
    assert!(matches!(
        report.rows[1].status,
        RowStatus::Failed { phase: Phase::Connect, .. }
    ));
    assert!(report.render_console().contains("neo4j (connect): "));
}

#[test]
fn test_no_data_targets_are_reported_as_no_data() {
    let data = dataset();
    let mut adapter = MemoryAdapter::new("memory", &data);
    // A customer with no outgoing completed transfers has no 2-hop neighbourhood.
    adapter.customers.insert("CUST_LONER".to_string(), (1.0, 1.0));

    let outcome = adapter
        .execute(&QueryTarget::from("CUST_LONER"), Duration::from_secs(1))
        .unwrap();
    assert!(outcome.is_no_data());
}

#[test]
fn test_written_report_is_deterministic() {
    let data = dataset();
    let ids = data.customer_ids();
    let targets = select_targets(&ids, 5, 7);
    let results = run_all(connectors(&data), &targets, &RunSettings::default()).unwrap();
    let report = ComparisonReport::build(&results, "postgresql").unwrap();

    let first = tempfile::tempdir().unwrap();
    let second = tempfile::tempdir().unwrap();
    let written = write_report(first.path(), &report, &results).unwrap();
    write_report(second.path(), &report, &results).unwrap();

    // summary, two detailed files, chart, json
    assert_eq!(written.len(), 5);
    assert!(first.path().join(detailed_file_name("postgresql")).exists());
    assert!(!first.path().join(detailed_file_name("neo4j")).exists());
    assert!(first.path().join(CHART_FILE).exists());

    let a = fs::read(first.path().join(SUMMARY_FILE)).unwrap();
    let b = fs::read(second.path().join(SUMMARY_FILE)).unwrap();
    assert_eq!(a, b);

    let reloaded = read_report(first.path()).unwrap();
    assert_eq!(reloaded, report);
}

#[test]
fn test_independent_adapters_agree_exactly() {
    let data = dataset();
    let mut first = MemoryAdapter::new("first", &data);
    let mut second = MemoryAdapter::new("second", &data);
    for id in data.customer_ids() {
        let target = QueryTarget::from(id.as_str());
        let a = first.execute(&target, Duration::from_secs(1)).unwrap();
        let b = second.execute(&target, Duration::from_secs(1)).unwrap();
        assert_eq!(a, b, "diverged on {}", target);
    }
}

#[test]
fn test_empty_target_list_is_rejected() {
    let data = dataset();
    let err = run_all(connectors(&data), &[], &RunSettings::default()).unwrap_err();
    assert_eq!(err.phase(), Phase::Connect);
}
