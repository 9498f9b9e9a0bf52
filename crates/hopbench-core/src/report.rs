//! Comparison report: per-backend statistics plus speedup relative to a
//! baseline backend, rendered as a console table and as CSV.

use comfy_table::{Cell, Table};
use serde::{Deserialize, Serialize};

use crate::error::{Phase, ReportError, StatsError};
use crate::model::{TimingSample, TwoHopFeatures};
use crate::runner::BackendResult;
use crate::stats::{compute_stats, BackendStats, Throughput};

/// Width of the longest bar in [`ComparisonReport::render_chart`].
const CHART_WIDTH: usize = 40;

/// Speedup of a backend relative to the baseline (`baseline.mean / mean`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Speedup {
    /// This row is the baseline.
    Baseline,
    Ratio(f64),
    /// Baseline or candidate has no usable mean.
    NotApplicable,
}

impl Speedup {
    fn display(&self) -> String {
        match self {
            Speedup::Baseline => "baseline".to_string(),
            Speedup::Ratio(r) => format!("{:.2}x", r),
            Speedup::NotApplicable => "N/A".to_string(),
        }
    }

    fn csv(&self) -> String {
        match self {
            Speedup::Baseline => "baseline".to_string(),
            Speedup::Ratio(r) => format!("{:.4}", r),
            Speedup::NotApplicable => "N/A".to_string(),
        }
    }
}

/// Compute the speedup of `candidate` against `baseline`.
///
/// Undefined (N/A) when the baseline produced no samples or either mean is
/// zero.
pub fn speedup(baseline: Option<&BackendStats>, candidate: &BackendStats) -> Speedup {
    match baseline {
        Some(base) if base.count > 0 && base.mean > 0.0 && candidate.mean > 0.0 => {
            Speedup::Ratio(base.mean / candidate.mean)
        }
        _ => Speedup::NotApplicable,
    }
}

/// Row state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RowStatus {
    Ok,
    /// The backend ran but produced no batch samples.
    NoData,
    Failed { phase: Phase, message: String },
}

impl RowStatus {
    fn csv(&self) -> String {
        match self {
            RowStatus::Ok => "ok".to_string(),
            RowStatus::NoData => "no_data".to_string(),
            RowStatus::Failed { phase, .. } => format!("failed:{}", phase),
        }
    }
}

/// One backend's line in the report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow {
    pub backend: String,
    pub status: RowStatus,
    /// Timed single-query duration in seconds.
    pub single_query: Option<f64>,
    pub stats: Option<BackendStats>,
    pub speedup: Speedup,
}

/// Ordered comparison across backends. Rows keep the input order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub baseline: String,
    pub rows: Vec<ReportRow>,
}

impl ComparisonReport {
    /// Aggregate run results.
    ///
    /// Backends without batch samples are marked as no data; a sample that
    /// violates the statistics contract fails the whole report.
    pub fn build(results: &[BackendResult], baseline: &str) -> Result<Self, ReportError> {
        let mut entries = Vec::with_capacity(results.len());

        for result in results {
            let entry = match result {
                BackendResult::Measured {
                    backend,
                    single,
                    samples,
                } => {
                    check_sample(backend, single)?;
                    match compute_stats(samples) {
                        Ok(stats) => (backend.clone(), RowStatus::Ok, Some(single.seconds()), Some(stats)),
                        Err(StatsError::EmptySample) => {
                            tracing::warn!(backend = %backend, "no batch samples");
                            (backend.clone(), RowStatus::NoData, Some(single.seconds()), None)
                        }
                        Err(source) => {
                            return Err(ReportError::InvalidSample {
                                backend: backend.clone(),
                                source,
                            })
                        }
                    }
                }
                BackendResult::Failed {
                    backend,
                    phase,
                    message,
                } => (
                    backend.clone(),
                    RowStatus::Failed {
                        phase: *phase,
                        message: message.clone(),
                    },
                    None,
                    None,
                ),
            };
            entries.push(entry);
        }

        Ok(Self::from_entries(entries, baseline))
    }

    /// Build a report directly from per-backend statistics, in order.
    pub fn from_stats(stats: Vec<BackendStats>, baseline: &str) -> Self {
        let entries = stats
            .into_iter()
            .map(|s| (s.backend.clone(), RowStatus::Ok, None, Some(s)))
            .collect();
        Self::from_entries(entries, baseline)
    }

    fn from_entries(
        entries: Vec<(String, RowStatus, Option<f64>, Option<BackendStats>)>,
        baseline: &str,
    ) -> Self {
        let baseline_stats = entries
            .iter()
            .find(|(name, ..)| name == baseline)
            .and_then(|(.., stats)| stats.clone());

        let rows = entries
            .into_iter()
            .map(|(backend, status, single_query, stats)| {
                let speedup = if backend == baseline {
                    Speedup::Baseline
                } else {
                    match &stats {
                        Some(s) => speedup(baseline_stats.as_ref(), s),
                        None => Speedup::NotApplicable,
                    }
                };
                ReportRow {
                    backend,
                    status,
                    single_query,
                    stats,
                    speedup,
                }
            })
            .collect();

        Self {
            baseline: baseline.to_string(),
            rows,
        }
    }

    /// Rows whose backend failed.
    pub fn failed(&self) -> impl Iterator<Item = &ReportRow> {
        self.rows
            .iter()
            .filter(|r| matches!(r.status, RowStatus::Failed { .. }))
    }

    /// Check whether the baseline produced usable statistics.
    pub fn has_baseline(&self) -> bool {
        self.rows
            .iter()
            .any(|r| r.backend == self.baseline && r.stats.is_some())
    }

    /// Summary table.
    pub fn render_table(&self) -> Table {
        let mut table = Table::new();
        table.set_header(vec![
            Cell::new("Backend"),
            Cell::new("Single Query (s)"),
            Cell::new("Avg Query (s)"),
            Cell::new("Queries/Second"),
            Cell::new("Total Batch (s)"),
            Cell::new("Speedup"),
            Cell::new("Status"),
        ]);

        for row in &self.rows {
            let cells = match (&row.status, &row.stats) {
                (RowStatus::Failed { phase, message }, _) => vec![
                    row.backend.clone(),
                    "ERROR".to_string(),
                    "ERROR".to_string(),
                    "ERROR".to_string(),
                    "ERROR".to_string(),
                    row.speedup.display(),
                    format!("failed during {}: {}", phase, message),
                ],
                (_, Some(stats)) => vec![
                    row.backend.clone(),
                    fmt_opt(row.single_query, 4),
                    format!("{:.4}", stats.mean),
                    stats.throughput().to_string(),
                    format!("{:.2}", stats.total),
                    row.speedup.display(),
                    "ok".to_string(),
                ],
                (_, None) => vec![
                    row.backend.clone(),
                    fmt_opt(row.single_query, 4),
                    "no data".to_string(),
                    "no data".to_string(),
                    "no data".to_string(),
                    row.speedup.display(),
                    "no data".to_string(),
                ],
            };
            table.add_row(cells);
        }

        table
    }

    /// Bar charts comparing average query time and throughput across the
    /// backends that produced statistics. Empty when none did.
    pub fn render_chart(&self) -> String {
        let measured: Vec<(&str, &BackendStats)> = self
            .rows
            .iter()
            .filter_map(|r| r.stats.as_ref().map(|s| (r.backend.as_str(), s)))
            .collect();
        if measured.is_empty() {
            return String::new();
        }

        let labels: Vec<&str> = measured.iter().map(|(name, _)| *name).collect();
        let times: Vec<Option<f64>> = measured.iter().map(|(_, s)| Some(s.mean)).collect();
        let qps: Vec<Option<f64>> = measured
            .iter()
            .map(|(_, s)| match s.throughput() {
                Throughput::PerSecond(qps) => Some(qps),
                Throughput::Unbounded => None,
            })
            .collect();

        let mut out = String::from("Average Query Time (s)\n");
        push_bars(&mut out, &labels, &times, |v| format!("{:.4}s", v));
        out.push_str("\nThroughput (queries/s)\n");
        push_bars(&mut out, &labels, &qps, |v| format!("{:.2}", v));
        out
    }

    /// Human-readable report with the table and speedup analysis.
    pub fn render_console(&self) -> String {
        let rule = "=".repeat(80);
        let mut out = String::new();

        out.push_str(&format!("{}\nPERFORMANCE COMPARISON REPORT\n{}\n", rule, rule));

        let failed: Vec<&ReportRow> = self.failed().collect();
        if !failed.is_empty() {
            out.push_str("\nUnavailable backends:\n");
            for row in &failed {
                if let RowStatus::Failed { phase, message } = &row.status {
                    out.push_str(&format!("  - {} ({}): {}\n", row.backend, phase, message));
                }
            }
        }

        out.push_str(&format!("\n{}\n", self.render_table()));

        let chart = self.render_chart();
        if !chart.is_empty() {
            out.push_str(&format!("\n{}\n", chart));
        }

        out.push_str(&format!(
            "\n{}\nSPEEDUP ANALYSIS (relative to {})\n{}\n",
            rule, self.baseline, rule
        ));
        if !self.has_baseline() {
            out.push_str(&format!(
                "Cannot calculate speedup - {} benchmark unavailable\n",
                self.baseline
            ));
        }
        for row in self.rows.iter().filter(|r| r.backend != self.baseline) {
            out.push_str(&format!("{} speedup: {}\n", row.backend, row.speedup.display()));
        }

        out
    }

    /// Deterministic summary CSV, one line per backend in report order.
    pub fn summary_csv(&self) -> String {
        let mut output = String::from(
            "backend,status,single_query_time,avg_query_time,queries_per_second,batch_total_time,batch_size,speedup\n",
        );

        for row in &self.rows {
            let (avg, qps, total, size) = match &row.stats {
                Some(stats) => (
                    format!("{:.6}", stats.mean),
                    match stats.throughput() {
                        Throughput::PerSecond(qps) => format!("{:.4}", qps),
                        Throughput::Unbounded => "unbounded".to_string(),
                    },
                    format!("{:.6}", stats.total),
                    stats.count.to_string(),
                ),
                None => (String::new(), String::new(), String::new(), "0".to_string()),
            };
            let cells = [
                escape_csv(&row.backend),
                row.status.csv(),
                fmt_opt(row.single_query, 6),
                avg,
                qps,
                total,
                size,
                row.speedup.csv(),
            ];
            output.push_str(&cells.join(","));
            output.push('\n');
        }

        output
    }
}

/// Per-sample CSV: backend, target, duration and the feature columns.
pub fn detailed_csv(samples: &[TimingSample]) -> String {
    let mut headers = vec!["backend", "target", "duration"];
    headers.extend(TwoHopFeatures::COLUMNS);
    let mut output = headers.join(",");
    output.push('\n');

    for sample in samples {
        let mut cells = vec![
            escape_csv(sample.backend()),
            escape_csv(sample.target().as_str()),
            format!("{:.9}", sample.seconds()),
        ];
        match sample.outcome().features() {
            Some(features) => cells.extend(features.values()),
            None => cells.extend(std::iter::repeat(String::new()).take(TwoHopFeatures::COLUMNS.len())),
        }
        output.push_str(&cells.join(","));
        output.push('\n');
    }

    output
}

fn check_sample(backend: &str, sample: &TimingSample) -> Result<(), ReportError> {
    let seconds = sample.seconds();
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(())
    } else {
        Err(ReportError::InvalidSample {
            backend: backend.to_string(),
            source: StatsError::InvalidSample { index: 0, seconds },
        })
    }
}

/// One bar per label, scaled to the largest value. `None` is drawn as an
/// unbounded bar.
fn push_bars(
    out: &mut String,
    labels: &[&str],
    values: &[Option<f64>],
    fmt: impl Fn(f64) -> String,
) {
    let label_width = labels.iter().map(|l| l.chars().count()).max().unwrap_or(0);
    let peak = values.iter().flatten().fold(0.0_f64, |acc, v| acc.max(*v));

    for (label, value) in labels.iter().zip(values) {
        let (len, text) = match value {
            Some(v) if peak > 0.0 => {
                let len = ((v / peak) * CHART_WIDTH as f64).round() as usize;
                (len.max(usize::from(*v > 0.0)), fmt(*v))
            }
            Some(v) => (0, fmt(*v)),
            None => (CHART_WIDTH, "unbounded".to_string()),
        };
        out.push_str(&format!(
            "  {:<lw$} |{:<cw$} {}\n",
            label,
            "#".repeat(len),
            text,
            lw = label_width,
            cw = CHART_WIDTH
        ));
    }
}

fn fmt_opt(value: Option<f64>, precision: usize) -> String {
    value
        .map(|v| format!("{:.*}", precision, v))
        .unwrap_or_default()
}

/// Quote a CSV field when it contains a delimiter, quote or newline.
pub(crate) fn escape_csv(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
