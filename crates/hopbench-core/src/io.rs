//! Persistence of benchmark results.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ReportError;
use crate::report::{detailed_csv, ComparisonReport};
use crate::runner::BackendResult;

/// Default results directory.
pub const RESULTS_DIR: &str = "results";

/// Summary file name.
pub const SUMMARY_FILE: &str = "benchmark_summary.csv";

/// Combined JSON file name.
pub const REPORT_JSON_FILE: &str = "benchmark_report.json";

/// Text bar charts of query time and throughput.
pub const CHART_FILE: &str = "performance_comparison.txt";

/// File name of a backend's detailed results.
pub fn detailed_file_name(backend: &str) -> String {
    let slug: String = backend
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{}_detailed_results.csv", slug)
}

/// Detailed file names for the measured backends, in order.
///
/// Fails when two backend names slug to the same file.
fn detailed_files(
    results: &[BackendResult],
) -> Result<Vec<(String, &BackendResult)>, ReportError> {
    let mut owners: HashMap<String, &str> = HashMap::new();
    let mut files = Vec::new();

    for result in results {
        if let BackendResult::Measured { backend, .. } = result {
            let file = detailed_file_name(backend);
            if let Some(first) = owners.insert(file.clone(), backend) {
                return Err(ReportError::FileNameClash {
                    file,
                    first: first.to_string(),
                    second: backend.clone(),
                });
            }
            files.push((file, result));
        }
    }

    Ok(files)
}

/// Write the summary CSV, one detailed CSV per measured backend, the chart
/// (when any backend has statistics) and the JSON report into `dir`.
/// Returns the written paths.
pub fn write_report(
    dir: impl AsRef<Path>,
    report: &ComparisonReport,
    results: &[BackendResult],
) -> Result<Vec<PathBuf>, ReportError> {
    let dir = dir.as_ref();
    let detailed = detailed_files(results)?;
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let summary = dir.join(SUMMARY_FILE);
    fs::write(&summary, report.summary_csv())?;
    written.push(summary);

    for (file, result) in detailed {
        let path = dir.join(file);
        fs::write(&path, detailed_csv(result.samples()))?;
        written.push(path);
    }

    let chart = report.render_chart();
    if !chart.is_empty() {
        let path = dir.join(CHART_FILE);
        fs::write(&path, chart)?;
        written.push(path);
    }

    let json = dir.join(REPORT_JSON_FILE);
    fs::write(&json, serde_json::to_string_pretty(report)?)?;
    written.push(json);

    tracing::info!(dir = %dir.display(), files = written.len(), "results written");
    Ok(written)
}

/// Read a report previously written by [`write_report`].
pub fn read_report(dir: impl AsRef<Path>) -> Result<ComparisonReport, ReportError> {
    let content = fs::read_to_string(dir.as_ref().join(REPORT_JSON_FILE))?;
    Ok(serde_json::from_str(&content)?)
}
