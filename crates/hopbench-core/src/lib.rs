//! hopbench core
//!
//! Backend-independent pieces of the 2-hop aggregation benchmark:
//!
//! - **Model**: query targets, the eight aggregated features, timing samples
//! - **Adapter**: the contract every backend implements
//! - **Harness**: warm-up, single timed query, and batch measurement
//! - **Stats**: per-backend aggregates and throughput
//! - **Runner**: per-backend orchestration with failure isolation
//! - **Report**: comparison table, speedups, CSV and JSON output
//! - **Dataset**: deterministic synthetic banking data and target selection
//! - **Config**: connection and run settings

pub mod adapter;
pub mod config;
pub mod dataset;
pub mod error;
pub mod harness;
pub mod io;
pub mod model;
pub mod report;
pub mod runner;
pub mod stats;

pub use adapter::{BackendKind, QueryAdapter};
pub use config::{BackendId, BenchConfig, Neo4jConfig, PostgresConfig, PuppyGraphConfig};
pub use dataset::{generate, read_customer_ids, select_targets, Dataset, DatasetSpec};
pub use error::{
    BoxError, DatasetError, HarnessError, Phase, QueryError, ReportError, StatsError,
};
pub use harness::Harness;
pub use io::{read_report, write_report};
pub use model::{QueryOutcome, QueryTarget, TimingSample, TwoHopFeatures};
pub use report::{detailed_csv, speedup, ComparisonReport, ReportRow, RowStatus, Speedup};
pub use runner::{run_all, run_backend, BackendResult, Connector, RunSettings};
pub use stats::{compute_stats, BackendStats, Throughput};
