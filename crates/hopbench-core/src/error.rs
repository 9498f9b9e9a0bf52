//! Error types for the harness, statistics and reporting layers.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Boxed driver error carried as the source of a [`QueryError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failure of a single adapter invocation.
///
/// Adapters must surface these instead of substituting zero or default
/// feature values, otherwise a failed query would show up as a falsely
/// fast sample.
#[derive(Debug, Error)]
pub enum QueryError {
    /// Connection could not be established or was lost.
    #[error("connection error: {0}")]
    Connection(String),

    /// The call exceeded its caller-supplied timeout.
    #[error("query timed out after {0:?}")]
    Timeout(Duration),

    /// The backend answered with something we cannot interpret.
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The backend is reachable but not ready to serve the workload.
    #[error("backend not ready: {0}")]
    NotReady(String),

    /// Error reported by the backend driver.
    #[error("backend error: {0}")]
    Backend(#[source] BoxError),
}

impl QueryError {
    /// Wrap a driver error.
    pub fn backend(err: impl Into<BoxError>) -> Self {
        QueryError::Backend(err.into())
    }
}

/// Statistics computation errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    /// Statistics were requested over zero samples.
    #[error("no samples to aggregate")]
    EmptySample,

    /// A negative or non-finite duration reached the aggregation.
    #[error("invalid sample at index {index}: duration {seconds}s")]
    InvalidSample { index: usize, seconds: f64 },
}

/// Stage of a backend run a failure is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Opening the connection and probing readiness.
    Connect,
    /// The untimed call preceding the single-query measurement.
    WarmUp,
    /// The timed single-query measurement.
    Timed,
    /// The batch measurement.
    Batch,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Connect => write!(f, "connect"),
            Phase::WarmUp => write!(f, "warm-up"),
            Phase::Timed => write!(f, "timed-measurement"),
            Phase::Batch => write!(f, "batch"),
        }
    }
}

/// Harness errors.
#[derive(Debug, Error)]
pub enum HarnessError {
    /// An adapter call failed.
    #[error("{backend}: query failed during {phase}: {source}")]
    Query {
        backend: String,
        phase: Phase,
        #[source]
        source: QueryError,
    },

    /// The run was given no targets.
    #[error("no query targets supplied")]
    NoTargets,
}

impl HarnessError {
    /// Phase the failure belongs to.
    pub fn phase(&self) -> Phase {
        match self {
            HarnessError::Query { phase, .. } => *phase,
            HarnessError::NoTargets => Phase::Connect,
        }
    }
}

/// Report aggregation and persistence errors.
#[derive(Debug, Error)]
pub enum ReportError {
    /// A sample violated the statistics contract. This is a harness bug.
    #[error("{backend}: {source}")]
    InvalidSample {
        backend: String,
        #[source]
        source: StatsError,
    },

    /// Two backends would write their detailed results to the same file.
    #[error("backends '{first}' and '{second}' both map to {file}")]
    FileNameClash {
        file: String,
        first: String,
        second: String,
    },

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Dataset generation and loading errors.
#[derive(Debug, Error)]
pub enum DatasetError {
    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A CSV file did not have the expected shape.
    #[error("parse error in {file} line {line}: {message}")]
    Parse {
        file: String,
        line: usize,
        message: String,
    },

    /// The file contained no data rows.
    #[error("no rows in {0}")]
    Empty(String),

    /// Generation parameters cannot produce a valid dataset.
    #[error("invalid dataset spec: {0}")]
    InvalidSpec(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_error_keeps_source() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let err = QueryError::backend(io);
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "reset by peer");
    }

    #[test]
    fn test_harness_error_names_backend_and_phase() {
        let err = HarnessError::Query {
            backend: "neo4j".to_string(),
            phase: Phase::WarmUp,
            source: QueryError::Timeout(Duration::from_secs(30)),
        };
        assert_eq!(err.phase(), Phase::WarmUp);
        let msg = err.to_string();
        assert!(msg.starts_with("neo4j: query failed during warm-up"));
    }
}
