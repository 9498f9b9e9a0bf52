//! The capability every backend exposes to the harness.
//!
//! Backends differ only in how they run the 2-hop aggregation; the harness
//! sees a [`BackendKind`] tag and the [`QueryAdapter`] trait and nothing else.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;
use crate::model::{QueryOutcome, QueryTarget};

/// Family of database engine behind an adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Relational database queried with recursive/CTE SQL.
    Relational,
    /// Native graph database queried with a pattern-matching language.
    NativeGraph,
    /// Query-time graph layer over external tables.
    GraphVirtualization,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Relational => write!(f, "relational"),
            BackendKind::NativeGraph => write!(f, "native-graph"),
            BackendKind::GraphVirtualization => write!(f, "graph-virtualization"),
        }
    }
}

/// Uniform query interface over one backend connection.
///
/// Implementations own an already-established connection for the duration
/// of a run and must release it on drop. `execute` is read-only.
pub trait QueryAdapter {
    /// Stable backend name used in samples and reports.
    fn name(&self) -> &str;

    /// Engine family.
    fn kind(&self) -> BackendKind;

    /// Run the 2-hop aggregation for `target`, bounded by `timeout`.
    fn execute(
        &mut self,
        target: &QueryTarget,
        timeout: Duration,
    ) -> Result<QueryOutcome, QueryError>;

    /// Check that the backend can serve the workload.
    fn probe(&mut self, _timeout: Duration) -> Result<(), QueryError> {
        Ok(())
    }

    /// Release the connection early.
    fn close(&mut self) -> Result<(), QueryError> {
        Ok(())
    }
}

impl<A: QueryAdapter + ?Sized> QueryAdapter for Box<A> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    fn execute(
        &mut self,
        target: &QueryTarget,
        timeout: Duration,
    ) -> Result<QueryOutcome, QueryError> {
        (**self).execute(target, timeout)
    }

    fn probe(&mut self, timeout: Duration) -> Result<(), QueryError> {
        (**self).probe(timeout)
    }

    fn close(&mut self) -> Result<(), QueryError> {
        (**self).close()
    }
}
