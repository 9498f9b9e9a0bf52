//! Per-backend run orchestration.
//!
//! Connects, probes, measures and closes one backend at a time. A failure
//! in any phase is recorded against that backend and the remaining backends
//! still run.

use serde::{Deserialize, Serialize};

use crate::adapter::QueryAdapter;
use crate::error::{HarnessError, Phase, QueryError};
use crate::harness::Harness;
use crate::model::{QueryTarget, TimingSample};

/// Outcome of measuring one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BackendResult {
    /// All phases completed.
    Measured {
        backend: String,
        single: TimingSample,
        samples: Vec<TimingSample>,
    },
    /// The backend failed in `phase`; nothing was measured.
    Failed {
        backend: String,
        phase: Phase,
        message: String,
    },
}

impl BackendResult {
    pub fn backend(&self) -> &str {
        match self {
            BackendResult::Measured { backend, .. } | BackendResult::Failed { backend, .. } => {
                backend
            }
        }
    }

    /// Batch samples, empty for a failed backend.
    pub fn samples(&self) -> &[TimingSample] {
        match self {
            BackendResult::Measured { samples, .. } => samples,
            BackendResult::Failed { .. } => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, BackendResult::Failed { .. })
    }

    fn failed(backend: &str, phase: Phase, message: impl ToString) -> Self {
        BackendResult::Failed {
            backend: backend.to_string(),
            phase,
            message: message.to_string(),
        }
    }
}

/// Run settings shared by every backend.
#[derive(Debug, Clone, Copy)]
pub struct RunSettings {
    pub harness: Harness,
    /// Timed calls per target in the batch phase.
    pub repetitions: usize,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            harness: Harness::default(),
            repetitions: 1,
        }
    }
}

/// Boxed connector producing a connected adapter.
pub type Connector<'a> = Box<dyn FnOnce() -> Result<Box<dyn QueryAdapter>, QueryError> + 'a>;

/// Measure one backend end to end.
///
/// `connect` is only called when there is at least one target. The adapter
/// is closed explicitly on success and dropped on every path.
pub fn run_backend<F, A>(
    backend: &str,
    connect: F,
    targets: &[QueryTarget],
    settings: &RunSettings,
) -> Result<BackendResult, HarnessError>
where
    F: FnOnce() -> Result<A, QueryError>,
    A: QueryAdapter,
{
    let first = targets.first().ok_or(HarnessError::NoTargets)?;
    let span = tracing::info_span!("backend", backend = backend);
    let _guard = span.enter();

    tracing::info!("connecting");
    let mut adapter = match connect() {
        Ok(adapter) => adapter,
        Err(e) => {
            tracing::warn!(phase = %Phase::Connect, error = %e, "connection failed");
            return Ok(BackendResult::failed(backend, Phase::Connect, e));
        }
    };
    if let Err(e) = adapter.probe(settings.harness.timeout()) {
        tracing::warn!(phase = %Phase::Connect, error = %e, "readiness probe failed");
        return Ok(BackendResult::failed(backend, Phase::Connect, e));
    }

    let result = measure(&mut adapter, backend, first, targets, settings);

    if let Err(e) = adapter.close() {
        tracing::warn!(error = %e, "failed to close connection");
    }

    Ok(result)
}

fn measure<A: QueryAdapter>(
    adapter: &mut A,
    backend: &str,
    first: &QueryTarget,
    targets: &[QueryTarget],
    settings: &RunSettings,
) -> BackendResult {
    let harness = settings.harness;

    tracing::info!(target_id = %first, "measuring single query");
    let single = match harness.measure_single(adapter, first) {
        Ok(sample) => sample,
        Err(e) => return record_failure(backend, e),
    };

    tracing::info!(
        targets = targets.len(),
        repetitions = settings.repetitions,
        "measuring batch"
    );
    let samples = match harness.measure_batch(adapter, targets, settings.repetitions) {
        Ok(samples) => samples,
        Err(e) => return record_failure(backend, e),
    };

    tracing::info!(
        single_ms = single.seconds() * 1000.0,
        samples = samples.len(),
        "backend measured"
    );

    BackendResult::Measured {
        backend: backend.to_string(),
        single,
        samples,
    }
}

fn record_failure(backend: &str, err: HarnessError) -> BackendResult {
    let phase = err.phase();
    tracing::warn!(phase = %phase, error = %err, "measurement aborted");
    match err {
        HarnessError::Query { source, .. } => BackendResult::failed(backend, phase, source),
        other => BackendResult::failed(backend, phase, other),
    }
}

/// Run every backend in order, one after another.
pub fn run_all(
    backends: Vec<(String, Connector<'_>)>,
    targets: &[QueryTarget],
    settings: &RunSettings,
) -> Result<Vec<BackendResult>, HarnessError> {
    if targets.is_empty() {
        return Err(HarnessError::NoTargets);
    }
    backends
        .into_iter()
        .map(|(name, connect)| run_backend(&name, connect, targets, settings))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;
    use std::time::Duration;

    use super::*;
    use crate::adapter::BackendKind;
    use crate::model::QueryOutcome;

    struct CountingAdapter {
        closed: Rc<Cell<bool>>,
        dropped: Rc<Cell<bool>>,
        fail_on: Option<usize>,
        calls: usize,
        ready: bool,
    }

    impl QueryAdapter for CountingAdapter {
        fn name(&self) -> &str {
            "counting"
        }

        fn kind(&self) -> BackendKind {
            BackendKind::NativeGraph
        }

        fn execute(
            &mut self,
            _target: &QueryTarget,
            timeout: Duration,
        ) -> Result<QueryOutcome, QueryError> {
            self.calls += 1;
            if self.fail_on == Some(self.calls) {
                return Err(QueryError::Timeout(timeout));
            }
            Ok(QueryOutcome::NoData)
        }

        fn probe(&mut self, _timeout: Duration) -> Result<(), QueryError> {
            if self.ready {
                Ok(())
            } else {
                Err(QueryError::NotReady("schema not loaded".to_string()))
            }
        }

        fn close(&mut self) -> Result<(), QueryError> {
            self.closed.set(true);
            Ok(())
        }
    }

    impl Drop for CountingAdapter {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    struct Flags {
        closed: Rc<Cell<bool>>,
        dropped: Rc<Cell<bool>>,
    }

    fn adapter(fail_on: Option<usize>, ready: bool) -> (CountingAdapter, Flags) {
        let closed = Rc::new(Cell::new(false));
        let dropped = Rc::new(Cell::new(false));
        let adapter = CountingAdapter {
            closed: closed.clone(),
            dropped: dropped.clone(),
            fail_on,
            calls: 0,
            ready,
        };
        (adapter, Flags { closed, dropped })
    }

    fn targets() -> Vec<QueryTarget> {
        vec![QueryTarget::from("A"), QueryTarget::from("B")]
    }

    #[test]
    fn test_successful_run() {
        let (a, flags) = adapter(None, true);
        let result = run_backend("neo4j", || Ok(a), &targets(), &RunSettings::default()).unwrap();
        match &result {
            BackendResult::Measured { single, samples, .. } => {
                assert_eq!(single.target().as_str(), "A");
                assert_eq!(samples.len(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(flags.closed.get());
        assert!(flags.dropped.get());
    }

    #[test]
    fn test_connect_failure_is_recorded() {
        let result = run_backend::<_, CountingAdapter>(
            "puppygraph",
            || Err(QueryError::Connection("refused".to_string())),
            &targets(),
            &RunSettings::default(),
        )
        .unwrap();
        match result {
            BackendResult::Failed { phase, message, .. } => {
                assert_eq!(phase, Phase::Connect);
                assert!(message.contains("refused"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_probe_failure_releases_connection() {
        let (a, flags) = adapter(None, false);
        let result = run_backend("puppygraph", || Ok(a), &targets(), &RunSettings::default())
            .unwrap();
        assert!(matches!(
            result,
            BackendResult::Failed {
                phase: Phase::Connect,
                ..
            }
        ));
        assert!(flags.dropped.get());
    }

    #[test]
    fn test_batch_failure_closes_connection() {
        // Calls 1 and 2 are warm-up and timed single; call 4 is the second batch call.
        let (a, flags) = adapter(Some(4), true);
        let result = run_backend("postgresql", || Ok(a), &targets(), &RunSettings::default())
            .unwrap();
        match &result {
            BackendResult::Failed { phase, .. } => assert_eq!(*phase, Phase::Batch),
            other => panic!("unexpected {:?}", other),
        }
        assert!(result.samples().is_empty());
        assert!(flags.closed.get());
        assert!(flags.dropped.get());
    }

    #[test]
    fn test_no_targets() {
        let err = run_backend::<_, CountingAdapter>(
            "postgresql",
            || panic!("must not connect"),
            &[],
            &RunSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, HarnessError::NoTargets));
    }

    #[test]
    fn test_run_all_isolates_failures() {
        let (ok, _) = adapter(None, true);
        let backends: Vec<(String, Connector<'_>)> = vec![
            (
                "down".to_string(),
                Box::new(|| Err(QueryError::Connection("refused".to_string()))),
            ),
            (
                "up".to_string(),
                Box::new(move || Ok(Box::new(ok) as Box<dyn QueryAdapter>)),
            ),
        ];
        let results = run_all(backends, &targets(), &RunSettings::default()).unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_failed());
        assert_eq!(results[1].backend(), "up");
        assert_eq!(results[1].samples().len(), 2);
    }
}
