//! Timing harness.
//!
//! Applies the same measurement methodology to every adapter: one untimed
//! warm-up followed by a timed single query, then an ordered batch with no
//! further warm-up. Durations come from the monotonic clock.

use std::time::{Duration, Instant};

use crate::adapter::QueryAdapter;
use crate::error::{HarnessError, Phase, QueryError};
use crate::model::{QueryOutcome, QueryTarget, TimingSample};

/// Default per-call timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u64 = 30;

/// Measurement driver.
#[derive(Debug, Clone, Copy)]
pub struct Harness {
    timeout: Duration,
}

impl Harness {
    /// Create a harness bounding every adapter call by `timeout`.
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Per-call timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Warm up once (untimed), then time exactly one call.
    pub fn measure_single<A>(
        &self,
        adapter: &mut A,
        target: &QueryTarget,
    ) -> Result<TimingSample, HarnessError>
    where
        A: QueryAdapter + ?Sized,
    {
        adapter
            .execute(target, self.timeout)
            .map_err(|e| query_failed(adapter.name(), Phase::WarmUp, e))?;

        let (elapsed, outcome) = self
            .timed(adapter, target)
            .map_err(|e| query_failed(adapter.name(), Phase::Timed, e))?;

        tracing::debug!(
            backend = adapter.name(),
            target = %target,
            elapsed_ms = elapsed.as_secs_f64() * 1000.0,
            "single query measured"
        );

        Ok(TimingSample::new(
            adapter.name(),
            target.clone(),
            elapsed,
            outcome,
        ))
    }

    /// Time `repetitions` calls per target, visiting targets in order.
    ///
    /// The first failing call aborts the batch; samples collected so far
    /// are dropped so that backends are never compared on unequal counts.
    pub fn measure_batch<A>(
        &self,
        adapter: &mut A,
        targets: &[QueryTarget],
        repetitions: usize,
    ) -> Result<Vec<TimingSample>, HarnessError>
    where
        A: QueryAdapter + ?Sized,
    {
        let mut samples = Vec::with_capacity(targets.len() * repetitions);

        for target in targets {
            for _ in 0..repetitions {
                let (elapsed, outcome) = self
                    .timed(adapter, target)
                    .map_err(|e| query_failed(adapter.name(), Phase::Batch, e))?;
                samples.push(TimingSample::new(
                    adapter.name(),
                    target.clone(),
                    elapsed,
                    outcome,
                ));
            }
        }

        tracing::debug!(
            backend = adapter.name(),
            samples = samples.len(),
            "batch measured"
        );

        Ok(samples)
    }

    fn timed<A>(
        &self,
        adapter: &mut A,
        target: &QueryTarget,
    ) -> Result<(Duration, QueryOutcome), QueryError>
    where
        A: QueryAdapter + ?Sized,
    {
        let start = Instant::now();
        let outcome = adapter.execute(target, self.timeout)?;
        Ok((start.elapsed(), outcome))
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_QUERY_TIMEOUT_SECS))
    }
}

fn query_failed(backend: &str, phase: Phase, source: QueryError) -> HarnessError {
    HarnessError::Query {
        backend: backend.to_string(),
        phase,
        source,
    }
}
