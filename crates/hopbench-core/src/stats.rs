//! Aggregate statistics over timing samples.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StatsError;
use crate::model::TimingSample;

/// Queries per second over a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Throughput {
    PerSecond(f64),
    /// The batch took no measurable time.
    Unbounded,
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Throughput::PerSecond(qps) => write!(f, "{:.2}", qps),
            Throughput::Unbounded => write!(f, "unbounded"),
        }
    }
}

/// Aggregate over the samples of one backend. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendStats {
    pub backend: String,
    pub count: usize,
    pub total: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl BackendStats {
    /// Samples per second, or [`Throughput::Unbounded`] for a zero total.
    pub fn throughput(&self) -> Throughput {
        if self.total > 0.0 {
            Throughput::PerSecond(self.count as f64 / self.total)
        } else {
            Throughput::Unbounded
        }
    }
}

/// Compute count, total, mean, min and max in a single pass.
///
/// The backend name is taken from the first sample.
pub fn compute_stats(samples: &[TimingSample]) -> Result<BackendStats, StatsError> {
    let first = samples.first().ok_or(StatsError::EmptySample)?;

    let mut total = 0.0;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for (index, sample) in samples.iter().enumerate() {
        let seconds = sample.seconds();
        if !seconds.is_finite() || seconds < 0.0 {
            return Err(StatsError::InvalidSample { index, seconds });
        }
        total += seconds;
        min = min.min(seconds);
        max = max.max(seconds);
    }

    let count = samples.len();
    // Rounding can push the mean a hair outside [min, max] for equal samples.
    let mean = (total / count as f64).clamp(min, max);

    Ok(BackendStats {
        backend: first.backend().to_string(),
        count,
        total,
        mean,
        min,
        max,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QueryOutcome, QueryTarget};

    fn samples(secs: &[f64]) -> Vec<TimingSample> {
        secs.iter()
            .enumerate()
            .map(|(i, s)| {
                TimingSample::from_secs("pg", QueryTarget::from(i as u64), *s, QueryOutcome::NoData)
            })
            .collect()
    }

    #[test]
    fn test_empty_is_rejected() {
        assert_eq!(compute_stats(&[]), Err(StatsError::EmptySample));
    }

    #[test]
    fn test_negative_duration_is_rejected() {
        let err = compute_stats(&samples(&[0.1, -1.0])).unwrap_err();
        assert_eq!(
            err,
            StatsError::InvalidSample {
                index: 1,
                seconds: -1.0
            }
        );
    }

    #[test]
    fn test_non_finite_duration_is_rejected() {
        assert!(matches!(
            compute_stats(&samples(&[f64::NAN])),
            Err(StatsError::InvalidSample { index: 0, .. })
        ));
        assert!(matches!(
            compute_stats(&samples(&[0.1, f64::INFINITY])),
            Err(StatsError::InvalidSample { index: 1, .. })
        ));
    }

    #[test]
    fn test_basic_aggregates() {
        let stats = compute_stats(&samples(&[0.01, 0.03, 0.02])).unwrap();
        assert_eq!(stats.backend, "pg");
        assert_eq!(stats.count, 3);
        assert!((stats.total - 0.06).abs() < 1e-12);
        assert!((stats.mean - 0.02).abs() < 1e-12);
        assert_eq!(stats.min, 0.01);
        assert_eq!(stats.max, 0.03);
        match stats.throughput() {
            Throughput::PerSecond(qps) => assert!((qps - 50.0).abs() < 1e-9),
            Throughput::Unbounded => panic!("expected finite throughput"),
        }
    }

    #[test]
    fn test_ordering_and_sum_properties() {
        let inputs: [&[f64]; 5] = [
            &[0.5],
            &[0.1, 0.1, 0.1],
            &[1e-7, 3.0, 0.25, 0.0],
            &[0.333, 0.333, 0.334, 0.2, 0.9, 1.1],
            &[0.1; 37],
        ];
        for secs in inputs {
            let stats = compute_stats(&samples(secs)).unwrap();
            assert!(stats.min <= stats.mean && stats.mean <= stats.max, "{:?}", stats);
            let product = stats.mean * stats.count as f64;
            assert!((stats.total - product).abs() <= 1e-9 * stats.total.max(1.0));
        }
    }

    #[test]
    fn test_zero_total_is_unbounded() {
        let stats = compute_stats(&samples(&[0.0, 0.0])).unwrap();
        assert_eq!(stats.throughput(), Throughput::Unbounded);
        assert_eq!(stats.throughput().to_string(), "unbounded");
    }
}
