//! Core value types: query targets, feature payloads and timing samples.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Opaque identifier of the entity a query is issued for.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryTarget(String);

impl QueryTarget {
    /// Create a target from any string-like identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Borrow the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QueryTarget {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for QueryTarget {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<u64> for QueryTarget {
    fn from(id: u64) -> Self {
        Self(id.to_string())
    }
}

/// Aggregated features of the customers reached in two transfer hops.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TwoHopFeatures {
    pub num_unique_2hop_receivers: u64,
    pub num_2hop_transactions: u64,
    pub avg_2hop_transaction_amount: f64,
    pub total_2hop_transaction_amount: f64,
    pub max_2hop_transaction_amount: f64,
    pub min_2hop_transaction_amount: f64,
    pub avg_2hop_receiver_risk_score: f64,
    pub avg_2hop_receiver_balance: f64,
}

impl TwoHopFeatures {
    /// Column names in the order [`TwoHopFeatures::values`] yields them.
    pub const COLUMNS: [&'static str; 8] = [
        "num_unique_2hop_receivers",
        "num_2hop_transactions",
        "avg_2hop_transaction_amount",
        "total_2hop_transaction_amount",
        "max_2hop_transaction_amount",
        "min_2hop_transaction_amount",
        "avg_2hop_receiver_risk_score",
        "avg_2hop_receiver_balance",
    ];

    /// Feature values as display strings, in [`TwoHopFeatures::COLUMNS`] order.
    pub fn values(&self) -> [String; 8] {
        [
            self.num_unique_2hop_receivers.to_string(),
            self.num_2hop_transactions.to_string(),
            format!("{:.4}", self.avg_2hop_transaction_amount),
            format!("{:.4}", self.total_2hop_transaction_amount),
            format!("{:.4}", self.max_2hop_transaction_amount),
            format!("{:.4}", self.min_2hop_transaction_amount),
            format!("{:.4}", self.avg_2hop_receiver_risk_score),
            format!("{:.4}", self.avg_2hop_receiver_balance),
        ]
    }
}

/// Result payload of one adapter invocation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "features", rename_all = "snake_case")]
pub enum QueryOutcome {
    /// The entity has 2-hop transfers; here are their aggregates.
    Features(TwoHopFeatures),
    /// The entity has no outbound 2-hop transfers.
    NoData,
}

impl QueryOutcome {
    /// Build an outcome from raw aggregates, mapping zero transactions to
    /// [`QueryOutcome::NoData`].
    pub fn from_features(features: TwoHopFeatures) -> Self {
        if features.num_2hop_transactions == 0 {
            QueryOutcome::NoData
        } else {
            QueryOutcome::Features(features)
        }
    }

    /// Features, if any.
    pub fn features(&self) -> Option<&TwoHopFeatures> {
        match self {
            QueryOutcome::Features(f) => Some(f),
            QueryOutcome::NoData => None,
        }
    }

    /// Check whether this is the no-data sentinel.
    pub fn is_no_data(&self) -> bool {
        matches!(self, QueryOutcome::NoData)
    }
}

/// One measured adapter execution.
///
/// Fields are private; a sample cannot be changed after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingSample {
    backend: String,
    target: QueryTarget,
    seconds: f64,
    outcome: QueryOutcome,
}

impl TimingSample {
    /// Create a sample from a monotonic-clock measurement.
    pub fn new(
        backend: impl Into<String>,
        target: QueryTarget,
        elapsed: Duration,
        outcome: QueryOutcome,
    ) -> Self {
        Self::from_secs(backend, target, elapsed.as_secs_f64(), outcome)
    }

    /// Create a sample from a raw duration in seconds.
    ///
    /// No validation happens here; [`crate::stats::compute_stats`] rejects
    /// negative and non-finite durations.
    pub fn from_secs(
        backend: impl Into<String>,
        target: QueryTarget,
        seconds: f64,
        outcome: QueryOutcome,
    ) -> Self {
        Self {
            backend: backend.into(),
            target,
            seconds,
            outcome,
        }
    }

    pub fn backend(&self) -> &str {
        &self.backend
    }

    pub fn target(&self) -> &QueryTarget {
        &self.target
    }

    /// Elapsed time in seconds.
    pub fn seconds(&self) -> f64 {
        self.seconds
    }

    pub fn outcome(&self) -> &QueryOutcome {
        &self.outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_conversions() {
        assert_eq!(QueryTarget::from("CUST_000001").as_str(), "CUST_000001");
        assert_eq!(QueryTarget::from(42u64).to_string(), "42");
        assert_eq!(
            QueryTarget::from(String::from("a")),
            QueryTarget::new("a")
        );
    }

    #[test]
    fn test_zero_transactions_is_no_data() {
        let outcome = QueryOutcome::from_features(TwoHopFeatures::default());
        assert!(outcome.is_no_data());
        assert!(outcome.features().is_none());

        let features = TwoHopFeatures {
            num_unique_2hop_receivers: 3,
            num_2hop_transactions: 4,
            ..Default::default()
        };
        let outcome = QueryOutcome::from_features(features);
        assert_eq!(outcome.features().unwrap().num_2hop_transactions, 4);
    }

    #[test]
    fn test_sample_keeps_sub_millisecond_resolution() {
        let sample = TimingSample::new(
            "postgresql",
            QueryTarget::from("CUST_000001"),
            Duration::from_micros(250),
            QueryOutcome::NoData,
        );
        assert!((sample.seconds() - 0.000_25).abs() < 1e-12);
        assert_eq!(sample.backend(), "postgresql");
    }

    #[test]
    fn test_feature_columns_match_values() {
        let values = TwoHopFeatures::default().values();
        assert_eq!(values.len(), TwoHopFeatures::COLUMNS.len());
        assert_eq!(values[0], "0");
        assert_eq!(values[2], "0.0000");
    }
}
