//! Error types for backend setup and loading.

use hopbench_core::error::DatasetError;
use thiserror::Error;

/// Errors raised while preparing a backend for a benchmark run.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("graph database error: {0}")]
    Graph(#[from] neo4rs::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dataset error: {0}")]
    Dataset(#[from] DatasetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server answered but refused the request.
    #[error("{endpoint} rejected the request: {message}")]
    Rejected { endpoint: String, message: String },
}

/// Result alias for setup operations.
pub type Result<T> = std::result::Result<T, SetupError>;
