//! hopbench backends
//!
//! Concrete [`QueryAdapter`] implementations and their loaders:
//!
//! - **PostgreSQL** (`sqlx`): CTE query over `customers` / `transactions`
//! - **Neo4j** (`neo4rs`): Cypher over Bolt
//! - **PuppyGraph** (`reqwest`): Gremlin over the Gremlin Server HTTP endpoint
//!
//! Each adapter owns a single-threaded tokio runtime and blocks on the
//! async driver, so the harness stays synchronous.

pub mod error;
pub mod neo4j;
pub mod postgres;
pub mod puppygraph;
mod runtime;
pub mod setup;

use hopbench_core::{BackendId, BenchConfig, Connector, QueryAdapter, QueryError};

pub use error::SetupError;
pub use neo4j::{Neo4jAdapter, Neo4jLoader};
pub use postgres::{PostgresAdapter, PostgresLoader};
pub use puppygraph::{GraphSchema, GremlinAdapter, SchemaUploader};
pub use setup::{setup_backend, LoadSummary, SetupOutcome};

/// Open an adapter for `backend`.
pub fn connect(
    backend: BackendId,
    config: &BenchConfig,
) -> Result<Box<dyn QueryAdapter>, QueryError> {
    let timeout = config.query_timeout;
    let adapter: Box<dyn QueryAdapter> = match backend {
        BackendId::Postgresql => Box::new(PostgresAdapter::connect(&config.postgres, timeout)?),
        BackendId::Neo4j => Box::new(Neo4jAdapter::connect(&config.neo4j, timeout)?),
        BackendId::PuppyGraph => Box::new(GremlinAdapter::connect(&config.puppygraph, timeout)?),
    };
    Ok(adapter)
}

/// Lazy connectors for every configured backend, in configured order.
pub fn connectors(config: &BenchConfig) -> Vec<(String, Connector<'_>)> {
    config
        .backends
        .iter()
        .map(|&backend| {
            let connector: Connector<'_> = Box::new(move || connect(backend, config));
            (backend.name().to_string(), connector)
        })
        .collect()
}
