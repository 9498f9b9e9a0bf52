//! Preparing backends for a run: schema creation and data loading.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use hopbench_core::dataset::Dataset;
use hopbench_core::{BackendId, BenchConfig};

use crate::error::Result;
use crate::neo4j::Neo4jLoader;
use crate::postgres::PostgresLoader;
use crate::puppygraph::{GraphSchema, SchemaUploader, CONTAINER_DATA_DIR};

/// Timeout for PuppyGraph web API calls.
const WEB_API_TIMEOUT: Duration = Duration::from_secs(10);

/// Row counts after loading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoadSummary {
    pub customers: usize,
    pub transfers: usize,
    pub card_transactions: usize,
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} customers, {} transfers, {} card transactions",
            self.customers, self.transfers, self.card_transactions
        )
    }
}

/// What setting up one backend produced.
#[derive(Debug, Clone, PartialEq)]
pub enum SetupOutcome {
    /// Rows were inserted into the database.
    Loaded(LoadSummary),
    /// A schema file was written; `uploaded_to` names the endpoint that
    /// accepted it, if any did.
    SchemaWritten {
        path: PathBuf,
        uploaded_to: Option<String>,
    },
}

impl fmt::Display for SetupOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupOutcome::Loaded(summary) => write!(f, "loaded {}", summary),
            SetupOutcome::SchemaWritten {
                path,
                uploaded_to: Some(url),
            } => write!(f, "schema {} uploaded to {}", path.display(), url),
            SetupOutcome::SchemaWritten {
                path,
                uploaded_to: None,
            } => write!(
                f,
                "schema written to {} (load it through the PuppyGraph web UI)",
                path.display()
            ),
        }
    }
}

/// Prepare one backend from `dataset`.
///
/// PostgreSQL and Neo4j are wiped and reloaded. PuppyGraph reads the CSV
/// files directly, so it only gets a schema file and an upload attempt.
pub fn setup_backend(
    backend: BackendId,
    config: &BenchConfig,
    dataset: &Dataset,
) -> Result<SetupOutcome> {
    let span = tracing::info_span!("setup", backend = backend.name());
    let _guard = span.enter();

    match backend {
        BackendId::Postgresql => {
            let loader = PostgresLoader::connect(&config.postgres)?;
            loader.create_schema()?;
            let summary = loader.load(dataset)?;
            loader.create_indexes()?;
            loader.close();
            Ok(SetupOutcome::Loaded(summary))
        }
        BackendId::Neo4j => {
            let loader = Neo4jLoader::connect(&config.neo4j)?;
            loader.clear()?;
            loader.create_constraints()?;
            Ok(SetupOutcome::Loaded(loader.load(dataset)?))
        }
        BackendId::PuppyGraph => {
            let schema = GraphSchema::banking(CONTAINER_DATA_DIR);
            let path = schema.write(&config.data_dir)?;

            let uploader = SchemaUploader::new(&config.puppygraph, WEB_API_TIMEOUT)?;
            let uploaded_to = match uploader.verify_connection() {
                Ok(()) => match uploader.upload(&schema) {
                    Ok(url) => Some(url),
                    Err(e) => {
                        tracing::warn!(error = %e, "automatic schema upload failed");
                        None
                    }
                },
                Err(e) => {
                    tracing::warn!(error = %e, "PuppyGraph web UI not reachable, skipping schema upload");
                    None
                }
            };
            Ok(SetupOutcome::SchemaWritten { path, uploaded_to })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopbench_core::config::PuppyGraphConfig;
    use hopbench_core::dataset::{generate, DatasetSpec};

    #[test]
    fn test_outcome_display() {
        let loaded = SetupOutcome::Loaded(LoadSummary {
            customers: 10,
            transfers: 20,
            card_transactions: 5,
        });
        assert_eq!(
            loaded.to_string(),
            "loaded 10 customers, 20 transfers, 5 card transactions"
        );

        let written = SetupOutcome::SchemaWritten {
            path: PathBuf::from("data/puppygraph_schema.json"),
            uploaded_to: None,
        };
        assert!(written.to_string().contains("web UI"));
    }

    #[test]
    fn test_unreachable_puppygraph_still_writes_schema() {
        let dir = tempfile::tempdir().unwrap();
        let config = BenchConfig::new()
            .with_data_dir(dir.path())
            .with_puppygraph(PuppyGraphConfig {
                host: "127.0.0.1".to_string(),
                web_port: 1,
                ..PuppyGraphConfig::default()
            });
        let dataset = generate(&DatasetSpec::new(5, 10, 0)).unwrap();

        let outcome = setup_backend(BackendId::PuppyGraph, &config, &dataset).unwrap();
        match outcome {
            SetupOutcome::SchemaWritten { path, uploaded_to } => {
                assert!(path.exists());
                assert_eq!(uploaded_to, None);
            }
            other => panic!("unexpected outcome {:?}", other),
        }
    }
}
