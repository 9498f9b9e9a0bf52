//! Command-line arguments.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use hopbench_core::config::{
    BackendId, BenchConfig, Neo4jConfig, PostgresConfig, PuppyGraphConfig, DEFAULT_DATA_DIR,
    DEFAULT_NEO4J_PASSWORD, DEFAULT_NEO4J_URI, DEFAULT_NEO4J_USER, DEFAULT_POSTGRES_DATABASE,
    DEFAULT_POSTGRES_HOST, DEFAULT_POSTGRES_PASSWORD, DEFAULT_POSTGRES_PORT,
    DEFAULT_POSTGRES_USER, DEFAULT_PUPPYGRAPH_GREMLIN_PORT, DEFAULT_PUPPYGRAPH_HOST,
    DEFAULT_PUPPYGRAPH_PASSWORD, DEFAULT_PUPPYGRAPH_USER, DEFAULT_PUPPYGRAPH_WEB_PORT,
    DEFAULT_REPETITIONS, DEFAULT_SAMPLE_SIZE,
};
use hopbench_core::dataset::{
    DatasetSpec, DEFAULT_CARD_TRANSACTIONS, DEFAULT_CUSTOMERS, DEFAULT_SEED, DEFAULT_TRANSACTIONS,
};
use hopbench_core::harness::DEFAULT_QUERY_TIMEOUT_SECS;
use hopbench_core::io::RESULTS_DIR;

/// 2-hop graph aggregation benchmark across PostgreSQL, Neo4j and PuppyGraph.
#[derive(Parser, Debug)]
#[command(name = "hopbench")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub options: Options,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate the synthetic banking dataset as CSV files.
    Generate,

    /// Load the dataset into the selected backends.
    Setup,

    /// Run the benchmark and write the report.
    Run,

    /// Generate, set up and run in one go.
    Pipeline {
        /// Reuse the existing CSV files.
        #[arg(long, alias = "skip-data")]
        skip_generate: bool,

        /// Reuse the data already loaded into the backends.
        #[arg(long)]
        skip_setup: bool,
    },
}

/// Settings shared by every subcommand.
#[derive(Args, Debug)]
pub struct Options {
    /// Backends to include (repeatable or comma separated).
    #[arg(long = "backend", value_delimiter = ',', global = true)]
    pub backends: Vec<BackendId>,

    /// Backend the speedups are computed against.
    #[arg(long, default_value = "postgresql", global = true)]
    pub baseline: BackendId,

    /// Directory for the generated CSV files.
    #[arg(long, env = "HOPBENCH_DATA_DIR", default_value = DEFAULT_DATA_DIR, global = true)]
    pub data_dir: PathBuf,

    /// Directory for the result files.
    #[arg(long, env = "HOPBENCH_RESULTS_DIR", default_value = RESULTS_DIR, global = true)]
    pub results_dir: PathBuf,

    /// Number of customers to generate.
    #[arg(long, default_value_t = DEFAULT_CUSTOMERS, global = true)]
    pub customers: usize,

    /// Number of customer-to-customer transfers to generate.
    #[arg(long, default_value_t = DEFAULT_TRANSACTIONS, global = true)]
    pub transactions: usize,

    /// Number of card transactions to generate.
    #[arg(long, default_value_t = DEFAULT_CARD_TRANSACTIONS, global = true)]
    pub card_transactions: usize,

    /// Number of customers queried per run.
    #[arg(long, default_value_t = DEFAULT_SAMPLE_SIZE, global = true)]
    pub sample_size: usize,

    /// Timed calls per customer in the batch phase.
    #[arg(long, default_value_t = DEFAULT_REPETITIONS, global = true)]
    pub repetitions: usize,

    /// Per-query timeout in seconds.
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        value_parser = clap::value_parser!(u64).range(1..),
        global = true
    )]
    pub timeout: u64,

    /// Seed for data generation and target selection.
    #[arg(long, default_value_t = DEFAULT_SEED, global = true)]
    pub seed: u64,

    #[arg(long, env = "POSTGRES_HOST", default_value = DEFAULT_POSTGRES_HOST, global = true)]
    pub postgres_host: String,

    #[arg(long, env = "POSTGRES_PORT", default_value_t = DEFAULT_POSTGRES_PORT, global = true)]
    pub postgres_port: u16,

    #[arg(long, env = "POSTGRES_DB", default_value = DEFAULT_POSTGRES_DATABASE, global = true)]
    pub postgres_db: String,

    #[arg(long, env = "POSTGRES_USER", default_value = DEFAULT_POSTGRES_USER, global = true)]
    pub postgres_user: String,

    #[arg(long, env = "POSTGRES_PASSWORD", default_value = DEFAULT_POSTGRES_PASSWORD, global = true, hide_env_values = true)]
    pub postgres_password: String,

    #[arg(long, env = "NEO4J_URI", default_value = DEFAULT_NEO4J_URI, global = true)]
    pub neo4j_uri: String,

    #[arg(long, env = "NEO4J_USER", default_value = DEFAULT_NEO4J_USER, global = true)]
    pub neo4j_user: String,

    #[arg(long, env = "NEO4J_PASSWORD", default_value = DEFAULT_NEO4J_PASSWORD, global = true, hide_env_values = true)]
    pub neo4j_password: String,

    #[arg(long, env = "PUPPYGRAPH_HOST", default_value = DEFAULT_PUPPYGRAPH_HOST, global = true)]
    pub puppygraph_host: String,

    /// PuppyGraph web UI / REST port.
    #[arg(long, env = "PUPPYGRAPH_PORT", default_value_t = DEFAULT_PUPPYGRAPH_WEB_PORT, global = true)]
    pub puppygraph_port: u16,

    #[arg(long, env = "PUPPYGRAPH_GREMLIN_PORT", default_value_t = DEFAULT_PUPPYGRAPH_GREMLIN_PORT, global = true)]
    pub puppygraph_gremlin_port: u16,

    #[arg(long, env = "PUPPYGRAPH_USER", default_value = DEFAULT_PUPPYGRAPH_USER, global = true)]
    pub puppygraph_user: String,

    #[arg(long, env = "PUPPYGRAPH_PASSWORD", default_value = DEFAULT_PUPPYGRAPH_PASSWORD, global = true, hide_env_values = true)]
    pub puppygraph_password: String,
}

impl Options {
    /// Convert command-line options to a benchmark configuration.
    pub fn into_config(self) -> BenchConfig {
        let dataset = DatasetSpec::new(self.customers, self.transactions, self.card_transactions)
            .with_seed(self.seed);

        BenchConfig::new()
            .with_postgres(PostgresConfig {
                host: self.postgres_host,
                port: self.postgres_port,
                database: self.postgres_db,
                user: self.postgres_user,
                password: self.postgres_password,
            })
            .with_neo4j(Neo4jConfig {
                uri: self.neo4j_uri,
                user: self.neo4j_user,
                password: self.neo4j_password,
            })
            .with_puppygraph(PuppyGraphConfig {
                host: self.puppygraph_host,
                web_port: self.puppygraph_port,
                gremlin_port: self.puppygraph_gremlin_port,
                user: self.puppygraph_user,
                password: self.puppygraph_password,
            })
            .with_data_dir(self.data_dir)
            .with_results_dir(self.results_dir)
            .with_dataset(dataset)
            .with_sample_size(self.sample_size)
            .with_repetitions(self.repetitions)
            .with_query_timeout(Duration::from_secs(self.timeout))
            .with_seed(self.seed)
            .with_baseline(self.baseline.name())
            .with_backends(self.backends)
    }
}
