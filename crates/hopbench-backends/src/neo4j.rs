//! Neo4j backend over Bolt.

use std::time::Duration;

use hopbench_core::dataset::Dataset;
use hopbench_core::{
    BackendKind, Neo4jConfig, QueryAdapter, QueryError, QueryOutcome, QueryTarget,
    TwoHopFeatures,
};
use neo4rs::{query, Graph, Row};
use tokio::runtime::Runtime;

use crate::error::{Result, SetupError};
use crate::runtime::{adapter_runtime, bounded, current_thread};
use crate::setup::LoadSummary;

/// Name the adapter reports under.
pub const BACKEND_NAME: &str = "neo4j";

/// Rows per UNWIND batch while loading.
const LOAD_BATCH_SIZE: usize = 1000;

const TWO_HOP_CYPHER: &str = r#"
MATCH (source:Customer {customer_id: $customer_id})-[t1:TRANSFERRED]->(hop1:Customer)
WHERE t1.status = 'completed'
WITH DISTINCT hop1
MATCH (hop1)-[t2:TRANSFERRED]->(hop2:Customer)
WHERE t2.status = 'completed'
RETURN
    COUNT(DISTINCT hop2) AS num_unique_2hop_receivers,
    COUNT(t2) AS num_2hop_transactions,
    AVG(t2.amount) AS avg_2hop_transaction_amount,
    SUM(t2.amount) AS total_2hop_transaction_amount,
    MAX(t2.amount) AS max_2hop_transaction_amount,
    MIN(t2.amount) AS min_2hop_transaction_amount,
    AVG(hop2.risk_score) AS avg_2hop_receiver_risk_score,
    AVG(hop2.account_balance) AS avg_2hop_receiver_balance
"#;

const CUSTOMER_COUNT_CYPHER: &str = "MATCH (c:Customer) RETURN count(c) AS n";

fn outcome_from_row(row: &Row) -> std::result::Result<QueryOutcome, QueryError> {
    let count = |col: &str| -> std::result::Result<u64, QueryError> {
        let value: i64 = row
            .get(col)
            .map_err(|e| QueryError::Malformed(format!("{}: {}", col, e)))?;
        u64::try_from(value).map_err(|_| QueryError::Malformed(format!("{} is negative: {}", col, value)))
    };
    // Aggregates over an empty match come back as null.
    let float = |col: &str| -> std::result::Result<f64, QueryError> {
        row.get::<Option<f64>>(col)
            .map(|v| v.unwrap_or(0.0))
            .map_err(|e| QueryError::Malformed(format!("{}: {}", col, e)))
    };

    Ok(QueryOutcome::from_features(TwoHopFeatures {
        num_unique_2hop_receivers: count("num_unique_2hop_receivers")?,
        num_2hop_transactions: count("num_2hop_transactions")?,
        avg_2hop_transaction_amount: float("avg_2hop_transaction_amount")?,
        total_2hop_transaction_amount: float("total_2hop_transaction_amount")?,
        max_2hop_transaction_amount: float("max_2hop_transaction_amount")?,
        min_2hop_transaction_amount: float("min_2hop_transaction_amount")?,
        avg_2hop_receiver_risk_score: float("avg_2hop_receiver_risk_score")?,
        avg_2hop_receiver_balance: float("avg_2hop_receiver_balance")?,
    }))
}

/// Native graph adapter.
pub struct Neo4jAdapter {
    graph: Option<Graph>,
    rt: Runtime,
}

impl Neo4jAdapter {
    /// Connect, giving up after `timeout`.
    pub fn connect(
        config: &Neo4jConfig,
        timeout: Duration,
    ) -> std::result::Result<Self, QueryError> {
        let rt = adapter_runtime()?;
        let graph = bounded(&rt, timeout, async {
            let graph = Graph::new(config.uri.as_str(), config.user.as_str(), config.password.as_str())
                .await
                .map_err(|e| QueryError::Connection(e.to_string()))?;
            // The pool connects lazily; force one round trip.
            graph
                .run(query("RETURN 1"))
                .await
                .map_err(|e| QueryError::Connection(e.to_string()))?;
            Ok(graph)
        })?;

        tracing::debug!(uri = %config.uri, "connected to Neo4j");
        Ok(Self {
            graph: Some(graph),
            rt,
        })
    }

    fn graph(&self) -> std::result::Result<&Graph, QueryError> {
        self.graph
            .as_ref()
            .ok_or_else(|| QueryError::Connection("connection already closed".to_string()))
    }
}

impl QueryAdapter for Neo4jAdapter {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::NativeGraph
    }

    fn execute(
        &mut self,
        target: &QueryTarget,
        timeout: Duration,
    ) -> std::result::Result<QueryOutcome, QueryError> {
        let graph = self.graph()?;
        bounded(&self.rt, timeout, async {
            let mut result = graph
                .execute(query(TWO_HOP_CYPHER).param("customer_id", target.as_str()))
                .await
                .map_err(QueryError::backend)?;
            match result.next().await.map_err(QueryError::backend)? {
                Some(row) => outcome_from_row(&row),
                None => Ok(QueryOutcome::NoData),
            }
        })
    }

    /// Fails with `NotReady` while the graph has no `Customer` nodes.
    fn probe(&mut self, timeout: Duration) -> std::result::Result<(), QueryError> {
        let graph = self.graph()?;
        let customers = bounded(&self.rt, timeout, async {
            let mut result = graph
                .execute(query(CUSTOMER_COUNT_CYPHER))
                .await
                .map_err(QueryError::backend)?;
            match result.next().await.map_err(QueryError::backend)? {
                Some(row) => row
                    .get::<i64>("n")
                    .map_err(|e| QueryError::Malformed(e.to_string())),
                None => Ok(0),
            }
        })?;

        if customers > 0 {
            Ok(())
        } else {
            Err(QueryError::NotReady(
                "no Customer nodes found; run `hopbench setup` first".to_string(),
            ))
        }
    }

    fn close(&mut self) -> std::result::Result<(), QueryError> {
        if let Some(graph) = self.graph.take() {
            let _guard = self.rt.enter();
            drop(graph);
        }
        Ok(())
    }
}

impl Drop for Neo4jAdapter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// -------------------------------------------------------------------------
// Loading
// -------------------------------------------------------------------------

const CONSTRAINTS_CYPHER: [&str; 5] = [
    "CREATE CONSTRAINT customer_id_unique IF NOT EXISTS FOR (c:Customer) REQUIRE c.customer_id IS UNIQUE",
    "CREATE CONSTRAINT card_transaction_id_unique IF NOT EXISTS FOR (ct:CardTransaction) REQUIRE ct.card_transaction_id IS UNIQUE",
    "CREATE INDEX customer_email IF NOT EXISTS FOR (c:Customer) ON (c.email)",
    "CREATE INDEX transferred_status IF NOT EXISTS FOR ()-[t:TRANSFERRED]-() ON (t.status)",
    "CREATE INDEX card_transaction_date IF NOT EXISTS FOR (ct:CardTransaction) ON (ct.transaction_date)",
];

const LOAD_CUSTOMERS_CYPHER: &str = r#"
UNWIND range(0, size($ids) - 1) AS i
CREATE (:Customer {
    customer_id: $ids[i],
    name: $names[i],
    email: $emails[i],
    account_balance: $balances[i],
    risk_score: $risk_scores[i],
    account_type: $account_types[i],
    registration_date: $registration_dates[i]
})
"#;

const LOAD_TRANSFERS_CYPHER: &str = r#"
UNWIND range(0, size($ids) - 1) AS i
MATCH (from:Customer {customer_id: $from_ids[i]})
MATCH (to:Customer {customer_id: $to_ids[i]})
CREATE (from)-[:TRANSFERRED {
    transaction_id: $ids[i],
    amount: $amounts[i],
    transaction_date: $dates[i],
    transaction_type: $types[i],
    status: $statuses[i]
}]->(to)
"#;

const LOAD_CARD_TRANSACTIONS_CYPHER: &str = r#"
UNWIND range(0, size($ids) - 1) AS i
MATCH (c:Customer {customer_id: $customer_ids[i]})
CREATE (ct:CardTransaction {
    card_transaction_id: $ids[i],
    merchant: $merchants[i],
    amount: $amounts[i],
    transaction_date: $dates[i],
    card_type: $card_types[i],
    merchant_category: $categories[i]
})
CREATE (c)-[:MADE_CARD_TRANSACTION]->(ct)
"#;

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

fn column<T, V>(rows: &[T], f: impl Fn(&T) -> V) -> Vec<V> {
    rows.iter().map(f).collect()
}

/// Clears the graph and loads a dataset as nodes and relationships.
pub struct Neo4jLoader {
    graph: Graph,
    rt: Runtime,
}

impl Neo4jLoader {
    pub fn connect(config: &Neo4jConfig) -> Result<Self> {
        let rt = current_thread()?;
        let graph = rt.block_on(Graph::new(
            config.uri.as_str(),
            config.user.as_str(),
            config.password.as_str(),
        ))?;
        Ok(Self { graph, rt })
    }

    /// Delete every node and relationship.
    pub fn clear(&self) -> Result<()> {
        tracing::info!("clearing Neo4j database");
        self.rt
            .block_on(self.graph.run(query("MATCH (n) DETACH DELETE n")))?;
        Ok(())
    }

    /// Create uniqueness constraints and lookup indexes.
    pub fn create_constraints(&self) -> Result<()> {
        self.rt.block_on(async {
            for statement in CONSTRAINTS_CYPHER {
                self.graph.run(query(statement)).await?;
            }
            Ok::<_, SetupError>(())
        })
    }

    pub fn load(&self, dataset: &Dataset) -> Result<LoadSummary> {
        self.rt.block_on(async {
            for (n, chunk) in dataset.customers.chunks(LOAD_BATCH_SIZE).enumerate() {
                let q = query(LOAD_CUSTOMERS_CYPHER)
                    .param("ids", column(chunk, |c| c.customer_id.clone()))
                    .param("names", column(chunk, |c| c.name.clone()))
                    .param("emails", column(chunk, |c| c.email.clone()))
                    .param("balances", column(chunk, |c| c.account_balance))
                    .param("risk_scores", column(chunk, |c| c.risk_score))
                    .param("account_types", column(chunk, |c| c.account_type.clone()))
                    .param(
                        "registration_dates",
                        column(chunk, |c| c.registration_date.to_string()),
                    );
                self.graph.run(q).await?;
                tracing::debug!(batch = n, "customer batch loaded");
            }
            tracing::info!(rows = dataset.customers.len(), "customers loaded");

            for chunk in dataset.transfers.chunks(LOAD_BATCH_SIZE) {
                let q = query(LOAD_TRANSFERS_CYPHER)
                    .param("ids", column(chunk, |t| t.transaction_id.clone()))
                    .param("from_ids", column(chunk, |t| t.from_customer_id.clone()))
                    .param("to_ids", column(chunk, |t| t.to_customer_id.clone()))
                    .param("amounts", column(chunk, |t| t.amount))
                    .param(
                        "dates",
                        column(chunk, |t| t.transaction_date.format(DATETIME_FORMAT).to_string()),
                    )
                    .param("types", column(chunk, |t| t.transaction_type.clone()))
                    .param("statuses", column(chunk, |t| t.status.clone()));
                self.graph.run(q).await?;
            }
            tracing::info!(rows = dataset.transfers.len(), "transfers loaded");

            for chunk in dataset.card_transactions.chunks(LOAD_BATCH_SIZE) {
                let q = query(LOAD_CARD_TRANSACTIONS_CYPHER)
                    .param("ids", column(chunk, |ct| ct.card_transaction_id.clone()))
                    .param("customer_ids", column(chunk, |ct| ct.customer_id.clone()))
                    .param("merchants", column(chunk, |ct| ct.merchant.clone()))
                    .param("amounts", column(chunk, |ct| ct.amount))
                    .param(
                        "dates",
                        column(chunk, |ct| ct.transaction_date.format(DATETIME_FORMAT).to_string()),
                    )
                    .param("card_types", column(chunk, |ct| ct.card_type.clone()))
                    .param("categories", column(chunk, |ct| ct.merchant_category.clone()));
                self.graph.run(q).await?;
            }
            tracing::info!(rows = dataset.card_transactions.len(), "card transactions loaded");

            Ok::<_, SetupError>(())
        })?;

        self.counts()
    }

    /// Node and relationship counts by label.
    pub fn counts(&self) -> Result<LoadSummary> {
        self.rt.block_on(async {
            let count = |cypher: &'static str| async move {
                let mut result = self.graph.execute(query(cypher)).await?;
                let n = match result.next().await? {
                    Some(row) => row
                        .get::<i64>("n")
                        .map_err(|e| SetupError::Rejected {
                            endpoint: "neo4j".to_string(),
                            message: e.to_string(),
                        })?,
                    None => 0,
                };
                Ok::<_, SetupError>(n.max(0) as usize)
            };
            Ok::<_, SetupError>(LoadSummary {
                customers: count(CUSTOMER_COUNT_CYPHER).await?,
                transfers: count("MATCH ()-[t:TRANSFERRED]->() RETURN count(t) AS n").await?,
                card_transactions: count("MATCH (ct:CardTransaction) RETURN count(ct) AS n")
                    .await?,
            })
        })
    }
}
