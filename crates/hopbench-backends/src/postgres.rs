//! PostgreSQL backend.
//!
//! The relational rendition of the 2-hop aggregation is a two-stage CTE: the
//! distinct first-hop receivers, then every completed transfer they made,
//! joined back to `customers` for the receiver attributes.

use std::time::Duration;

use hopbench_core::dataset::{CardTransaction, Customer, Dataset, Transfer};
use hopbench_core::{
    BackendKind, PostgresConfig, QueryAdapter, QueryError, QueryOutcome, QueryTarget,
    TwoHopFeatures,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, QueryBuilder, Row};
use tokio::runtime::Runtime;

use crate::error::{Result, SetupError};
use crate::runtime::{adapter_runtime, bounded, current_thread};
use crate::setup::LoadSummary;

/// Name the adapter reports under.
pub const BACKEND_NAME: &str = "postgresql";

/// Rows per multi-row INSERT statement.
const INSERT_BATCH_SIZE: usize = 1000;

const TWO_HOP_SQL: &str = r#"
WITH first_hop AS (
    SELECT DISTINCT t1.to_customer_id
    FROM transactions t1
    WHERE t1.from_customer_id = $1
      AND t1.status = 'completed'
),
second_hop AS (
    SELECT t2.to_customer_id, t2.amount
    FROM transactions t2
    INNER JOIN first_hop fh ON t2.from_customer_id = fh.to_customer_id
    WHERE t2.status = 'completed'
)
SELECT
    COUNT(DISTINCT sh.to_customer_id) AS num_unique_2hop_receivers,
    COUNT(*) AS num_2hop_transactions,
    COALESCE(AVG(sh.amount), 0)::float8 AS avg_2hop_transaction_amount,
    COALESCE(SUM(sh.amount), 0)::float8 AS total_2hop_transaction_amount,
    COALESCE(MAX(sh.amount), 0)::float8 AS max_2hop_transaction_amount,
    COALESCE(MIN(sh.amount), 0)::float8 AS min_2hop_transaction_amount,
    COALESCE(AVG(c.risk_score), 0)::float8 AS avg_2hop_receiver_risk_score,
    COALESCE(AVG(c.account_balance), 0)::float8 AS avg_2hop_receiver_balance
FROM second_hop sh
LEFT JOIN customers c ON sh.to_customer_id = c.customer_id
"#;

const READY_SQL: &str = "SELECT to_regclass('public.customers') IS NOT NULL \
     AND to_regclass('public.transactions') IS NOT NULL AS ready";

fn query_error(err: sqlx::Error) -> QueryError {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::Configuration(_) => QueryError::Connection(err.to_string()),
        sqlx::Error::RowNotFound
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_) => QueryError::Malformed(err.to_string()),
        other => QueryError::backend(other),
    }
}

fn outcome_from_row(row: &PgRow) -> std::result::Result<QueryOutcome, QueryError> {
    let count = |col: &str| -> std::result::Result<u64, QueryError> {
        let value: i64 = row.try_get(col).map_err(query_error)?;
        u64::try_from(value).map_err(|_| QueryError::Malformed(format!("{} is negative: {}", col, value)))
    };
    let float = |col: &str| row.try_get::<f64, _>(col).map_err(query_error);

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

/// Relational adapter over a single pooled connection.
pub struct PostgresAdapter {
    pool: Option<PgPool>,
    rt: Runtime,
}

impl PostgresAdapter {
    /// Connect, giving up after `timeout`.
    pub fn connect(
        config: &PostgresConfig,
        timeout: Duration,
    ) -> std::result::Result<Self, QueryError> {
        let rt = adapter_runtime()?;
        let url = config.connection_url();

        let pool = bounded(&rt, timeout, async {
            PgPoolOptions::new()
                .max_connections(1)
                .acquire_timeout(timeout)
                .connect(&url)
                .await
                .map_err(|e| QueryError::Connection(e.to_string()))
        })?;

        tracing::debug!(host = %config.host, database = %config.database, "connected to PostgreSQL");
        Ok(Self {
            pool: Some(pool),
            rt,
        })
    }

    fn pool(&self) -> std::result::Result<&PgPool, QueryError> {
        self.pool
            .as_ref()
            .ok_or_else(|| QueryError::Connection("connection already closed".to_string()))
    }
}

impl QueryAdapter for PostgresAdapter {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::Relational
    }

    fn execute(
        &mut self,
        target: &QueryTarget,
        timeout: Duration,
    ) -> std::result::Result<QueryOutcome, QueryError> {
        let pool = self.pool()?;
        bounded(&self.rt, timeout, async {
            let row = sqlx::query(TWO_HOP_SQL)
                .bind(target.as_str())
                .fetch_one(pool)
                .await
                .map_err(query_error)?;
            outcome_from_row(&row)
        })
    }

    /// Fails with `NotReady` until the benchmark tables exist.
    fn probe(&mut self, timeout: Duration) -> std::result::Result<(), QueryError> {
        let pool = self.pool()?;
        let ready = bounded(&self.rt, timeout, async {
            let row = sqlx::query(READY_SQL)
                .fetch_one(pool)
                .await
                .map_err(query_error)?;
            row.try_get::<bool, _>("ready").map_err(query_error)
        })?;

        if ready {
            Ok(())
        } else {
            Err(QueryError::NotReady(
                "tables customers/transactions not found; run `hopbench setup` first".to_string(),
            ))
        }
    }

    fn close(&mut self) -> std::result::Result<(), QueryError> {
        if let Some(pool) = self.pool.take() {
            self.rt.block_on(pool.close());
        }
        Ok(())
    }
}

impl Drop for PostgresAdapter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// -------------------------------------------------------------------------
// Schema and loading
// -------------------------------------------------------------------------

const SCHEMA_SQL: [&str; 6] = [
    "DROP TABLE IF EXISTS card_transactions CASCADE",
    "DROP TABLE IF EXISTS transactions CASCADE",
    "DROP TABLE IF EXISTS customers CASCADE",
    r#"CREATE TABLE customers (
        customer_id VARCHAR(50) PRIMARY KEY,
        name VARCHAR(255),
        email VARCHAR(255),
        account_balance DECIMAL(15, 2),
        risk_score DECIMAL(5, 2),
        account_type VARCHAR(50),
        registration_date DATE
    )"#,
    r#"CREATE TABLE transactions (
        transaction_id VARCHAR(50) PRIMARY KEY,
        from_customer_id VARCHAR(50) REFERENCES customers(customer_id),
        to_customer_id VARCHAR(50) REFERENCES customers(customer_id),
        amount DECIMAL(15, 2),
        transaction_date TIMESTAMP,
        transaction_type VARCHAR(50),
        status VARCHAR(50)
    )"#,
    r#"CREATE TABLE card_transactions (
        card_transaction_id VARCHAR(50) PRIMARY KEY,
        customer_id VARCHAR(50) REFERENCES customers(customer_id),
        merchant VARCHAR(255),
        amount DECIMAL(15, 2),
        transaction_date TIMESTAMP,
        card_type VARCHAR(50),
        merchant_category VARCHAR(50)
    )"#,
];

const INDEX_SQL: [&str; 6] = [
    "CREATE INDEX idx_transactions_from ON transactions(from_customer_id)",
    "CREATE INDEX idx_transactions_to ON transactions(to_customer_id)",
    "CREATE INDEX idx_transactions_date ON transactions(transaction_date)",
    "CREATE INDEX idx_transactions_status ON transactions(status)",
    "CREATE INDEX idx_card_transactions_customer ON card_transactions(customer_id)",
    "CREATE INDEX idx_card_transactions_date ON card_transactions(transaction_date)",
];

fn quote_ident(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn customers_insert(chunk: &[Customer]) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(
        "INSERT INTO customers (customer_id, name, email, account_balance, risk_score, \
         account_type, registration_date) ",
    );
    qb.push_values(chunk, |mut row, c| {
        row.push_bind(&c.customer_id)
            .push_bind(&c.name)
            .push_bind(&c.email)
            .push_bind(c.account_balance)
            .push_bind(c.risk_score)
            .push_bind(&c.account_type)
            .push_bind(c.registration_date);
    });
    qb
}

fn transfers_insert(chunk: &[Transfer]) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(
        "INSERT INTO transactions (transaction_id, from_customer_id, to_customer_id, amount, \
         transaction_date, transaction_type, status) ",
    );
    qb.push_values(chunk, |mut row, t| {
        row.push_bind(&t.transaction_id)
            .push_bind(&t.from_customer_id)
            .push_bind(&t.to_customer_id)
            .push_bind(t.amount)
            .push_bind(t.transaction_date)
            .push_bind(&t.transaction_type)
            .push_bind(&t.status);
    });
    qb
}

fn card_transactions_insert(chunk: &[CardTransaction]) -> QueryBuilder<'_, Postgres> {
    let mut qb = QueryBuilder::new(
        "INSERT INTO card_transactions (card_transaction_id, customer_id, merchant, amount, \
         transaction_date, card_type, merchant_category) ",
    );
    qb.push_values(chunk, |mut row, ct| {
        row.push_bind(&ct.card_transaction_id)
            .push_bind(&ct.customer_id)
            .push_bind(&ct.merchant)
            .push_bind(ct.amount)
            .push_bind(ct.transaction_date)
            .push_bind(&ct.card_type)
            .push_bind(&ct.merchant_category);
    });
    qb
}

/// Creates the relational schema and bulk-loads a dataset.
pub struct PostgresLoader {
    pool: PgPool,
    rt: Runtime,
}

impl PostgresLoader {
    /// Connect to the benchmark database, creating it first if needed.
    pub fn connect(config: &PostgresConfig) -> Result<Self> {
        let rt = current_thread()?;

        let pool = rt.block_on(async {
            ensure_database(config).await?;
            let pool = PgPoolOptions::new()
                .max_connections(2)
                .connect(&config.connection_url())
                .await?;
            Ok::<_, SetupError>(pool)
        })?;

        Ok(Self { pool, rt })
    }

    /// Drop and recreate the three tables.
    pub fn create_schema(&self) -> Result<()> {
        tracing::info!("creating PostgreSQL schema");
        self.rt.block_on(async {
            for statement in SCHEMA_SQL {
                sqlx::query(statement).execute(&self.pool).await?;
            }
            Ok::<_, SetupError>(())
        })
    }

    /// Create the lookup indexes used by the 2-hop query.
    pub fn create_indexes(&self) -> Result<()> {
        tracing::info!("creating PostgreSQL indexes");
        self.rt.block_on(async {
            for statement in INDEX_SQL {
                sqlx::query(statement).execute(&self.pool).await?;
            }
            Ok::<_, SetupError>(())
        })
    }

    /// Insert every row of `dataset`, one transaction per table.
    pub fn load(&self, dataset: &Dataset) -> Result<LoadSummary> {
        self.rt.block_on(async {
            let mut tx = self.pool.begin().await?;
            for chunk in dataset.customers.chunks(INSERT_BATCH_SIZE) {
                customers_insert(chunk).build().execute(&mut *tx).await?;
            }
            tx.commit().await?;
            tracing::info!(rows = dataset.customers.len(), "customers loaded");

            let mut tx = self.pool.begin().await?;
            for chunk in dataset.transfers.chunks(INSERT_BATCH_SIZE) {
                transfers_insert(chunk).build().execute(&mut *tx).await?;
            }
            tx.commit().await?;
            tracing::info!(rows = dataset.transfers.len(), "transactions loaded");

            let mut tx = self.pool.begin().await?;
            for chunk in dataset.card_transactions.chunks(INSERT_BATCH_SIZE) {
                card_transactions_insert(chunk)
                    .build()
                    .execute(&mut *tx)
                    .await?;
            }
            tx.commit().await?;
            tracing::info!(rows = dataset.card_transactions.len(), "card transactions loaded");

            Ok::<_, SetupError>(())
        })?;

        self.row_counts()
    }

    /// Current row count of each table.
    pub fn row_counts(&self) -> Result<LoadSummary> {
        self.rt.block_on(async {
            let count = |table: &'static str| async move {
                let sql = format!("SELECT COUNT(*) FROM {}", table);
                let n: i64 = sqlx::query_scalar(&sql).fetch_one(&self.pool).await?;
                Ok::<_, SetupError>(n.max(0) as usize)
            };
            Ok::<_, SetupError>(LoadSummary {
                customers: count("customers").await?,
                transfers: count("transactions").await?,
                card_transactions: count("card_transactions").await?,
            })
        })
    }

    pub fn close(self) {
        self.rt.block_on(self.pool.close());
    }
}

/// Create the configured database through the `postgres` maintenance
/// database when it does not exist yet.
async fn ensure_database(config: &PostgresConfig) -> Result<()> {
    let admin = PostgresConfig {
        database: "postgres".to_string(),
        ..config.clone()
    };
    let pool = PgPoolOptions::new()
        .max_connections(1)
        .connect(&admin.connection_url())
        .await?;

    let exists: bool =
        sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM pg_database WHERE datname = $1)")
            .bind(&config.database)
            .fetch_one(&pool)
            .await?;

    if !exists {
        tracing::info!(database = %config.database, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&config.database)))
            .execute(&pool)
            .await?;
    }
    pool.close().await;
    Ok(())
}
