//! PuppyGraph backend: Gremlin over the Gremlin Server HTTP endpoint, plus
//! the graph schema that maps the CSV files onto vertices and edges.

use std::path::{Path, PathBuf};
use std::time::Duration;

use hopbench_core::{
    BackendKind, PuppyGraphConfig, QueryAdapter, QueryError, QueryOutcome, QueryTarget,
    TwoHopFeatures,
};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tokio::runtime::Runtime;

use crate::error::{Result, SetupError};
use crate::runtime::{adapter_runtime, bounded, current_thread};

/// Name the adapter reports under.
pub const BACKEND_NAME: &str = "puppygraph";

/// Untyped GraphSON, so results arrive as plain JSON maps and lists.
const GRAPHSON_V1: &str = "application/vnd.gremlin-v1.0+json";

/// Mean/min/max fail on an empty stream, hence the coalesce around each.
const TWO_HOP_GREMLIN: &str = "g.V().has('Customer', 'customer_id', customer_id)\
.outE('TRANSFERRED').has('status', 'completed').inV().dedup()\
.outE('TRANSFERRED').has('status', 'completed')\
.fold()\
.project('num_unique_2hop_receivers', 'num_2hop_transactions', \
'avg_amount', 'total_amount', 'max_amount', 'min_amount', \
'avg_risk_score', 'avg_balance')\
.by(__.unfold().inV().dedup().count())\
.by(__.unfold().count())\
.by(__.coalesce(__.unfold().values('amount').mean(), __.constant(0)))\
.by(__.coalesce(__.unfold().values('amount').sum(), __.constant(0)))\
.by(__.coalesce(__.unfold().values('amount').max(), __.constant(0)))\
.by(__.coalesce(__.unfold().values('amount').min(), __.constant(0)))\
.by(__.coalesce(__.unfold().inV().values('risk_score').mean(), __.constant(0)))\
.by(__.coalesce(__.unfold().inV().values('account_balance').mean(), __.constant(0)))";

const CUSTOMER_PROBE_GREMLIN: &str = "g.V().hasLabel('Customer').limit(1).count()";

/// Result keys in `TwoHopFeatures` field order.
const RESULT_KEYS: [&str; 8] = [
    "num_unique_2hop_receivers",
    "num_2hop_transactions",
    "avg_amount",
    "total_amount",
    "max_amount",
    "min_amount",
    "avg_risk_score",
    "avg_balance",
];

/// Strip GraphSON 2/3 type wrappers (`{"@type": .., "@value": ..}`).
pub fn untype(value: Value) -> Value {
    match value {
        Value::Object(mut obj) if obj.contains_key("@type") && obj.contains_key("@value") => {
            let kind = obj.remove("@type");
            let inner = obj.remove("@value").unwrap_or(Value::Null);
            match (kind.as_ref().and_then(Value::as_str), inner) {
                (Some("g:Map"), Value::Array(items)) => {
                    let mut map = Map::new();
                    let mut items = items.into_iter().map(untype);
                    while let (Some(k), Some(v)) = (items.next(), items.next()) {
                        let key = match k {
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                        map.insert(key, v);
                    }
                    Value::Object(map)
                }
                (_, inner) => untype(inner),
            }
        }
        Value::Object(obj) => Value::Object(obj.into_iter().map(|(k, v)| (k, untype(v))).collect()),
        Value::Array(items) => Value::Array(items.into_iter().map(untype).collect()),
        other => other,
    }
}

/// Gremlin Server HTTP response body.
#[derive(Debug, Deserialize)]
struct GremlinResponse {
    status: GremlinStatus,
    #[serde(default)]
    result: Option<GremlinResult>,
}

#[derive(Debug, Deserialize)]
struct GremlinStatus {
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct GremlinResult {
    #[serde(default)]
    data: Value,
}

/// Result rows of a response, with type wrappers removed.
fn result_rows(body: Value) -> std::result::Result<Vec<Value>, QueryError> {
    let response: GremlinResponse = serde_json::from_value(body)
        .map_err(|e| QueryError::Malformed(format!("unexpected Gremlin response: {}", e)))?;

    match response.status.code {
        200 => {}
        204 => return Ok(Vec::new()),
        code => return Err(status_error(code, &response.status.message)),
    }

    match response.result.map(|r| untype(r.data)) {
        Some(Value::Array(rows)) => Ok(rows),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Ok(vec![other]),
    }
}

fn status_error(code: u16, message: &str) -> QueryError {
    let lower = message.to_lowercase();
    if lower.contains("schema") || lower.contains("not found") {
        QueryError::NotReady(format!("graph schema not loaded: {}", message))
    } else {
        QueryError::backend(format!("Gremlin status {}: {}", code, message))
    }
}

fn number(map: &Map<String, Value>, key: &str) -> std::result::Result<f64, QueryError> {
    match map.get(key) {
        Some(Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| QueryError::Malformed(format!("{} is not a finite number", key))),
        Some(Value::Null) => Ok(0.0),
        Some(other) => Err(QueryError::Malformed(format!("{} has unexpected value {}", key, other))),
        None => Err(QueryError::Malformed(format!("missing {} in result", key))),
    }
}

fn count(map: &Map<String, Value>, key: &str) -> std::result::Result<u64, QueryError> {
    let value = number(map, key)?;
    if value < 0.0 || value.fract() != 0.0 {
        return Err(QueryError::Malformed(format!("{} is not a count: {}", key, value)));
    }
    Ok(value as u64)
}

/// Turn the projected map into an outcome.
fn outcome_from_rows(rows: Vec<Value>) -> std::result::Result<QueryOutcome, QueryError> {
    let row = match rows.into_iter().next() {
        Some(Value::Object(map)) => map,
        Some(other) => {
            return Err(QueryError::Malformed(format!("expected a map, got {}", other)))
        }
        None => return Ok(QueryOutcome::NoData),
    };

    let [receivers, transactions, avg, total, max, min, risk, balance] = RESULT_KEYS;
    Ok(QueryOutcome::from_features(TwoHopFeatures {
        num_unique_2hop_receivers: count(&row, receivers)?,
        num_2hop_transactions: count(&row, transactions)?,
        avg_2hop_transaction_amount: number(&row, avg)?,
        total_2hop_transaction_amount: number(&row, total)?,
        max_2hop_transaction_amount: number(&row, max)?,
        min_2hop_transaction_amount: number(&row, min)?,
        avg_2hop_receiver_risk_score: number(&row, risk)?,
        avg_2hop_receiver_balance: number(&row, balance)?,
    }))
}

fn request_error(err: reqwest::Error, timeout: Duration) -> QueryError {
    if err.is_timeout() {
        QueryError::Timeout(timeout)
    } else if err.is_connect() {
        QueryError::Connection(err.to_string())
    } else if err.is_decode() {
        QueryError::Malformed(err.to_string())
    } else {
        QueryError::backend(err)
    }
}

/// Graph virtualization adapter speaking Gremlin over HTTP.
pub struct GremlinAdapter {
    client: Option<Client>,
    endpoint: String,
    rt: Runtime,
}

impl GremlinAdapter {
    /// Build the HTTP client. No request is sent until `probe` or `execute`.
    pub fn connect(
        config: &PuppyGraphConfig,
        timeout: Duration,
    ) -> std::result::Result<Self, QueryError> {
        let rt = adapter_runtime()?;
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| QueryError::Connection(e.to_string()))?;

        Ok(Self {
            client: Some(client),
            endpoint: config.gremlin_url(),
            rt,
        })
    }

    fn submit(
        &self,
        gremlin: &str,
        bindings: Value,
        timeout: Duration,
    ) -> std::result::Result<Vec<Value>, QueryError> {
        let client = self
            .client
            .as_ref()
            .ok_or_else(|| QueryError::Connection("connection already closed".to_string()))?;
        let body = json!({ "gremlin": gremlin, "bindings": bindings });

        bounded(&self.rt, timeout, async {
            let response = client
                .post(&self.endpoint)
                .header(reqwest::header::ACCEPT, GRAPHSON_V1)
                .timeout(timeout)
                .json(&body)
                .send()
                .await
                .map_err(|e| request_error(e, timeout))?;

            let status = response.status();
            let payload: Value = response
                .json()
                .await
                .map_err(|e| request_error(e, timeout))?;

            if status == StatusCode::OK || payload.get("status").is_some() {
                result_rows(payload)
            } else {
                Err(QueryError::backend(format!("HTTP {}: {}", status, payload)))
            }
        })
    }
}

impl QueryAdapter for GremlinAdapter {
    fn name(&self) -> &str {
        BACKEND_NAME
    }

    fn kind(&self) -> BackendKind {
        BackendKind::GraphVirtualization
    }

    fn execute(
        &mut self,
        target: &QueryTarget,
        timeout: Duration,
    ) -> std::result::Result<QueryOutcome, QueryError> {
        let rows = self.submit(
            TWO_HOP_GREMLIN,
            json!({ "customer_id": target.as_str() }),
            timeout,
        )?;
        outcome_from_rows(rows)
    }

    /// Fails with `NotReady` when no `Customer` vertex is visible, which is
    /// what an unloaded schema looks like from the query side.
    fn probe(&mut self, timeout: Duration) -> std::result::Result<(), QueryError> {
        let rows = self.submit(CUSTOMER_PROBE_GREMLIN, json!({}), timeout)?;
        let customers = rows.first().and_then(Value::as_f64).unwrap_or(0.0);
        if customers > 0.0 {
            Ok(())
        } else {
            Err(QueryError::NotReady(
                "no Customer vertices visible; load the PuppyGraph schema first".to_string(),
            ))
        }
    }

    fn close(&mut self) -> std::result::Result<(), QueryError> {
        if let Some(client) = self.client.take() {
            let _guard = self.rt.enter();
            drop(client);
        }
        Ok(())
    }
}

impl Drop for GremlinAdapter {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

// -------------------------------------------------------------------------
// Schema
// -------------------------------------------------------------------------

/// File name of the generated schema.
pub const SCHEMA_FILE: &str = "puppygraph_schema.json";

/// Where the data directory is mounted inside the PuppyGraph container.
pub const CONTAINER_DATA_DIR: &str = "/data";

/// Schema REST endpoints, tried in order.
const SCHEMA_ENDPOINTS: [&str; 3] = ["/api/v1/schema", "/schema", "/api/schema"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VertexSource {
    pub label: String,
    pub file: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeSource {
    pub label: String,
    pub file: String,
    pub from: String,
    pub from_id: String,
    pub to: String,
    pub to_id: String,
}

/// Mapping of CSV files onto graph vertices and edges.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphSchema {
    pub vertices: Vec<VertexSource>,
    pub edges: Vec<EdgeSource>,
}

impl GraphSchema {
    /// `Customer` vertices and `TRANSFERRED` edges over the CSVs in `data_root`.
    pub fn banking(data_root: &str) -> Self {
        let root = data_root.trim_end_matches('/');
        Self {
            vertices: vec![VertexSource {
                label: "Customer".to_string(),
                file: format!("{}/customers.csv", root),
                id: "customer_id".to_string(),
            }],
            edges: vec![EdgeSource {
                label: "TRANSFERRED".to_string(),
                file: format!("{}/transactions.csv", root),
                from: "Customer".to_string(),
                from_id: "from_customer_id".to_string(),
                to: "Customer".to_string(),
                to_id: "to_customer_id".to_string(),
            }],
        }
    }

    /// Write the schema as pretty JSON to `dir/puppygraph_schema.json`.
    pub fn write(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(SCHEMA_FILE);
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        tracing::info!(path = %path.display(), "PuppyGraph schema written");
        Ok(path)
    }
}

/// Talks to the PuppyGraph web API.
pub struct SchemaUploader {
    client: Client,
    base_url: String,
    user: String,
    password: String,
    rt: Runtime,
}

impl SchemaUploader {
    pub fn new(config: &PuppyGraphConfig, timeout: Duration) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(timeout).build()?,
            base_url: config.web_url(),
            user: config.user.clone(),
            password: config.password.clone(),
            rt: current_thread()?,
        })
    }

    /// Check that the web UI answers with a success status.
    pub fn verify_connection(&self) -> Result<()> {
        let status = self
            .rt
            .block_on(self.client.get(&self.base_url).send())?
            .status();
        require_success(&self.base_url, status)?;
        tracing::info!(url = %self.base_url, status = %status, "PuppyGraph reachable");
        Ok(())
    }

    /// POST the schema to the first endpoint that accepts it.
    pub fn upload(&self, schema: &GraphSchema) -> Result<String> {
        let mut last = SetupError::Rejected {
            endpoint: self.base_url.clone(),
            message: "no schema endpoint tried".to_string(),
        };

        for endpoint in SCHEMA_ENDPOINTS {
            let url = format!("{}{}", self.base_url, endpoint);
            let response = self.rt.block_on(
                self.client
                    .post(&url)
                    .basic_auth(&self.user, Some(&self.password))
                    .json(schema)
                    .send(),
            );

            match response {
                Ok(resp) if resp.status().is_success() => {
                    tracing::info!(endpoint = endpoint, "schema uploaded");
                    return Ok(url);
                }
                Ok(resp) => {
                    let status = resp.status();
                    let body = self.rt.block_on(resp.text()).unwrap_or_default();
                    tracing::debug!(endpoint = endpoint, status = %status, "schema upload refused");
                    last = SetupError::Rejected {
                        endpoint: url,
                        message: format!("{} {}", status, body.trim()),
                    };
                }
                Err(e) => {
                    tracing::debug!(endpoint = endpoint, error = %e, "schema upload failed");
                    last = SetupError::Http(e);
                }
            }
        }

        Err(last)
    }
}

fn require_success(endpoint: &str, status: StatusCode) -> Result<()> {
    if status.is_success() {
        Ok(())
    } else {
        Err(SetupError::Rejected {
            endpoint: endpoint.to_string(),
            message: format!("status {}", status),
        })
    }
}
