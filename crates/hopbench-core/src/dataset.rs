//! Synthetic banking dataset and query target selection.
//!
//! Customers transfer money to each other; a small set of hub customers
//! originates a disproportionate share of transfers, which gives the
//! transfer graph a skewed out-degree distribution. Generation is
//! deterministic for a given seed and reference date.

use std::fs;
use std::path::Path;

use chrono::{Duration, NaiveDate, NaiveDateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::DatasetError;
use crate::model::QueryTarget;
use crate::report::escape_csv;

/// Default number of customers.
pub const DEFAULT_CUSTOMERS: usize = 10_000;
/// Default number of customer-to-customer transfers.
pub const DEFAULT_TRANSACTIONS: usize = 100_000;
/// Default number of card transactions.
pub const DEFAULT_CARD_TRANSACTIONS: usize = 50_000;
/// Default random seed.
pub const DEFAULT_SEED: u64 = 42;

/// Maximum number of hub customers.
const MAX_HUBS: usize = 100;
/// Share of transfers sent by a hub customer.
const HUB_SHARE: f64 = 0.3;

pub const CUSTOMERS_FILE: &str = "customers.csv";
pub const TRANSACTIONS_FILE: &str = "transactions.csv";
pub const CARD_TRANSACTIONS_FILE: &str = "card_transactions.csv";

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DATE_FORMAT: &str = "%Y-%m-%d";

const ACCOUNT_TYPES: [&str; 3] = ["savings", "checking", "business"];
const TRANSACTION_TYPES: [&str; 3] = ["transfer", "payment", "wire"];
const CARD_TYPES: [&str; 2] = ["credit", "debit"];
const MERCHANT_CATEGORIES: [&str; 5] = ["retail", "food", "gas", "entertainment", "travel"];
const MERCHANTS: [&str; 10] = [
    "Amazon",
    "Walmart",
    "Target",
    "Starbucks",
    "Shell",
    "McDonald's",
    "Best Buy",
    "Home Depot",
    "Costco",
    "Apple Store",
];

/// Dataset size and generation parameters.
#[derive(Debug, Clone)]
pub struct DatasetSpec {
    pub customers: usize,
    pub transactions: usize,
    pub card_transactions: usize,
    pub seed: u64,
    /// Dates are generated backwards from this day.
    pub reference_date: NaiveDate,
}

impl DatasetSpec {
    /// Spec with the given sizes, default seed, and today as reference date.
    pub fn new(customers: usize, transactions: usize, card_transactions: usize) -> Self {
        Self {
            customers,
            transactions,
            card_transactions,
            seed: DEFAULT_SEED,
            reference_date: Utc::now().date_naive(),
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_reference_date(mut self, date: NaiveDate) -> Self {
        self.reference_date = date;
        self
    }

    /// Number of hub customers for this spec.
    pub fn hub_count(&self) -> usize {
        MAX_HUBS.min(self.customers / 10)
    }
}

impl Default for DatasetSpec {
    fn default() -> Self {
        Self::new(DEFAULT_CUSTOMERS, DEFAULT_TRANSACTIONS, DEFAULT_CARD_TRANSACTIONS)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Customer {
    pub customer_id: String,
    pub name: String,
    pub email: String,
    pub account_balance: f64,
    pub risk_score: f64,
    pub account_type: String,
    pub registration_date: NaiveDate,
}

/// A customer-to-customer money transfer (a graph edge).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transfer {
    pub transaction_id: String,
    pub from_customer_id: String,
    pub to_customer_id: String,
    pub amount: f64,
    pub transaction_date: NaiveDateTime,
    pub transaction_type: String,
    pub status: String,
}

impl Transfer {
    /// Only completed transfers take part in the 2-hop aggregation.
    pub fn is_completed(&self) -> bool {
        self.status == "completed"
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardTransaction {
    pub card_transaction_id: String,
    pub customer_id: String,
    pub merchant: String,
    pub amount: f64,
    pub transaction_date: NaiveDateTime,
    pub card_type: String,
    pub merchant_category: String,
}

/// A complete generated or loaded dataset.
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub customers: Vec<Customer>,
    pub transfers: Vec<Transfer>,
    pub card_transactions: Vec<CardTransaction>,
}

impl Dataset {
    /// Customer identifiers in generation order.
    pub fn customer_ids(&self) -> Vec<String> {
        self.customers.iter().map(|c| c.customer_id.clone()).collect()
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn pick<'a>(rng: &mut StdRng, values: &[&'a str]) -> &'a str {
    values[rng.gen_range(0..values.len())]
}

fn random_datetime(rng: &mut StdRng, reference: NaiveDate, max_days: i64) -> NaiveDateTime {
    let midnight = reference.and_time(chrono::NaiveTime::MIN);
    midnight - Duration::days(rng.gen_range(0..=max_days))
        + Duration::seconds(rng.gen_range(0..86_400))
}

/// Generate a dataset.
pub fn generate(spec: &DatasetSpec) -> Result<Dataset, DatasetError> {
    if spec.transactions > 0 && spec.customers < 2 {
        return Err(DatasetError::InvalidSpec(
            "transfers need at least two customers".to_string(),
        ));
    }
    if spec.card_transactions > 0 && spec.customers == 0 {
        return Err(DatasetError::InvalidSpec(
            "card transactions need at least one customer".to_string(),
        ));
    }

    let mut rng = StdRng::seed_from_u64(spec.seed);

    tracing::info!(customers = spec.customers, "generating customers");
    let customers: Vec<Customer> = (0..spec.customers)
        .map(|i| Customer {
            customer_id: format!("CUST_{:06}", i),
            name: format!("Customer_{}", i),
            email: format!("customer_{}@example.com", i),
            account_balance: round2(rng.gen_range(1000.0..=100_000.0)),
            risk_score: round2(rng.gen_range(0.0..=100.0)),
            account_type: pick(&mut rng, &ACCOUNT_TYPES).to_string(),
            registration_date: spec.reference_date
                - Duration::days(rng.gen_range(1..=1000)),
        })
        .collect();

    let ids: Vec<&str> = customers.iter().map(|c| c.customer_id.as_str()).collect();
    let hubs: Vec<&str> = ids
        .choose_multiple(&mut rng, spec.hub_count())
        .copied()
        .collect();

    tracing::info!(
        transactions = spec.transactions,
        hubs = hubs.len(),
        "generating transfers"
    );
    let mut transfers = Vec::with_capacity(spec.transactions);
    for i in 0..spec.transactions {
        let from = if !hubs.is_empty() && rng.gen_bool(HUB_SHARE) {
            pick(&mut rng, &hubs)
        } else {
            pick(&mut rng, &ids)
        };
        let mut to = pick(&mut rng, &ids);
        while to == from {
            to = pick(&mut rng, &ids);
        }
        let status = match rng.gen_range(0..100) {
            0..=94 => "completed",
            95..=98 => "pending",
            _ => "failed",
        };

        transfers.push(Transfer {
            transaction_id: format!("TXN_{:08}", i),
            from_customer_id: from.to_string(),
            to_customer_id: to.to_string(),
            amount: round2(rng.gen_range(10.0..=10_000.0)),
            transaction_date: random_datetime(&mut rng, spec.reference_date, 365),
            transaction_type: pick(&mut rng, &TRANSACTION_TYPES).to_string(),
            status: status.to_string(),
        });
    }

    tracing::info!(
        card_transactions = spec.card_transactions,
        "generating card transactions"
    );
    let card_transactions = (0..spec.card_transactions)
        .map(|i| CardTransaction {
            card_transaction_id: format!("CARD_{:08}", i),
            customer_id: pick(&mut rng, &ids).to_string(),
            merchant: pick(&mut rng, &MERCHANTS).to_string(),
            amount: round2(rng.gen_range(5.0..=500.0)),
            transaction_date: random_datetime(&mut rng, spec.reference_date, 365),
            card_type: pick(&mut rng, &CARD_TYPES).to_string(),
            merchant_category: pick(&mut rng, &MERCHANT_CATEGORIES).to_string(),
        })
        .collect();

    Ok(Dataset {
        customers,
        transfers,
        card_transactions,
    })
}

// -------------------------------------------------------------------------
// CSV persistence
// -------------------------------------------------------------------------

const CUSTOMER_HEADER: &str =
    "customer_id,name,email,account_balance,risk_score,account_type,registration_date";
const TRANSFER_HEADER: &str =
    "transaction_id,from_customer_id,to_customer_id,amount,transaction_date,transaction_type,status";
const CARD_HEADER: &str =
    "card_transaction_id,customer_id,merchant,amount,transaction_date,card_type,merchant_category";

fn csv_line(cells: &[String]) -> String {
    let escaped: Vec<String> = cells.iter().map(|c| escape_csv(c)).collect();
    let mut line = escaped.join(",");
    line.push('\n');
    line
}

/// Write the three CSV files into `dir`.
pub fn write_csv(dataset: &Dataset, dir: impl AsRef<Path>) -> Result<(), DatasetError> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;

    let mut out = format!("{}\n", CUSTOMER_HEADER);
    for c in &dataset.customers {
        out.push_str(&csv_line(&[
            c.customer_id.clone(),
            c.name.clone(),
            c.email.clone(),
            format!("{:.2}", c.account_balance),
            format!("{:.2}", c.risk_score),
            c.account_type.clone(),
            c.registration_date.format(DATE_FORMAT).to_string(),
        ]));
    }
    fs::write(dir.join(CUSTOMERS_FILE), out)?;

    let mut out = format!("{}\n", TRANSFER_HEADER);
    for t in &dataset.transfers {
        out.push_str(&csv_line(&[
            t.transaction_id.clone(),
            t.from_customer_id.clone(),
            t.to_customer_id.clone(),
            format!("{:.2}", t.amount),
            t.transaction_date.format(DATETIME_FORMAT).to_string(),
            t.transaction_type.clone(),
            t.status.clone(),
        ]));
    }
    fs::write(dir.join(TRANSACTIONS_FILE), out)?;

    let mut out = format!("{}\n", CARD_HEADER);
    for ct in &dataset.card_transactions {
        out.push_str(&csv_line(&[
            ct.card_transaction_id.clone(),
            ct.customer_id.clone(),
            ct.merchant.clone(),
            format!("{:.2}", ct.amount),
            ct.transaction_date.format(DATETIME_FORMAT).to_string(),
            ct.card_type.clone(),
            ct.merchant_category.clone(),
        ]));
    }
    fs::write(dir.join(CARD_TRANSACTIONS_FILE), out)?;

    tracing::info!(
        dir = %dir.display(),
        customers = dataset.customers.len(),
        transfers = dataset.transfers.len(),
        card_transactions = dataset.card_transactions.len(),
        "dataset written"
    );
    Ok(())
}

/// Split one CSV line, honouring double-quoted fields.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                field.push('"');
                chars.next();
            }
            ('"', true) => quoted = false,
            ('"', false) if field.is_empty() => quoted = true,
            (',', false) => fields.push(std::mem::take(&mut field)),
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

/// Rows of a CSV file whose header must equal `header`.
struct CsvRows {
    file: String,
    rows: Vec<(usize, Vec<String>)>,
}

impl CsvRows {
    fn read(path: &Path, header: &str) -> Result<Self, DatasetError> {
        let file = path.display().to_string();
        let content = fs::read_to_string(path)?;
        let mut lines = content.lines().enumerate();

        match lines.next() {
            Some((_, first)) if first.trim_end() == header => {}
            _ => {
                return Err(DatasetError::Parse {
                    file,
                    line: 1,
                    message: format!("expected header `{}`", header),
                })
            }
        }

        let width = header.split(',').count();
        let mut rows = Vec::new();
        for (idx, line) in lines {
            if line.trim().is_empty() {
                continue;
            }
            let fields = split_csv_line(line);
            if fields.len() != width {
                return Err(DatasetError::Parse {
                    file,
                    line: idx + 1,
                    message: format!("expected {} fields, found {}", width, fields.len()),
                });
            }
            rows.push((idx + 1, fields));
        }

        Ok(Self { file, rows })
    }

    fn error(&self, line: usize, message: impl Into<String>) -> DatasetError {
        DatasetError::Parse {
            file: self.file.clone(),
            line,
            message: message.into(),
        }
    }

    fn float(&self, line: usize, value: &str) -> Result<f64, DatasetError> {
        value
            .parse()
            .map_err(|_| self.error(line, format!("invalid number `{}`", value)))
    }

    fn datetime(&self, line: usize, value: &str) -> Result<NaiveDateTime, DatasetError> {
        NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
            .map_err(|_| self.error(line, format!("invalid timestamp `{}`", value)))
    }

    fn date(&self, line: usize, value: &str) -> Result<NaiveDate, DatasetError> {
        NaiveDate::parse_from_str(value, DATE_FORMAT)
            .map_err(|_| self.error(line, format!("invalid date `{}`", value)))
    }
}

/// Load a dataset written by [`write_csv`].
pub fn read_csv(dir: impl AsRef<Path>) -> Result<Dataset, DatasetError> {
    let dir = dir.as_ref();

    let csv = CsvRows::read(&dir.join(CUSTOMERS_FILE), CUSTOMER_HEADER)?;
    let mut customers = Vec::with_capacity(csv.rows.len());
    for (line, f) in &csv.rows {
        customers.push(Customer {
            customer_id: f[0].clone(),
            name: f[1].clone(),
            email: f[2].clone(),
            account_balance: csv.float(*line, &f[3])?,
            risk_score: csv.float(*line, &f[4])?,
            account_type: f[5].clone(),
            registration_date: csv.date(*line, &f[6])?,
        });
    }

    let csv = CsvRows::read(&dir.join(TRANSACTIONS_FILE), TRANSFER_HEADER)?;
    let mut transfers = Vec::with_capacity(csv.rows.len());
    for (line, f) in &csv.rows {
        transfers.push(Transfer {
            transaction_id: f[0].clone(),
            from_customer_id: f[1].clone(),
            to_customer_id: f[2].clone(),
            amount: csv.float(*line, &f[3])?,
            transaction_date: csv.datetime(*line, &f[4])?,
            transaction_type: f[5].clone(),
            status: f[6].clone(),
        });
    }

    let csv = CsvRows::read(&dir.join(CARD_TRANSACTIONS_FILE), CARD_HEADER)?;
    let mut card_transactions = Vec::with_capacity(csv.rows.len());
    for (line, f) in &csv.rows {
        card_transactions.push(CardTransaction {
            card_transaction_id: f[0].clone(),
            customer_id: f[1].clone(),
            merchant: f[2].clone(),
            amount: csv.float(*line, &f[3])?,
            transaction_date: csv.datetime(*line, &f[4])?,
            card_type: f[5].clone(),
            merchant_category: f[6].clone(),
        });
    }

    Ok(Dataset {
        customers,
        transfers,
        card_transactions,
    })
}

/// Read the customer identifiers from a customers CSV file.
pub fn read_customer_ids(path: impl AsRef<Path>) -> Result<Vec<String>, DatasetError> {
    let path = path.as_ref();
    let csv = CsvRows::read(path, CUSTOMER_HEADER)?;
    if csv.rows.is_empty() {
        return Err(DatasetError::Empty(csv.file));
    }
    Ok(csv.rows.into_iter().map(|(_, mut f)| f.swap_remove(0)).collect())
}

/// Pick `count` distinct identifiers (or all of them, if fewer) with a
/// seeded RNG, so repeated runs query the same targets.
pub fn select_targets(ids: &[String], count: usize, seed: u64) -> Vec<QueryTarget> {
    let mut rng = StdRng::seed_from_u64(seed);
    ids.choose_multiple(&mut rng, count.min(ids.len()))
        .map(|id| QueryTarget::new(id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};

    use super::*;

    fn small_spec() -> DatasetSpec {
        DatasetSpec::new(200, 2_000, 300)
            .with_seed(7)
            .with_reference_date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
    }

    #[test]
    fn test_generation_is_deterministic() {
        let a = generate(&small_spec()).unwrap();
        let b = generate(&small_spec()).unwrap();
        assert_eq!(a.customers, b.customers);
        assert_eq!(a.transfers, b.transfers);
        assert_eq!(a.card_transactions, b.card_transactions);
    }

    #[test]
    fn test_generated_shape() {
        let spec = small_spec();
        let data = generate(&spec).unwrap();
        assert_eq!(data.customers.len(), 200);
        assert_eq!(data.transfers.len(), 2_000);
        assert_eq!(data.card_transactions.len(), 300);
        assert_eq!(data.customers[3].customer_id, "CUST_000003");
        assert_eq!(data.transfers[12].transaction_id, "TXN_00000012");

        let ids: HashSet<&str> = data.customers.iter().map(|c| c.customer_id.as_str()).collect();
        for t in &data.transfers {
            assert_ne!(t.from_customer_id, t.to_customer_id);
            assert!(ids.contains(t.from_customer_id.as_str()));
            assert!(ids.contains(t.to_customer_id.as_str()));
            assert!((10.0..=10_000.0).contains(&t.amount));
            assert!(t.transaction_date.date() <= spec.reference_date);
        }
        for c in &data.customers {
            assert!((1000.0..=100_000.0).contains(&c.account_balance));
            assert!((0.0..=100.0).contains(&c.risk_score));
            assert!(c.registration_date < spec.reference_date);
        }
    }

    #[test]
    fn test_hubs_skew_out_degree() {
        let data = generate(&small_spec()).unwrap();
        let mut out_degree: HashMap<&str, usize> = HashMap::new();
        for t in &data.transfers {
            *out_degree.entry(t.from_customer_id.as_str()).or_default() += 1;
        }
        let mut degrees: Vec<usize> = out_degree.values().copied().collect();
        degrees.sort_unstable_by(|a, b| b.cmp(a));

        // 20 hubs share ~30% of 2000 transfers (~30 each) against ~7 for the rest.
        let top: usize = degrees.iter().take(20).sum();
        assert!(top > 400, "top 20 senders only sent {} transfers", top);
    }

    #[test]
    fn test_status_mix() {
        let data = generate(&small_spec()).unwrap();
        let completed = data.transfers.iter().filter(|t| t.is_completed()).count();
        assert!(completed > 1_800 && completed < 1_980, "completed = {}", completed);
    }

    #[test]
    fn test_invalid_spec() {
        let spec = DatasetSpec::new(1, 10, 0);
        assert!(matches!(generate(&spec), Err(DatasetError::InvalidSpec(_))));
    }

    #[test]
    fn test_csv_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let data = generate(&small_spec()).unwrap();
        write_csv(&data, dir.path()).unwrap();

        let loaded = read_csv(dir.path()).unwrap();
        assert_eq!(loaded.customers, data.customers);
        assert_eq!(loaded.transfers, data.transfers);
        assert_eq!(loaded.card_transactions, data.card_transactions);

        let ids = read_customer_ids(dir.path().join(CUSTOMERS_FILE)).unwrap();
        assert_eq!(ids, data.customer_ids());
    }

    #[test]
    fn test_bad_header_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CUSTOMERS_FILE);
        fs::write(&path, "id,name\nCUST_000001,x\n").unwrap();
        assert!(matches!(
            read_customer_ids(&path),
            Err(DatasetError::Parse { line: 1, .. })
        ));
    }

    #[test]
    fn test_split_quoted_fields() {
        assert_eq!(split_csv_line("a,\"b,c\",d"), vec!["a", "b,c", "d"]);
        assert_eq!(split_csv_line("\"say \"\"hi\"\"\",x"), vec!["say \"hi\"", "x"]);
        assert_eq!(split_csv_line("a,,b"), vec!["a", "", "b"]);
    }

    #[test]
    fn test_select_targets() {
        let ids: Vec<String> = (0..50).map(|i| format!("CUST_{:06}", i)).collect();

        let a = select_targets(&ids, 10, 42);
        let b = select_targets(&ids, 10, 42);
        assert_eq!(a, b);
        assert_eq!(a.len(), 10);
        let unique: HashSet<&QueryTarget> = a.iter().collect();
        assert_eq!(unique.len(), 10);

        assert_eq!(select_targets(&ids, 500, 42).len(), 50);
        assert_eq!(select_targets(&ids[..1], 100, 1), vec![QueryTarget::from("CUST_000000")]);
    }
}
