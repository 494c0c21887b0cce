//! CSV loading for transaction tables and cohorts.

use std::path::Path;
use std::str::FromStr;

use anyhow::Context;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use sybil_scorer_models::{Transaction, TransactionTable};
use tracing::{debug, info, warn};

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Transactions read from a CSV file.
#[derive(Debug)]
pub struct LoadedTransactions {
    pub table: TransactionTable,
    /// Rows skipped because their timestamp could not be parsed.
    pub skipped: usize,
}

/// Canonical column name for a CSV header.
fn canonical_column(header: &str) -> String {
    let name = header.trim().to_lowercase();
    match name.as_str() {
        "block_timestamp" => "timestamp".to_string(),
        "from" => "from_address".to_string(),
        "to" => "to_address".to_string(),
        _ => name,
    }
}

/// Parse unix seconds, RFC 3339, or `YYYY-MM-DD HH:MM:SS[.fff]` (taken as UTC).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(secs) = raw.parse::<i64>() {
        return Utc.timestamp_opt(secs, 0).single();
    }
    if let Ok(secs) = raw.parse::<f64>() {
        let whole = secs.trunc();
        let nanos = ((secs - whole) * 1e9).round() as u32;
        return Utc.timestamp_opt(whole as i64, nanos).single();
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// One CSV row as written; conversion to a [`Transaction`] is lenient.
#[derive(Debug, Deserialize)]
struct TransactionRecord {
    hash: Option<String>,
    #[serde(alias = "block_timestamp")]
    timestamp: Option<String>,
    value: Option<String>,
    gas_used: Option<String>,
    gas_limit: Option<String>,
    tx_fee: Option<String>,
    block_number: Option<String>,
    #[serde(alias = "from")]
    from_address: Option<String>,
    #[serde(alias = "to")]
    to_address: Option<String>,
    eoa: Option<String>,
}

/// Trimmed, non-empty, non-`nan` field value.
fn present(field: &Option<String>) -> Option<&str> {
    field
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("nan"))
}

fn parse_decimal(column: &str, field: &Option<String>) -> Option<Decimal> {
    let raw = present(field)?;
    let value = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok();
    if value.is_none() {
        debug!("Unparseable {} value {:?}", column, raw);
    }
    value
}

fn parse_integer(column: &str, field: &Option<String>) -> Option<u64> {
    let raw = present(field)?;
    let value = raw.parse::<u64>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && *v >= 0.0 && v.fract() == 0.0)
            .map(|v| v as u64)
    });
    if value.is_none() {
        debug!("Unparseable {} value {:?}", column, raw);
    }
    value
}

impl TransactionRecord {
    /// `None` when the timestamp is missing or unparseable.
    fn into_transaction(self, row: usize) -> Option<Transaction> {
        let timestamp = present(&self.timestamp).and_then(parse_timestamp)?;
        let hash = present(&self.hash)
            .map(str::to_string)
            .unwrap_or_else(|| format!("row-{row:010}"));

        let mut tx = Transaction::new(
            hash,
            timestamp,
            present(&self.from_address),
            present(&self.to_address),
        );
        tx.value = parse_decimal("value", &self.value);
        tx.gas_used = parse_integer("gas_used", &self.gas_used);
        tx.gas_limit = parse_integer("gas_limit", &self.gas_limit);
        tx.tx_fee = parse_decimal("tx_fee", &self.tx_fee);
        tx.block_number = parse_integer("block_number", &self.block_number);
        tx.eoa = present(&self.eoa).map(str::to_string);
        Some(tx)
    }
}

/// Load a transaction table from CSV.
///
/// Missing columns are not an error here; the transaction store rejects
/// tables without the columns it needs. Rows without a `hash` column get a
/// positional identifier.
///
/// # Arguments
/// * `path` - Path to the transactions CSV
pub fn load_transactions<P: AsRef<Path>>(path: P) -> anyhow::Result<LoadedTransactions> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open transactions CSV {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let columns: Vec<String> = headers.iter().map(canonical_column).collect();
    reader.set_headers(headers.iter().map(|h| h.trim().to_lowercase()).collect());

    let mut transactions = Vec::new();
    let mut skipped = 0;
    for (row, result) in reader.deserialize().enumerate() {
        let record: TransactionRecord = result
            .with_context(|| format!("Malformed row {} in {}", row + 1, path.display()))?;
        match record.into_transaction(row) {
            Some(tx) => transactions.push(tx),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(
            "Skipped {} rows of {} with unparseable timestamps",
            skipped,
            path.display()
        );
    }
    info!(
        "Loaded {} transactions from {}",
        transactions.len(),
        path.display()
    );

    Ok(LoadedTransactions {
        table: TransactionTable::with_columns(columns, transactions),
        skipped,
    })
}

/// Load cohort addresses from the `address` column, or the first column when
/// there is none.
pub fn load_cohort<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<String>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open cohort CSV {}", path.display()))?;

    let column = reader
        .headers()?
        .iter()
        .position(|h| canonical_column(h) == "address")
        .unwrap_or(0);

    let mut cohort = Vec::new();
    for result in reader.records() {
        let record = result?;
        if let Some(address) = record.get(column).map(str::trim).filter(|a| !a.is_empty()) {
            cohort.push(address.to_string());
        }
    }

    info!("Loaded {} cohort addresses from {}", cohort.len(), path.display());
    Ok(cohort)
}
