//! Transaction records and feature rows.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Columns a transaction table must carry before it can be analysed.
pub const REQUIRED_COLUMNS: [&str; 8] = [
    "timestamp",
    "value",
    "gas_limit",
    "gas_used",
    "tx_fee",
    "block_number",
    "from_address",
    "to_address",
];

/// A single on-chain transaction.
///
/// Every field other than `hash` and `timestamp` may be missing in the source
/// data; the engine decides per operation whether a gap is tolerable.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Transaction {
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    pub from_address: Option<String>,
    pub to_address: Option<String>,
    pub value: Option<Decimal>, // wei
    pub gas_used: Option<u64>,
    pub gas_limit: Option<u64>,
    pub tx_fee: Option<Decimal>,
    pub block_number: Option<u64>,
    /// Address of record, when the source table already attributes each row.
    pub eoa: Option<String>,
}

impl Transaction {
    /// Create a transaction with only its identity and endpoints populated.
    pub fn new(
        hash: impl Into<String>,
        timestamp: DateTime<Utc>,
        from_address: Option<&str>,
        to_address: Option<&str>,
    ) -> Self {
        Self {
            hash: hash.into(),
            timestamp,
            from_address: from_address.map(str::to_string),
            to_address: to_address.map(str::to_string),
            value: None,
            gas_used: None,
            gas_limit: None,
            tx_fee: None,
            block_number: None,
            eoa: None,
        }
    }

    pub fn with_value(mut self, value: Decimal) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_gas(mut self, gas_used: u64, gas_limit: u64) -> Self {
        self.gas_used = Some(gas_used);
        self.gas_limit = Some(gas_limit);
        self
    }

    pub fn with_fee(mut self, tx_fee: Decimal) -> Self {
        self.tx_fee = Some(tx_fee);
        self
    }

    pub fn with_eoa(mut self, eoa: &str) -> Self {
        self.eoa = Some(eoa.to_string());
        self
    }

    /// The other side of this transaction as seen from `address`.
    ///
    /// Returns `None` when `address` is not a party to the transaction or the
    /// other side is missing (e.g. contract creation).
    pub fn counterparty(&self, address: &str) -> Option<&str> {
        let from = self.from_address.as_deref();
        let to = self.to_address.as_deref();
        if from == Some(address) {
            to
        } else if to == Some(address) {
            from
        } else {
            None
        }
    }

    /// True when `address` received this transaction from someone else.
    pub fn is_incoming_for(&self, address: &str) -> bool {
        self.to_address.as_deref() == Some(address) && self.from_address.as_deref() != Some(address)
    }

    /// True when `address` sent this transaction to someone else.
    pub fn is_outgoing_for(&self, address: &str) -> bool {
        self.from_address.as_deref() == Some(address) && self.to_address.as_deref() != Some(address)
    }
}

/// A transaction table together with the column set it was loaded with.
///
/// The column set matters because schema validation is done against what
/// the source provided, not against which `Option`s happen to be filled.
#[derive(Debug, Clone, Default)]
pub struct TransactionTable {
    columns: BTreeSet<String>,
    transactions: Vec<Transaction>,
}

impl TransactionTable {
    /// Build a table that carries every required column plus `hash`.
    pub fn new(transactions: Vec<Transaction>) -> Self {
        let columns = REQUIRED_COLUMNS
            .iter()
            .chain(std::iter::once(&"hash"))
            .map(|c| c.to_string())
            .collect();
        Self {
            columns,
            transactions,
        }
    }

    /// Build a table with an explicit column set (as read from a file header).
    pub fn with_columns<I, S>(columns: I, transactions: Vec<Transaction>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            transactions,
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.contains(name)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn into_transactions(self) -> Vec<Transaction> {
        self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }
}

/// Detail columns describing one particular transaction of an address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TransactionDetail {
    pub hash: String,
    pub counterparty: Option<String>,
    pub gas_used: Option<u64>,
    pub gas_limit: Option<u64>,
    pub value: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl TransactionDetail {
    pub fn from_transaction(tx: &Transaction, address: &str) -> Self {
        Self {
            hash: tx.hash.clone(),
            counterparty: tx.counterparty(address).map(str::to_string),
            gas_used: tx.gas_used,
            gas_limit: tx.gas_limit,
            value: tx.value,
            timestamp: tx.timestamp,
        }
    }
}

/// One row of the feature table.
///
/// Similarity columns are `None` for addresses that were not part of the
/// similarity pass (only low-activity addresses are compared).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureRow {
    pub address: String,
    pub transaction_count: usize,
    pub has_few_transactions: bool,
    pub same_seed_count: usize,
    pub has_same_seed: bool,
    pub same_seed_naive_count: usize,
    pub has_same_seed_naive: bool,
    pub has_suspicious_seed: bool,
    pub cohort_interaction_count: usize,
    pub has_interacted_with_cohort: bool,
    pub unique_counterparty_count: usize,
    pub unique_counterparty_ratio: f64,
    pub outgoing_count: usize,
    pub outgoing_ratio: f64,
    pub similarity_cluster_size: Option<usize>,
    pub similarity_mean_score: Option<f64>,
    pub similarity_max_score: Option<f64>,
    pub has_similarity: Option<bool>,
    pub first_incoming: Option<TransactionDetail>,
    pub first_outgoing: Option<TransactionDetail>,
    /// Externally computed time-series features, keyed by column name.
    pub series: BTreeMap<String, Option<f64>>,
}

impl FeatureRow {
    /// Reason codes raised by this row.
    pub fn signals(&self) -> Vec<SybilSignal> {
        let mut signals = Vec::new();
        if self.has_same_seed {
            signals.push(SybilSignal::SameSeed);
        }
        if self.has_same_seed_naive {
            signals.push(SybilSignal::SameSeedNaive);
        }
        if self.has_suspicious_seed {
            signals.push(SybilSignal::SuspiciousSeed);
        }
        if self.has_interacted_with_cohort {
            signals.push(SybilSignal::CohortInteraction);
        }
        if self.has_similarity == Some(true) {
            signals.push(SybilSignal::SimilarBehavior);
        }
        signals
    }

    pub fn is_flagged(&self) -> bool {
        !self.signals().is_empty()
    }
}

/// Sybil reason codes for address classification.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SybilSignal {
    SameSeed,
    SameSeedNaive,
    SuspiciousSeed,
    CohortInteraction,
    SimilarBehavior,
}

impl SybilSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            SybilSignal::SameSeed => "same_seed",
            SybilSignal::SameSeedNaive => "same_seed_naive",
            SybilSignal::SuspiciousSeed => "suspicious_seed",
            SybilSignal::CohortInteraction => "cohort_interaction",
            SybilSignal::SimilarBehavior => "similar_behavior",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tx(from: Option<&str>, to: Option<&str>) -> Transaction {
        Transaction::new("0xhash", Utc.timestamp_opt(1_600_000_000, 0).unwrap(), from, to)
    }

    #[test]
    fn test_counterparty_in_both_directions() {
        let t = tx(Some("0xaaa"), Some("0xbbb"));
        assert_eq!(t.counterparty("0xaaa"), Some("0xbbb"));
        assert_eq!(t.counterparty("0xbbb"), Some("0xaaa"));
        assert_eq!(t.counterparty("0xccc"), None);
    }

    #[test]
    fn test_self_transfer_is_neither_incoming_nor_outgoing() {
        let t = tx(Some("0xaaa"), Some("0xaaa"));
        assert!(!t.is_incoming_for("0xaaa"));
        assert!(!t.is_outgoing_for("0xaaa"));
    }

    #[test]
    fn test_contract_creation_has_no_counterparty() {
        let t = tx(Some("0xaaa"), None);
        assert_eq!(t.counterparty("0xaaa"), None);
        assert!(t.is_outgoing_for("0xaaa"));
    }

    #[test]
    fn test_default_table_has_required_columns() {
        let table = TransactionTable::new(vec![]);
        for column in REQUIRED_COLUMNS {
            assert!(table.has_column(column));
        }
        assert!(!table.has_column("eoa"));
    }

    #[test]
    fn test_signals_from_row() {
        let row = FeatureRow {
            address: "0xaaa".into(),
            transaction_count: 3,
            has_few_transactions: true,
            same_seed_count: 0,
            has_same_seed: false,
            same_seed_naive_count: 1,
            has_same_seed_naive: true,
            has_suspicious_seed: true,
            cohort_interaction_count: 0,
            has_interacted_with_cohort: false,
            unique_counterparty_count: 2,
            unique_counterparty_ratio: 2.0 / 3.0,
            outgoing_count: 1,
            outgoing_ratio: 1.0 / 3.0,
            similarity_cluster_size: Some(0),
            similarity_mean_score: Some(0.0),
            similarity_max_score: Some(0.0),
            has_similarity: Some(false),
            first_incoming: None,
            first_outgoing: None,
            series: BTreeMap::new(),
        };
        assert_eq!(
            row.signals(),
            vec![SybilSignal::SameSeedNaive, SybilSignal::SuspiciousSeed]
        );
        assert!(row.is_flagged());
    }
}
