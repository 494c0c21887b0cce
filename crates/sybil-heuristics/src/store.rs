//! Transaction store for a cohort of addresses.
//!
//! The store is the only place where transactions are grouped and ordered.
//! Every group is sorted ascending by `(timestamp, hash)` once at
//! construction, so positional queries ("first", "last") elsewhere never
//! re-sort.

use std::collections::{BTreeSet, HashMap};

use sybil_scorer_models::{Transaction, TransactionTable, REQUIRED_COLUMNS};
use tracing::{debug, info};

use crate::error::{AnalysisError, AnalysisResult};
use crate::series::SeriesKind;

/// Canonical form of an address used for grouping and lookups.
pub fn normalize_address(address: &str) -> String {
    address.trim().to_lowercase()
}

/// Validated, address-grouped view over a transaction table.
#[derive(Debug, Clone)]
pub struct TransactionStore {
    cohort: Vec<String>,
    grouped: HashMap<String, Vec<Transaction>>,
    row_count: usize,
}

impl TransactionStore {
    /// Build a store from a transaction table and the cohort to analyse.
    ///
    /// # Arguments
    /// * `table` - Transactions plus the column set they were loaded with
    /// * `cohort` - Addresses under analysis; order and duplicates are ignored
    ///
    /// # Returns
    /// A store restricted to cohort addresses that actually have transactions,
    /// or `AnalysisError::Schema` when a required column is absent.
    pub fn new<I, S>(table: TransactionTable, cohort: I) -> AnalysisResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for column in REQUIRED_COLUMNS {
            if !table.has_column(column) {
                return Err(AnalysisError::Schema {
                    column: column.to_string(),
                });
            }
        }

        let requested: BTreeSet<String> = cohort
            .into_iter()
            .map(|a| normalize_address(a.as_ref()))
            .filter(|a| !a.is_empty())
            .collect();

        // Without an address-of-record column every row belongs to both of
        // its endpoints.
        let stack_endpoints = !table.has_column("eoa");
        if stack_endpoints {
            debug!("No eoa column, attributing rows to both endpoints");
        }

        let mut grouped: HashMap<String, Vec<Transaction>> = HashMap::new();
        let mut row_count = 0;
        for tx in table.into_transactions() {
            let tx = normalized(tx);
            let owners = owners_of(&tx, stack_endpoints);
            let mut kept = false;
            for owner in owners {
                if requested.contains(&owner) {
                    grouped.entry(owner).or_default().push(tx.clone());
                    kept = true;
                }
            }
            if kept {
                row_count += 1;
            }
        }

        for transactions in grouped.values_mut() {
            transactions.sort_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.hash.cmp(&b.hash))
            });
        }

        let cohort: Vec<String> = requested
            .iter()
            .filter(|a| grouped.contains_key(*a))
            .cloned()
            .collect();

        info!(
            "Built transaction store: {} of {} cohort addresses observed, {} transactions",
            cohort.len(),
            requested.len(),
            row_count
        );

        Ok(Self {
            cohort,
            grouped,
            row_count,
        })
    }

    /// Transactions touching `address`, ascending by `(timestamp, hash)`.
    ///
    /// Unknown addresses yield an empty slice.
    pub fn transactions_for(&self, address: &str) -> &[Transaction] {
        self.grouped
            .get(address)
            .or_else(|| self.grouped.get(&normalize_address(address)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// The resolved cohort, sorted.
    pub fn all_addresses(&self) -> &[String] {
        &self.cohort
    }

    pub fn contains(&self, address: &str) -> bool {
        !self.transactions_for(address).is_empty()
    }

    pub fn transaction_count(&self, address: &str) -> usize {
        self.transactions_for(address).len()
    }

    /// True when `address` has strictly fewer than `n` transactions.
    pub fn has_less_than_n_transactions(&self, address: &str, n: usize) -> bool {
        self.transaction_count(address) < n
    }

    /// First transaction in which `address` received funds from someone else.
    pub fn first_incoming(&self, address: &str) -> Option<&Transaction> {
        let address = normalize_address(address);
        self.transactions_for(&address)
            .iter()
            .find(|tx| tx.is_incoming_for(&address))
    }

    /// First transaction `address` sent to someone else.
    pub fn first_outgoing(&self, address: &str) -> Option<&Transaction> {
        let address = normalize_address(address);
        self.transactions_for(&address)
            .iter()
            .find(|tx| tx.is_outgoing_for(&address))
    }

    /// Ascending time series of one numeric field; rows missing it are skipped.
    pub fn series(&self, address: &str, kind: SeriesKind) -> Vec<f64> {
        self.transactions_for(address)
            .iter()
            .filter_map(|tx| kind.extract(tx))
            .collect()
    }

    /// Number of cohort addresses.
    pub fn len(&self) -> usize {
        self.cohort.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cohort.is_empty()
    }

    /// Distinct input rows attributed to at least one cohort address.
    pub fn row_count(&self) -> usize {
        self.row_count
    }
}

fn normalized(mut tx: Transaction) -> Transaction {
    tx.from_address = tx.from_address.as_deref().map(normalize_address);
    tx.to_address = tx.to_address.as_deref().map(normalize_address);
    tx.eoa = tx.eoa.as_deref().map(normalize_address);
    tx
}

fn owners_of(tx: &Transaction, stack_endpoints: bool) -> Vec<String> {
    if !stack_endpoints {
        if let Some(eoa) = &tx.eoa {
            return vec![eoa.clone()];
        }
    }
    let mut owners = Vec::with_capacity(2);
    if let Some(from) = &tx.from_address {
        owners.push(from.clone());
    }
    if let Some(to) = &tx.to_address {
        if tx.from_address.as_ref() != Some(to) {
            owners.push(to.clone());
        }
    }
    owners
}
