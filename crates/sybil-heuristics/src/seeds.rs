//! Seed wallet inference.
//!
//! The seed of an address is the counterparty inferred to have funded it.
//! Two rules are resolved side by side:
//!
//! - naive: counterparty of the very first transaction, whatever its direction
//! - refined: sender of the first transaction the address received
//!
//! They disagree when an address acted (e.g. called a contract) before it was
//! funded, and that disagreement is itself a signal.

use std::collections::{BTreeSet, HashMap};

use sybil_scorer_models::TransactionDetail;
use tracing::info;

use crate::store::{normalize_address, TransactionStore};

/// Inferred funding counterparty of one address.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedRecord {
    pub address: String,
    pub seed: String,
    pub funding: TransactionDetail,
}

/// How far seed resolution got for an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionState {
    /// No usable transaction at all.
    Unresolved,
    /// A first transaction exists but the address never received funds.
    NaiveResolved,
    /// An incoming funding transaction was found.
    RefinedResolved,
}

/// Seed records for every cohort address, plus seed → members indexes.
#[derive(Debug, Clone, Default)]
pub struct SeedResolver {
    naive: HashMap<String, SeedRecord>,
    refined: HashMap<String, SeedRecord>,
    naive_members: HashMap<String, BTreeSet<String>>,
    refined_members: HashMap<String, BTreeSet<String>>,
}

impl SeedResolver {
    /// Resolve naive and refined seeds for the whole cohort in one pass.
    pub fn build(store: &TransactionStore) -> Self {
        let mut resolver = Self::default();

        for address in store.all_addresses() {
            let transactions = store.transactions_for(address);

            if let Some(first) = transactions.first() {
                if let Some(seed) = first.counterparty(address).filter(|s| *s != address.as_str()) {
                    resolver.insert_naive(SeedRecord {
                        address: address.clone(),
                        seed: seed.to_string(),
                        funding: TransactionDetail::from_transaction(first, address),
                    });
                }
            }

            if let Some(funding) = transactions.iter().find(|tx| tx.is_incoming_for(address)) {
                if let Some(sender) = funding.from_address.as_deref() {
                    resolver.insert_refined(SeedRecord {
                        address: address.clone(),
                        seed: sender.to_string(),
                        funding: TransactionDetail::from_transaction(funding, address),
                    });
                }
            }
        }

        info!(
            "Resolved seeds: {} naive, {} refined, {} distinct refined seeds",
            resolver.naive.len(),
            resolver.refined.len(),
            resolver.refined_members.len()
        );
        resolver
    }

    fn insert_naive(&mut self, record: SeedRecord) {
        self.naive_members
            .entry(record.seed.clone())
            .or_default()
            .insert(record.address.clone());
        self.naive.insert(record.address.clone(), record);
    }

    fn insert_refined(&mut self, record: SeedRecord) {
        self.refined_members
            .entry(record.seed.clone())
            .or_default()
            .insert(record.address.clone());
        self.refined.insert(record.address.clone(), record);
    }

    /// Counterparty of the first transaction touching `address`.
    pub fn resolve_naive(&self, address: &str) -> Option<&SeedRecord> {
        self.naive.get(&normalize_address(address))
    }

    /// Sender of the first transaction `address` received; `None` if it
    /// never received funds.
    pub fn resolve_refined(&self, address: &str) -> Option<&SeedRecord> {
        self.refined.get(&normalize_address(address))
    }

    pub fn state(&self, address: &str) -> ResolutionState {
        if self.resolve_refined(address).is_some() {
            ResolutionState::RefinedResolved
        } else if self.resolve_naive(address).is_some() {
            ResolutionState::NaiveResolved
        } else {
            ResolutionState::Unresolved
        }
    }

    /// Other cohort addresses sharing the refined seed of `address`.
    pub fn same_seed_count(&self, address: &str) -> usize {
        shared_count(self.resolve_refined(address), &self.refined_members)
    }

    /// Other cohort addresses sharing the naive seed of `address`.
    pub fn same_seed_naive_count(&self, address: &str) -> usize {
        shared_count(self.resolve_naive(address), &self.naive_members)
    }

    pub fn same_seed(&self, address: &str) -> bool {
        self.same_seed_count(address) > 0
    }

    pub fn same_seed_naive(&self, address: &str) -> bool {
        self.same_seed_naive_count(address) > 0
    }

    /// The naive and refined rules disagree on whether `address` shares a seed.
    pub fn is_suspicious(&self, address: &str) -> bool {
        self.same_seed(address) != self.same_seed_naive(address)
    }

    /// Cohort addresses funded by the same refined seed, `address` excluded.
    pub fn siblings(&self, address: &str) -> Vec<&str> {
        match self.resolve_refined(address) {
            Some(record) => self
                .refined_members
                .get(&record.seed)
                .into_iter()
                .flatten()
                .filter(|member| **member != record.address)
                .map(String::as_str)
                .collect(),
            None => Vec::new(),
        }
    }
}

fn shared_count(
    record: Option<&SeedRecord>,
    members: &HashMap<String, BTreeSet<String>>,
) -> usize {
    record
        .and_then(|r| members.get(&r.seed))
        .map(|m| m.len().saturating_sub(1))
        .unwrap_or(0)
}
