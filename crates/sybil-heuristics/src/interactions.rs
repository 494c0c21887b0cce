//! Cross-address interaction accounting.

use std::collections::{BTreeSet, HashMap};

use tracing::info;

use crate::store::{normalize_address, TransactionStore};

static NO_COUNTERPARTIES: BTreeSet<String> = BTreeSet::new();

/// Per-address interaction statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InteractionStats {
    pub counterparties: BTreeSet<String>,
    /// Distinct counterparties that are themselves cohort members.
    pub cohort_interactions: usize,
    pub outgoing_count: usize,
    pub transaction_count: usize,
}

impl InteractionStats {
    pub fn unique_counterparty_ratio(&self) -> f64 {
        ratio(self.counterparties.len(), self.transaction_count)
    }

    pub fn outgoing_ratio(&self) -> f64 {
        ratio(self.outgoing_count, self.transaction_count)
    }
}

fn ratio(numerator: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

/// Counterparty sets for every cohort address, built in one grouped pass.
#[derive(Debug, Clone, Default)]
pub struct InteractionIndex {
    stats: HashMap<String, InteractionStats>,
}

impl InteractionIndex {
    pub fn build(store: &TransactionStore) -> Self {
        let cohort: BTreeSet<&str> = store.all_addresses().iter().map(String::as_str).collect();
        let mut stats = HashMap::with_capacity(cohort.len());

        for address in store.all_addresses() {
            let transactions = store.transactions_for(address);
            let mut entry = InteractionStats {
                transaction_count: transactions.len(),
                ..Default::default()
            };
            for tx in transactions {
                for party in [tx.from_address.as_deref(), tx.to_address.as_deref()]
                    .into_iter()
                    .flatten()
                {
                    if party != address.as_str() {
                        entry.counterparties.insert(party.to_string());
                    }
                }
                if tx.from_address.as_deref() == Some(address.as_str()) {
                    entry.outgoing_count += 1;
                }
            }
            entry.cohort_interactions = entry
                .counterparties
                .iter()
                .filter(|c| cohort.contains(c.as_str()))
                .count();
            stats.insert(address.clone(), entry);
        }

        let interacting = stats.values().filter(|s| s.cohort_interactions > 0).count();
        info!(
            "Built interaction index for {} addresses, {} interacted with other cohort members",
            stats.len(),
            interacting
        );
        Self { stats }
    }

    pub fn stats(&self, address: &str) -> Option<&InteractionStats> {
        self.stats
            .get(address)
            .or_else(|| self.stats.get(&normalize_address(address)))
    }

    /// Addresses `address` ever transacted with, itself excluded.
    pub fn counterparties(&self, address: &str) -> &BTreeSet<String> {
        self.stats(address)
            .map(|s| &s.counterparties)
            .unwrap_or(&NO_COUNTERPARTIES)
    }

    /// How many distinct members of `candidates` `address` has transacted
    /// with. Candidates are compared in normalized form.
    pub fn interaction_count(&self, address: &str, candidates: &BTreeSet<String>) -> usize {
        let counterparties = self.counterparties(address);
        candidates
            .iter()
            .map(|candidate| normalize_address(candidate))
            .collect::<BTreeSet<_>>()
            .intersection(counterparties)
            .count()
    }

    /// Interactions with the rest of the cohort.
    pub fn cohort_interaction_count(&self, address: &str) -> usize {
        self.stats(address).map(|s| s.cohort_interactions).unwrap_or(0)
    }

    pub fn has_interacted_with_other_cohort_member(&self, address: &str) -> bool {
        self.cohort_interaction_count(address) > 0
    }
}
