//! Transaction sequence encoding.
//!
//! An address's transactions become a list of short symbols, one per
//! transaction, e.g. `x-0x7636ab` for "sent to 0x7636ab...". The analysed
//! address itself is masked with a placeholder so two addresses doing the
//! same thing against the same counterparties produce the same symbols.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sybil_scorer_models::Transaction;
use tracing::{debug, info};

use crate::config::EncodingConfig;
use crate::error::AnalysisError;
use crate::store::{normalize_address, TransactionStore};

/// Which fields of a transaction go into its symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncodingMode {
    /// `from-to`
    #[default]
    AddressOnly,
    /// `from-value-to`
    AddressAndValue,
}

impl EncodingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EncodingMode::AddressOnly => "address_only",
            EncodingMode::AddressAndValue => "address_and_value",
        }
    }
}

impl fmt::Display for EncodingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EncodingMode {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "address_only" => Ok(EncodingMode::AddressOnly),
            "address_and_value" => Ok(EncodingMode::AddressAndValue),
            other => Err(AnalysisError::InvalidMode(other.to_string())),
        }
    }
}

/// The encoded form of one address's transaction history.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedSequence {
    address: String,
    mode: EncodingMode,
    symbols: Vec<String>,
    separator: String,
    dropped: usize,
}

impl EncodedSequence {
    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn mode(&self) -> EncodingMode {
        self.mode
    }

    /// One symbol per encoded transaction, in timestamp order.
    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Number of transactions that made it into the sequence.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Fields of every symbol, flattened.
    pub fn tokens(&self) -> impl Iterator<Item = &str> + '_ {
        self.symbols
            .iter()
            .flat_map(move |s| s.split(self.separator.as_str()))
    }

    /// Address fields in the sequence: a sender and a receiver per transaction.
    pub fn address_token_count(&self) -> usize {
        self.symbols.len() * 2
    }

    /// Transactions skipped because a required field was missing.
    pub fn dropped(&self) -> usize {
        self.dropped
    }
}

/// Turns transaction lists into [`EncodedSequence`]s.
#[derive(Debug, Clone)]
pub struct SequenceEncoder {
    config: EncodingConfig,
}

impl SequenceEncoder {
    pub fn new(config: EncodingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EncodingConfig {
        &self.config
    }

    /// Encode the transactions the store holds for `address`.
    pub fn encode(
        &self,
        store: &TransactionStore,
        address: &str,
        mode: EncodingMode,
    ) -> EncodedSequence {
        self.encode_transactions(address, store.transactions_for(address), mode)
    }

    /// Encode an already sorted transaction list.
    ///
    /// Rows missing a field the mode needs are dropped and counted rather
    /// than failing the whole sequence.
    pub fn encode_transactions(
        &self,
        address: &str,
        transactions: &[Transaction],
        mode: EncodingMode,
    ) -> EncodedSequence {
        let address = normalize_address(address);
        let own_prefix = self.prefix(&address);
        let mut symbols = Vec::with_capacity(transactions.len());
        let mut dropped = 0;

        for tx in transactions {
            let (Some(from), Some(to)) = (tx.from_address.as_deref(), tx.to_address.as_deref())
            else {
                dropped += 1;
                continue;
            };

            let mut fields = Vec::with_capacity(3);
            fields.push(self.mask(from, &own_prefix));
            if mode == EncodingMode::AddressAndValue {
                match tx.value {
                    Some(value) => fields.push(self.prefix(&value.normalize().to_string())),
                    None => {
                        dropped += 1;
                        continue;
                    }
                }
            }
            fields.push(self.mask(to, &own_prefix));
            symbols.push(fields.join(self.config.separator.as_str()));
        }

        if dropped > 0 {
            debug!(
                "Dropped {} of {} transactions while encoding {} ({})",
                dropped,
                transactions.len(),
                address,
                mode
            );
        }

        EncodedSequence {
            address,
            mode,
            symbols,
            separator: self.config.separator.clone(),
            dropped,
        }
    }

    fn prefix(&self, field: &str) -> String {
        field.chars().take(self.config.prefix_len).collect()
    }

    fn mask(&self, field: &str, own_prefix: &str) -> String {
        let prefix = self.prefix(field);
        if prefix == own_prefix {
            self.config.placeholder.clone()
        } else {
            prefix
        }
    }
}

/// Encoded sequences for a whole cohort under one mode.
///
/// A corpus is tied to the store snapshot and mode it was built from; build
/// a new one when either changes.
#[derive(Debug, Clone)]
pub struct EncodedCorpus {
    mode: EncodingMode,
    sequences: HashMap<String, EncodedSequence>,
    dropped: usize,
}

impl EncodedCorpus {
    pub fn build(store: &TransactionStore, encoder: &SequenceEncoder, mode: EncodingMode) -> Self {
        let sequences: HashMap<String, EncodedSequence> = store
            .all_addresses()
            .iter()
            .map(|address| (address.clone(), encoder.encode(store, address, mode)))
            .collect();
        let dropped = sequences.values().map(EncodedSequence::dropped).sum();

        info!(
            "Encoded {} sequences ({}), {} transactions dropped for missing fields",
            sequences.len(),
            mode,
            dropped
        );
        Self {
            mode,
            sequences,
            dropped,
        }
    }

    pub fn mode(&self) -> EncodingMode {
        self.mode
    }

    pub fn get(&self, address: &str) -> Option<&EncodedSequence> {
        self.sequences.get(address)
    }

    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Total transactions dropped across all sequences.
    pub fn dropped_rows(&self) -> usize {
        self.dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;

    const A: &str = "0x000bec82c41837d974899b26b26f9cc8890af9ea";
    const DEX: &str = "0x763684e5742a42be570d975a889ba11587432b5c";

    fn tx(hash: &str, ts: i64, from: Option<&str>, to: Option<&str>) -> Transaction {
        Transaction::new(hash, Utc.timestamp_opt(ts, 0).unwrap(), from, to)
    }

    fn encoder() -> SequenceEncoder {
        SequenceEncoder::new(EncodingConfig::default())
    }

    #[test]
    fn test_own_address_is_masked() {
        let txs = vec![tx("0x1", 1, Some(DEX), Some(A)), tx("0x2", 2, Some(A), Some(DEX))];
        let seq = encoder().encode_transactions(A, &txs, EncodingMode::AddressOnly);
        assert_eq!(seq.symbols(), &["0x763684-x".to_string(), "x-0x763684".to_string()]);
    }

    #[test]
    fn test_token_count_is_twice_transaction_count() {
        let txs: Vec<Transaction> = (0..7)
            .map(|i| tx(&format!("0x{i}"), i, Some(A), Some(DEX)))
            .collect();
        let seq = encoder().encode_transactions(A, &txs, EncodingMode::AddressOnly);
        assert_eq!(seq.tokens().count(), 2 * txs.len());
        assert_eq!(seq.address_token_count(), 2 * txs.len());
    }

    #[test]
    fn test_rows_with_missing_fields_are_dropped_and_counted() {
        let txs = vec![
            tx("0x1", 1, Some(A), None),
            tx("0x2", 2, Some(A), Some(DEX)),
            tx("0x3", 3, None, Some(A)),
        ];
        let seq = encoder().encode_transactions(A, &txs, EncodingMode::AddressOnly);
        assert_eq!(seq.len(), 1);
        assert_eq!(seq.dropped(), 2);
    }

    #[test]
    fn test_value_mode_includes_truncated_value() {
        let txs = vec![
            tx("0x1", 1, Some(DEX), Some(A)).with_value(Decimal::from(1_000_000_000_000_000_000u64)),
            tx("0x2", 2, Some(A), Some(DEX)),
        ];
        let seq = encoder().encode_transactions(A, &txs, EncodingMode::AddressAndValue);
        assert_eq!(seq.symbols(), &["0x763684-10000000-x".to_string()]);
        assert_eq!(seq.dropped(), 1);
        assert_eq!(seq.tokens().count(), 3);
    }

    #[test]
    fn test_invalid_mode_string() {
        assert_eq!(
            "address_and_value".parse::<EncodingMode>().unwrap(),
            EncodingMode::AddressAndValue
        );
        assert!(matches!(
            "gas_only".parse::<EncodingMode>(),
            Err(AnalysisError::InvalidMode(m)) if m == "gas_only"
        ));
    }

    #[test]
    fn test_mixed_case_address_is_still_masked() {
        let store = TransactionStore::new(
            sybil_scorer_models::TransactionTable::new(vec![
                tx("0x1", 1, Some(DEX), Some(A)),
                tx("0x2", 2, Some(A), Some(DEX)),
            ]),
            [A],
        )
        .unwrap();
        let seq = encoder().encode(&store, &A.to_uppercase(), EncodingMode::AddressOnly);
        assert_eq!(seq.address(), A);
        assert_eq!(seq.symbols(), &["0x763684-x".to_string(), "x-0x763684".to_string()]);
    }

    #[test]
    fn test_unknown_address_encodes_empty() {
        let store = TransactionStore::new(
            sybil_scorer_models::TransactionTable::new(vec![tx("0x1", 1, Some(A), Some(DEX))]),
            [A],
        )
        .unwrap();
        let seq = encoder().encode(&store, "0xnobody", EncodingMode::AddressOnly);
        assert!(seq.is_empty());
        assert_eq!(seq.dropped(), 0);
    }
}
