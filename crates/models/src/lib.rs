//! Data model shared by the sybil analysis engine and its tooling.
//!
//! Holds the transaction records consumed by the engine and the feature rows
//! it produces. Nothing in here performs analysis.

pub mod models;

pub use models::{
    FeatureRow, SybilSignal, Transaction, TransactionDetail, TransactionTable, REQUIRED_COLUMNS,
};
