//! Error types for the analysis engine.
//!
//! Only conditions that make a whole run meaningless are errors. Lookups of
//! unknown addresses and malformed rows degrade to empty results instead.

/// Error type for analysis operations.
#[derive(Debug, thiserror::Error)]
pub enum AnalysisError {
    #[error("Transaction table is missing required column `{column}`")]
    Schema { column: String },
    #[error("Unsupported encoding mode: {0}")]
    InvalidMode(String),
    #[error("Unsupported similarity backend: {0}")]
    InvalidBackend(String),
    #[error("Unknown series feature calculator: {0}")]
    UnknownFeature(String),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Result type for analysis operations.
pub type AnalysisResult<T> = Result<T, AnalysisError>;
