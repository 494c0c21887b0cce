//! Analysis configuration.
//!
//! Every heuristic constant used by the engine lives here so it can be tuned
//! from a config file instead of being baked into the algorithms.

use serde::{Deserialize, Serialize};

use crate::encoder::EncodingMode;
use crate::error::{AnalysisError, AnalysisResult};
use crate::series::SeriesFeatureSpec;
use crate::similarity::SimilarityBackend;

/// Top-level configuration for one analysis run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    #[serde(default)]
    pub encoding: EncodingConfig,

    #[serde(default)]
    pub similarity: SimilarityConfig,

    /// Addresses with at most this many transactions are low-activity and
    /// get the similarity pass.
    #[serde(default = "default_few_transactions_threshold")]
    pub few_transactions_threshold: usize,

    /// Time-series features to compute per address.
    #[serde(default)]
    pub series_features: Vec<SeriesFeatureSpec>,
}

/// How transaction lists are turned into comparable symbol strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodingConfig {
    #[serde(default)]
    pub mode: EncodingMode,

    /// Characters kept from each address (and value) field.
    #[serde(default = "default_prefix_len")]
    pub prefix_len: usize,

    /// Replaces the analysed address inside its own sequence.
    #[serde(default = "default_placeholder")]
    pub placeholder: String,

    /// Joins the fields of one transaction.
    #[serde(default = "default_separator")]
    pub separator: String,
}

/// Similarity thresholds, pruning window and backend selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    #[serde(default)]
    pub backend: SimilarityBackend,

    /// A candidate matches when its match length is strictly above this.
    #[serde(default = "default_min_match_length")]
    pub min_match_length: usize,

    /// Use `max(floor, min(ceiling, count / divisor))` instead of the fixed
    /// minimum.
    #[serde(default)]
    pub dynamic_threshold: bool,

    #[serde(default = "default_dynamic_floor")]
    pub dynamic_floor: usize,

    #[serde(default = "default_dynamic_ceiling")]
    pub dynamic_ceiling: usize,

    #[serde(default = "default_dynamic_divisor")]
    pub dynamic_divisor: usize,

    /// Lower bound of the shape window is `max(1, count / shape_min_divisor)`.
    #[serde(default = "default_shape_min_divisor")]
    pub shape_min_divisor: usize,

    /// Upper bound of the shape window is `max(count, count * shape_max_factor)`.
    #[serde(default = "default_shape_max_factor")]
    pub shape_max_factor: usize,
}

fn default_few_transactions_threshold() -> usize {
    10
}
fn default_prefix_len() -> usize {
    8
}
fn default_placeholder() -> String {
    "x".to_string()
}
fn default_separator() -> String {
    "-".to_string()
}
fn default_min_match_length() -> usize {
    5
}
fn default_dynamic_floor() -> usize {
    3
}
fn default_dynamic_ceiling() -> usize {
    10
}
fn default_dynamic_divisor() -> usize {
    4
}
fn default_shape_min_divisor() -> usize {
    4
}
fn default_shape_max_factor() -> usize {
    3
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            encoding: EncodingConfig::default(),
            similarity: SimilarityConfig::default(),
            few_transactions_threshold: default_few_transactions_threshold(),
            series_features: Vec::new(),
        }
    }
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            mode: EncodingMode::default(),
            prefix_len: default_prefix_len(),
            placeholder: default_placeholder(),
            separator: default_separator(),
        }
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            backend: SimilarityBackend::default(),
            min_match_length: default_min_match_length(),
            dynamic_threshold: false,
            dynamic_floor: default_dynamic_floor(),
            dynamic_ceiling: default_dynamic_ceiling(),
            dynamic_divisor: default_dynamic_divisor(),
            shape_min_divisor: default_shape_min_divisor(),
            shape_max_factor: default_shape_max_factor(),
        }
    }
}

impl AnalysisConfig {
    /// Reject configurations the engine cannot run with.
    pub fn validate(&self) -> AnalysisResult<()> {
        if self.encoding.prefix_len == 0 {
            return Err(AnalysisError::InvalidConfig(
                "encoding.prefix_len must be positive".into(),
            ));
        }
        if self.encoding.placeholder.is_empty() || self.encoding.separator.is_empty() {
            return Err(AnalysisError::InvalidConfig(
                "encoding.placeholder and encoding.separator must be non-empty".into(),
            ));
        }
        if self.similarity.dynamic_divisor == 0 || self.similarity.shape_min_divisor == 0 {
            return Err(AnalysisError::InvalidConfig(
                "similarity divisors must be positive".into(),
            ));
        }
        if self.similarity.dynamic_floor > self.similarity.dynamic_ceiling {
            return Err(AnalysisError::InvalidConfig(
                "similarity.dynamic_floor exceeds similarity.dynamic_ceiling".into(),
            ));
        }
        for spec in &self.series_features {
            spec.validate()?;
        }
        Ok(())
    }
}
