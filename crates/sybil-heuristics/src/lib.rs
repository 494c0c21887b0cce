//! Behavioral sybil heuristics over address transaction histories.

pub mod analyzer;
pub mod config;
pub mod encoder;
pub mod error;
pub mod interactions;
pub mod lcs;
pub mod seeds;
pub mod series;
pub mod similarity;
pub mod store;

pub use analyzer::{AnalysisSummary, FeatureAggregator, FeatureTable};
pub use config::{AnalysisConfig, EncodingConfig, SimilarityConfig};
pub use encoder::{EncodedCorpus, EncodedSequence, EncodingMode, SequenceEncoder};
pub use error::{AnalysisError, AnalysisResult};
pub use interactions::{InteractionIndex, InteractionStats};
pub use seeds::{ResolutionState, SeedRecord, SeedResolver};
pub use series::{Calculator, FeatureParams, SeriesFeature, SeriesFeatureSpec, SeriesKind};
pub use similarity::{
    SimilarityBackend, SimilarityEngine, SimilarityMatch, SimilarityReport, SubstringMatcher,
};
pub use store::{normalize_address, TransactionStore};
