//! Transaction-pattern similarity.
//!
//! Two addresses are similar when their encoded sequences share a long
//! contiguous run of identical transaction symbols. Candidates whose activity
//! volume is far from the target's are pruned before any matching is done.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SimilarityConfig;
use crate::encoder::{EncodedCorpus, EncodedSequence};
use crate::error::AnalysisError;
use crate::lcs::{longest_common_substring, longest_common_substring_linear};
use crate::store::{normalize_address, TransactionStore};

/// Which longest-common-substring implementation compares sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityBackend {
    /// Token-level dynamic programming.
    NaiveDp,
    /// Suffix automaton over interned transaction symbols.
    #[default]
    FastPrimitive,
}

impl SimilarityBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            SimilarityBackend::NaiveDp => "naive_dp",
            SimilarityBackend::FastPrimitive => "fast_primitive",
        }
    }

    pub fn matcher(&self) -> Box<dyn SubstringMatcher> {
        match self {
            SimilarityBackend::NaiveDp => Box::new(DynamicProgrammingMatcher),
            SimilarityBackend::FastPrimitive => Box::new(StringPrimitiveMatcher),
        }
    }
}

impl fmt::Display for SimilarityBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SimilarityBackend {
    type Err = AnalysisError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "naive_dp" => Ok(SimilarityBackend::NaiveDp),
            "fast_primitive" => Ok(SimilarityBackend::FastPrimitive),
            other => Err(AnalysisError::InvalidBackend(other.to_string())),
        }
    }
}

/// Computes the match length, in transactions, between two sequences.
pub trait SubstringMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    fn match_length(&self, target: &EncodedSequence, candidate: &EncodedSequence) -> usize;
}

/// Exact token-level longest common substring.
#[derive(Debug, Clone, Copy, Default)]
pub struct DynamicProgrammingMatcher;

impl SubstringMatcher for DynamicProgrammingMatcher {
    fn name(&self) -> &'static str {
        "naive_dp"
    }

    fn match_length(&self, target: &EncodedSequence, candidate: &EncodedSequence) -> usize {
        longest_common_substring(target.symbols(), candidate.symbols())
    }
}

/// Linear-time longest common substring over interned symbols.
///
/// Each distinct symbol of the pair is mapped to one integer key before the
/// suffix automaton runs, so a match can never start or end inside a symbol
/// and the result equals [`DynamicProgrammingMatcher`] exactly.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringPrimitiveMatcher;

impl SubstringMatcher for StringPrimitiveMatcher {
    fn name(&self) -> &'static str {
        "fast_primitive"
    }

    fn match_length(&self, target: &EncodedSequence, candidate: &EncodedSequence) -> usize {
        interned_match_length(target.symbols(), candidate.symbols())
    }
}

/// Symbols absent from the target share a key no target symbol uses.
const UNSEEN_SYMBOL: u32 = u32::MAX;

fn interned_match_length(target: &[String], candidate: &[String]) -> usize {
    let mut keys: HashMap<&str, u32> = HashMap::with_capacity(target.len());
    let target_keys: Vec<u32> = target
        .iter()
        .map(|symbol| {
            let next = keys.len() as u32;
            *keys.entry(symbol.as_str()).or_insert(next)
        })
        .collect();
    let candidate_keys: Vec<u32> = candidate
        .iter()
        .map(|symbol| keys.get(symbol.as_str()).copied().unwrap_or(UNSEEN_SYMBOL))
        .collect();
    longest_common_substring_linear(&target_keys, &candidate_keys)
}

/// Open interval of candidate transaction counts worth comparing against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeWindow {
    pub min: f64,
    pub max: f64,
}

impl ShapeWindow {
    pub fn admits(&self, count: usize) -> bool {
        let count = count as f64;
        self.min < count && count < self.max
    }
}

/// One candidate that passed the threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SimilarityMatch {
    pub match_length: usize,
    pub score: f64,
}

/// Similarity matches found for one target address.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SimilarityReport {
    pub address: String,
    pub threshold: usize,
    pub matches: BTreeMap<String, SimilarityMatch>,
    /// Candidates actually run through the matcher.
    pub comparisons: usize,
    /// Candidates skipped by the shape window.
    pub pruned: usize,
}

impl SimilarityReport {
    pub fn cluster_size(&self) -> usize {
        self.matches.len()
    }

    pub fn has_similarity(&self) -> bool {
        !self.matches.is_empty()
    }

    pub fn mean_score(&self) -> f64 {
        if self.matches.is_empty() {
            return 0.0;
        }
        self.matches.values().map(|m| m.score).sum::<f64>() / self.matches.len() as f64
    }

    pub fn max_score(&self) -> f64 {
        self.matches
            .values()
            .map(|m| m.score)
            .fold(0.0, f64::max)
    }
}

/// Compares encoded sequences across a cohort.
///
/// Reads only from the store and corpus it was given, so one engine can be
/// shared across worker threads.
pub struct SimilarityEngine<'a> {
    store: &'a TransactionStore,
    corpus: &'a EncodedCorpus,
    config: SimilarityConfig,
    matcher: Box<dyn SubstringMatcher>,
}

impl<'a> SimilarityEngine<'a> {
    /// Create an engine using the backend named in `config`.
    ///
    /// # Arguments
    /// * `store` - Transaction store the corpus was encoded from
    /// * `corpus` - Encoded sequences for the cohort
    /// * `config` - Thresholds, pruning window and backend
    pub fn new(
        store: &'a TransactionStore,
        corpus: &'a EncodedCorpus,
        config: SimilarityConfig,
    ) -> Self {
        let matcher = config.backend.matcher();
        Self::with_matcher(store, corpus, config, matcher)
    }

    pub fn with_matcher(
        store: &'a TransactionStore,
        corpus: &'a EncodedCorpus,
        config: SimilarityConfig,
        matcher: Box<dyn SubstringMatcher>,
    ) -> Self {
        Self {
            store,
            corpus,
            config,
            matcher,
        }
    }

    /// Candidate transaction counts comparable with `address`.
    pub fn shape_window(&self, address: &str) -> ShapeWindow {
        let count = self.store.transaction_count(address);
        let min = (count as f64 / self.config.shape_min_divisor as f64).max(1.0);
        let max = count.max(count * self.config.shape_max_factor) as f64;
        ShapeWindow { min, max }
    }

    /// Match length a candidate must exceed to count as similar to `address`.
    pub fn threshold(&self, address: &str) -> usize {
        if !self.config.dynamic_threshold {
            return self.config.min_match_length;
        }
        let scaled = self.store.transaction_count(address) / self.config.dynamic_divisor;
        scaled
            .min(self.config.dynamic_ceiling)
            .max(self.config.dynamic_floor)
    }

    /// Match length between two addresses' sequences; 0 when either is unknown.
    pub fn compare(&self, target: &str, candidate: &str) -> usize {
        match (self.sequence(target), self.sequence(candidate)) {
            (Some(t), Some(c)) => self.matcher.match_length(t, c),
            _ => 0,
        }
    }

    /// Score of a match of `match_length` for `target`, normalised by the
    /// target's own length and capped at 1.
    pub fn score(&self, target: &str, match_length: usize) -> f64 {
        let half_tokens = self
            .sequence(target)
            .map(|s| s.address_token_count() as f64 / 2.0)
            .unwrap_or(0.0);
        if half_tokens == 0.0 {
            return 0.0;
        }
        (match_length as f64 / half_tokens).min(1.0)
    }

    /// Unpruned, unthresholded similarity of `candidate` as seen from `target`.
    ///
    /// Not symmetric: the score is normalised by the target's length.
    pub fn similarity(&self, target: &str, candidate: &str) -> SimilarityMatch {
        let match_length = self.compare(target, candidate);
        SimilarityMatch {
            match_length,
            score: self.score(target, match_length),
        }
    }

    /// All cohort members similar to `address`.
    pub fn similar_to(&self, address: &str) -> SimilarityReport {
        let address = normalize_address(address);
        let threshold = self.threshold(&address);
        let mut report = SimilarityReport {
            address: address.clone(),
            threshold,
            ..Default::default()
        };

        let Some(target) = self.sequence(&address) else {
            return report;
        };
        let window = self.shape_window(&address);

        for candidate in self.store.all_addresses() {
            if *candidate == address {
                continue;
            }
            if !window.admits(self.store.transaction_count(candidate)) {
                report.pruned += 1;
                continue;
            }
            let Some(other) = self.sequence(candidate) else {
                continue;
            };
            report.comparisons += 1;
            let match_length = self.matcher.match_length(target, other);
            if match_length > threshold {
                report.matches.insert(
                    candidate.clone(),
                    SimilarityMatch {
                        match_length,
                        score: self.score(&address, match_length),
                    },
                );
            }
        }

        debug!(
            "Similarity for {}: {} matches, {} compared, {} pruned",
            address,
            report.matches.len(),
            report.comparisons,
            report.pruned
        );
        report
    }

    /// Run [`Self::similar_to`] for many targets in parallel.
    pub fn batch(&self, addresses: &[String]) -> BTreeMap<String, SimilarityReport> {
        let reports: BTreeMap<String, SimilarityReport> = addresses
            .par_iter()
            .map(|address| (normalize_address(address), self.similar_to(address)))
            .collect();

        let comparisons: usize = reports.values().map(|r| r.comparisons).sum();
        let pruned: usize = reports.values().map(|r| r.pruned).sum();
        info!(
            "Similarity pass ({}) over {} targets: {} comparisons, {} pruned",
            self.matcher.name(),
            reports.len(),
            comparisons,
            pruned
        );
        reports
    }

    fn sequence(&self, address: &str) -> Option<&EncodedSequence> {
        self.corpus
            .get(address)
            .or_else(|| self.corpus.get(&normalize_address(address)))
    }
}
