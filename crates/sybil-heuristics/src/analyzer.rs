//! Feature aggregation across a cohort.
//!
//! Building an aggregator resolves seeds, indexes interactions and encodes
//! every sequence up front. `compute` then only reads those caches, which is
//! what lets the similarity pass fan out across threads.

use std::collections::BTreeMap;

use serde::Serialize;
use sybil_scorer_models::{FeatureRow, TransactionDetail};
use tracing::{debug, info};

use crate::config::AnalysisConfig;
use crate::encoder::{EncodedCorpus, SequenceEncoder};
use crate::error::AnalysisResult;
use crate::interactions::InteractionIndex;
use crate::seeds::SeedResolver;
use crate::series::{FeatureParams, SeriesFeature, SeriesKind};
use crate::similarity::{SimilarityEngine, SimilarityReport};
use crate::store::TransactionStore;

const BASE_COLUMNS: [&str; 18] = [
    "address",
    "transaction_count",
    "has_few_transactions",
    "same_seed_count",
    "has_same_seed",
    "same_seed_naive_count",
    "has_same_seed_naive",
    "has_suspicious_seed",
    "cohort_interaction_count",
    "has_interacted_with_cohort",
    "unique_counterparty_count",
    "unique_counterparty_ratio",
    "outgoing_count",
    "outgoing_ratio",
    "similarity_cluster_size",
    "similarity_mean_score",
    "similarity_max_score",
    "has_similarity",
];

const DETAIL_FIELDS: [&str; 6] = [
    "hash",
    "counterparty",
    "gas_used",
    "gas_limit",
    "value",
    "timestamp",
];

struct SeriesColumn {
    column: String,
    series: SeriesKind,
    feature: Box<dyn SeriesFeature>,
    params: FeatureParams,
}

/// Run-level counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AnalysisSummary {
    pub addresses: usize,
    pub transactions: usize,
    pub dropped_rows: usize,
    pub low_activity: usize,
    pub comparisons: usize,
    pub pruned: usize,
    pub suspicious: usize,
    pub similar: usize,
    pub flagged: usize,
}

/// One feature row per cohort address, in address order.
#[derive(Debug, Clone)]
pub struct FeatureTable {
    rows: Vec<FeatureRow>,
    series_columns: Vec<String>,
    reports: BTreeMap<String, SimilarityReport>,
    summary: AnalysisSummary,
}

impl FeatureTable {
    pub fn rows(&self) -> &[FeatureRow] {
        &self.rows
    }

    pub fn get(&self, address: &str) -> Option<&FeatureRow> {
        self.rows.iter().find(|row| row.address == address)
    }

    /// Similarity reports of the low-activity addresses.
    pub fn reports(&self) -> &BTreeMap<String, SimilarityReport> {
        &self.reports
    }

    pub fn summary(&self) -> &AnalysisSummary {
        &self.summary
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Flat column header, matching the layout of [`Self::records`].
    pub fn column_names(&self) -> Vec<String> {
        let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
        for prefix in ["first_incoming", "first_outgoing"] {
            columns.extend(DETAIL_FIELDS.iter().map(|f| format!("{prefix}_{f}")));
        }
        columns.extend(self.series_columns.iter().cloned());
        columns
    }

    /// Rows flattened to strings; missing values become empty fields.
    pub fn records(&self) -> Vec<Vec<String>> {
        self.rows.iter().map(|row| self.record(row)).collect()
    }

    fn record(&self, row: &FeatureRow) -> Vec<String> {
        let mut record = vec![
            row.address.clone(),
            row.transaction_count.to_string(),
            row.has_few_transactions.to_string(),
            row.same_seed_count.to_string(),
            row.has_same_seed.to_string(),
            row.same_seed_naive_count.to_string(),
            row.has_same_seed_naive.to_string(),
            row.has_suspicious_seed.to_string(),
            row.cohort_interaction_count.to_string(),
            row.has_interacted_with_cohort.to_string(),
            row.unique_counterparty_count.to_string(),
            row.unique_counterparty_ratio.to_string(),
            row.outgoing_count.to_string(),
            row.outgoing_ratio.to_string(),
            optional(row.similarity_cluster_size),
            optional(row.similarity_mean_score),
            optional(row.similarity_max_score),
            optional(row.has_similarity),
        ];
        record.extend(detail_fields(row.first_incoming.as_ref()));
        record.extend(detail_fields(row.first_outgoing.as_ref()));
        for column in &self.series_columns {
            record.push(optional(row.series.get(column).copied().flatten()));
        }
        record
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn detail_fields(detail: Option<&TransactionDetail>) -> Vec<String> {
    match detail {
        Some(d) => vec![
            d.hash.clone(),
            d.counterparty.clone().unwrap_or_default(),
            optional(d.gas_used),
            optional(d.gas_limit),
            optional(d.value),
            d.timestamp.to_rfc3339(),
        ],
        None => vec![String::new(); DETAIL_FIELDS.len()],
    }
}

/// Composes every analysis component into one feature table.
pub struct FeatureAggregator<'a> {
    store: &'a TransactionStore,
    config: AnalysisConfig,
    seeds: SeedResolver,
    interactions: InteractionIndex,
    corpus: EncodedCorpus,
    series: Vec<SeriesColumn>,
}

impl<'a> FeatureAggregator<'a> {
    /// Validate `config` and build every per-store cache.
    ///
    /// # Arguments
    /// * `store` - Cohort transactions, already grouped and sorted
    /// * `config` - Encoding, similarity and series feature settings
    ///
    /// # Returns
    /// An aggregator ready for [`Self::compute`], or the configuration error.
    pub fn new(store: &'a TransactionStore, config: AnalysisConfig) -> AnalysisResult<Self> {
        config.validate()?;

        let mut series = Vec::with_capacity(config.series_features.len());
        for spec in &config.series_features {
            let calculator = spec.calculator()?;
            debug!("Series feature {} over {}", calculator.name(), spec.series);
            series.push(SeriesColumn {
                column: spec.column_name(),
                series: spec.series,
                feature: Box::new(calculator),
                params: spec.params.clone(),
            });
        }

        let seeds = SeedResolver::build(store);
        let interactions = InteractionIndex::build(store);
        let encoder = SequenceEncoder::new(config.encoding.clone());
        let corpus = EncodedCorpus::build(store, &encoder, config.encoding.mode);

        Ok(Self {
            store,
            config,
            seeds,
            interactions,
            corpus,
            series,
        })
    }

    /// Add a feature column backed by an external calculator.
    pub fn with_series_feature(
        mut self,
        column: impl Into<String>,
        series: SeriesKind,
        feature: Box<dyn SeriesFeature>,
        params: FeatureParams,
    ) -> Self {
        self.series.push(SeriesColumn {
            column: column.into(),
            series,
            feature,
            params,
        });
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn seeds(&self) -> &SeedResolver {
        &self.seeds
    }

    pub fn interactions(&self) -> &InteractionIndex {
        &self.interactions
    }

    pub fn corpus(&self) -> &EncodedCorpus {
        &self.corpus
    }

    pub fn similarity_engine(&self) -> SimilarityEngine<'_> {
        SimilarityEngine::new(self.store, &self.corpus, self.config.similarity.clone())
    }

    /// At most `few_transactions_threshold` transactions.
    pub fn is_low_activity(&self, address: &str) -> bool {
        self.store.transaction_count(address) <= self.config.few_transactions_threshold
    }

    /// Compute the full feature table.
    ///
    /// Cheap features are computed for every address; the similarity pass
    /// runs only for low-activity addresses.
    pub fn compute(&self) -> FeatureTable {
        let addresses = self.store.all_addresses();
        let low_activity: Vec<String> = addresses
            .iter()
            .filter(|a| self.is_low_activity(a))
            .cloned()
            .collect();

        let reports = self.similarity_engine().batch(&low_activity);

        let rows: Vec<FeatureRow> = addresses
            .iter()
            .map(|address| self.feature_row(address, reports.get(address)))
            .collect();

        let summary = AnalysisSummary {
            addresses: rows.len(),
            transactions: self.store.row_count(),
            dropped_rows: self.corpus.dropped_rows(),
            low_activity: low_activity.len(),
            comparisons: reports.values().map(|r| r.comparisons).sum(),
            pruned: reports.values().map(|r| r.pruned).sum(),
            suspicious: rows.iter().filter(|r| r.has_suspicious_seed).count(),
            similar: rows.iter().filter(|r| r.has_similarity == Some(true)).count(),
            flagged: rows.iter().filter(|r| r.is_flagged()).count(),
        };
        info!(
            "Computed features for {} addresses: {} suspicious seeds, {} with similar behaviour, {} flagged",
            summary.addresses, summary.suspicious, summary.similar, summary.flagged
        );

        FeatureTable {
            rows,
            series_columns: self.series.iter().map(|s| s.column.clone()).collect(),
            reports,
            summary,
        }
    }

    /// Feature row for one address given its similarity report, if any.
    pub fn feature_row(&self, address: &str, report: Option<&SimilarityReport>) -> FeatureRow {
        let transaction_count = self.store.transaction_count(address);
        let stats = self.interactions.stats(address).cloned().unwrap_or_default();
        let same_seed_count = self.seeds.same_seed_count(address);
        let same_seed_naive_count = self.seeds.same_seed_naive_count(address);
        let cohort_interaction_count = self.interactions.cohort_interaction_count(address);

        let series = self
            .series
            .iter()
            .map(|s| {
                let values = self.store.series(address, s.series);
                (s.column.clone(), s.feature.compute(&values, &s.params))
            })
            .collect();

        FeatureRow {
            address: address.to_string(),
            transaction_count,
            has_few_transactions: transaction_count <= self.config.few_transactions_threshold,
            same_seed_count,
            has_same_seed: same_seed_count > 0,
            same_seed_naive_count,
            has_same_seed_naive: same_seed_naive_count > 0,
            has_suspicious_seed: self.seeds.is_suspicious(address),
            cohort_interaction_count,
            has_interacted_with_cohort: cohort_interaction_count > 0,
            unique_counterparty_count: stats.counterparties.len(),
            unique_counterparty_ratio: stats.unique_counterparty_ratio(),
            outgoing_count: stats.outgoing_count,
            outgoing_ratio: stats.outgoing_ratio(),
            similarity_cluster_size: report.map(SimilarityReport::cluster_size),
            similarity_mean_score: report.map(SimilarityReport::mean_score),
            similarity_max_score: report.map(SimilarityReport::max_score),
            has_similarity: report.map(SimilarityReport::has_similarity),
            first_incoming: self
                .store
                .first_incoming(address)
                .map(|tx| TransactionDetail::from_transaction(tx, address)),
            first_outgoing: self
                .store
                .first_outgoing(address)
                .map(|tx| TransactionDetail::from_transaction(tx, address)),
            series,
        }
    }
}
