//! One scoring run: build caches, compute features, report.

use std::time::Instant;

use serde::Serialize;
use sybil_scorer_heuristics::{
    AnalysisConfig, FeatureAggregator, FeatureTable, SimilarityMatch, TransactionStore,
};
use sybil_scorer_models::{FeatureRow, SybilSignal};
use sybil_scorer_telemetry::{audit, Metrics};
use tracing::{info, warn};

/// Scores a cohort and records metrics and audit samples along the way.
pub struct ScoreRunner {
    metrics: Metrics,
    sample_output_path: Option<String>,
}

#[derive(Debug, Serialize)]
struct FlaggedAddress<'a> {
    address: &'a str,
    signals: Vec<&'static str>,
    transaction_count: usize,
    same_seed_count: usize,
    same_seed_naive_count: usize,
    cohort_interaction_count: usize,
    similar_addresses: Vec<(&'a str, SimilarityMatch)>,
}

impl ScoreRunner {
    /// Create a new runner.
    ///
    /// # Arguments
    /// * `metrics` - Metrics collector
    /// * `sample_output_path` - Optional path for audit samples of flagged addresses
    pub fn new(metrics: Metrics, sample_output_path: Option<String>) -> Self {
        Self {
            metrics,
            sample_output_path,
        }
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Build the aggregator over `store` and compute the feature table.
    pub fn run(
        &self,
        store: &TransactionStore,
        config: AnalysisConfig,
    ) -> anyhow::Result<FeatureTable> {
        let started = Instant::now();
        let aggregator = FeatureAggregator::new(store, config)?;
        self.metrics
            .observe_phase("build", started.elapsed().as_secs_f64());

        let started = Instant::now();
        let table = aggregator.compute();
        self.metrics
            .observe_phase("compute", started.elapsed().as_secs_f64());

        let summary = table.summary();
        self.metrics.inc_addresses_analyzed(summary.addresses as u64);
        self.metrics.inc_transactions_loaded(summary.transactions as u64);
        self.metrics.inc_rows_dropped(summary.dropped_rows as u64);
        self.metrics.inc_similarity_comparisons(summary.comparisons as u64);
        self.metrics.inc_similarity_pruned(summary.pruned as u64);
        self.metrics.inc_suspicious_seeds(summary.suspicious as u64);
        self.metrics.inc_similar_behavior(summary.similar as u64);

        if self.sample_output_path.is_some() {
            self.write_samples(&table);
        }

        info!(
            "Scored {} addresses: {} flagged, {} comparisons, {} pruned",
            summary.addresses, summary.flagged, summary.comparisons, summary.pruned
        );
        Ok(table)
    }

    fn write_samples(&self, table: &FeatureTable) {
        for row in table.rows().iter().filter(|r| r.is_flagged()) {
            let sample = flagged_address(row, table);
            let record = audit::AuditRecord::new("flagged_address", &sample);
            if let Err(e) = audit::write_audit_sample(self.sample_output_path.as_ref(), &record) {
                warn!("Failed to write audit sample: {}", e);
            }
        }
    }
}

fn flagged_address<'a>(row: &'a FeatureRow, table: &'a FeatureTable) -> FlaggedAddress<'a> {
    let similar_addresses = table
        .reports()
        .get(&row.address)
        .map(|report| {
            report
                .matches
                .iter()
                .map(|(address, m)| (address.as_str(), *m))
                .collect()
        })
        .unwrap_or_default();

    FlaggedAddress {
        address: &row.address,
        signals: row.signals().iter().map(SybilSignal::as_str).collect(),
        transaction_count: row.transaction_count,
        same_seed_count: row.same_seed_count,
        same_seed_naive_count: row.same_seed_naive_count,
        cohort_interaction_count: row.cohort_interaction_count,
        similar_addresses,
    }
}
