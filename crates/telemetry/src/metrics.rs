//! Prometheus metrics for sybil scoring runs.

use prometheus::{
    Encoder, HistogramOpts, HistogramVec, IntCounter, Registry, TextEncoder,
};

/// Metrics collector for one scoring run.
///
/// Each instance owns its registry, so several runs in one process never
/// collide on metric names.
#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    addresses_analyzed: IntCounter,
    transactions_loaded: IntCounter,
    rows_skipped: IntCounter,
    rows_dropped: IntCounter,
    similarity_comparisons: IntCounter,
    similarity_pruned: IntCounter,
    suspicious_seeds: IntCounter,
    similar_behavior: IntCounter,
    phase_duration: HistogramVec,
}

fn counter(registry: &Registry, name: &str, help: &str) -> anyhow::Result<IntCounter> {
    let counter = IntCounter::new(name, help)?;
    registry.register(Box::new(counter.clone()))?;
    Ok(counter)
}

impl Metrics {
    /// Create a new metrics instance with a fresh registry.
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let addresses_analyzed = counter(
            &registry,
            "sybil_scorer_addresses_analyzed_total",
            "Total number of cohort addresses analyzed",
        )?;
        let transactions_loaded = counter(
            &registry,
            "sybil_scorer_transactions_loaded_total",
            "Total number of transactions attributed to cohort addresses",
        )?;
        let rows_skipped = counter(
            &registry,
            "sybil_scorer_rows_skipped_total",
            "Total number of input rows skipped while loading",
        )?;
        let rows_dropped = counter(
            &registry,
            "sybil_scorer_rows_dropped_total",
            "Total number of transactions dropped while encoding sequences",
        )?;
        let similarity_comparisons = counter(
            &registry,
            "sybil_scorer_similarity_comparisons_total",
            "Total number of sequence comparisons run",
        )?;
        let similarity_pruned = counter(
            &registry,
            "sybil_scorer_similarity_pruned_total",
            "Total number of comparisons skipped by the shape window",
        )?;
        let suspicious_seeds = counter(
            &registry,
            "sybil_scorer_suspicious_seeds_total",
            "Total number of addresses with a suspicious seed",
        )?;
        let similar_behavior = counter(
            &registry,
            "sybil_scorer_similar_behavior_total",
            "Total number of addresses with similar behavior matches",
        )?;

        let phase_duration = HistogramVec::new(
            HistogramOpts::new(
                "sybil_scorer_phase_duration_seconds",
                "Analysis phase duration in seconds",
            ),
            &["phase"],
        )?;
        registry.register(Box::new(phase_duration.clone()))?;

        Ok(Self {
            registry,
            addresses_analyzed,
            transactions_loaded,
            rows_skipped,
            rows_dropped,
            similarity_comparisons,
            similarity_pruned,
            suspicious_seeds,
            similar_behavior,
            phase_duration,
        })
    }

    pub fn inc_addresses_analyzed(&self, count: u64) {
        self.addresses_analyzed.inc_by(count);
    }

    pub fn inc_transactions_loaded(&self, count: u64) {
        self.transactions_loaded.inc_by(count);
    }

    /// Rows the loader could not parse.
    pub fn inc_rows_skipped(&self, count: u64) {
        self.rows_skipped.inc_by(count);
    }

    /// Rows the encoder dropped for missing fields.
    pub fn inc_rows_dropped(&self, count: u64) {
        self.rows_dropped.inc_by(count);
    }

    pub fn inc_similarity_comparisons(&self, count: u64) {
        self.similarity_comparisons.inc_by(count);
    }

    pub fn inc_similarity_pruned(&self, count: u64) {
        self.similarity_pruned.inc_by(count);
    }

    pub fn inc_suspicious_seeds(&self, count: u64) {
        self.suspicious_seeds.inc_by(count);
    }

    pub fn inc_similar_behavior(&self, count: u64) {
        self.similar_behavior.inc_by(count);
    }

    /// Record how long an analysis phase took.
    pub fn observe_phase(&self, phase: &str, duration_secs: f64) {
        self.phase_duration
            .with_label_values(&[phase])
            .observe(duration_secs);
    }

    /// Get Prometheus metrics as a string.
    pub fn gather(&self) -> anyhow::Result<String> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_are_exported() {
        let metrics = Metrics::new().unwrap();
        metrics.inc_addresses_analyzed(3);
        metrics.inc_similarity_pruned(99);
        metrics.observe_phase("similarity", 0.25);

        let text = metrics.gather().unwrap();
        assert!(text.contains("sybil_scorer_addresses_analyzed_total 3"));
        assert!(text.contains("sybil_scorer_similarity_pruned_total 99"));
        assert!(text.contains("phase=\"similarity\""));
    }

    #[test]
    fn test_instances_do_not_share_registries() {
        let first = Metrics::new().unwrap();
        let second = Metrics::new().unwrap();
        first.inc_suspicious_seeds(1);
        assert!(second
            .gather()
            .unwrap()
            .contains("sybil_scorer_suspicious_seeds_total 0"));
    }
}
