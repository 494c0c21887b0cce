//! Feature table output.

use std::path::Path;

use anyhow::Context;
use sybil_scorer_heuristics::FeatureTable;
use tracing::info;

/// Write the feature table as CSV, one row per address.
pub fn write_feature_csv<P: AsRef<Path>>(path: P, table: &FeatureTable) -> anyhow::Result<()> {
    let path = path.as_ref();
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create output CSV {}", path.display()))?;

    writer.write_record(table.column_names())?;
    for record in table.records() {
        writer.write_record(&record)?;
    }
    writer.flush()?;

    info!("Wrote {} feature rows to {}", table.len(), path.display());
    Ok(())
}

/// Write the metrics text exposition to `path`.
pub fn write_metrics<P: AsRef<Path>>(path: P, exposition: &str) -> anyhow::Result<()> {
    let path = path.as_ref();
    std::fs::write(path, exposition)
        .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    info!("Wrote metrics to {}", path.display());
    Ok(())
}
