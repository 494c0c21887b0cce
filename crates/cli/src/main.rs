//! CLI for behavioral sybil scoring of address cohorts.

mod loader;
mod output;
mod scorer;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use chrono::Utc;
use sybil_scorer_heuristics::series::CURRENT_TIME_PARAM;
use sybil_scorer_heuristics::{AnalysisConfig, FeatureAggregator, TransactionStore};
use sybil_scorer_telemetry::{init_logging, Metrics};
use tracing::info;

use crate::scorer::ScoreRunner;

#[derive(Parser)]
#[command(name = "sybil-scorer")]
#[command(about = "Behavioral sybil detection over address transaction histories")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Inputs and config overrides shared by every command.
#[derive(Args)]
struct AnalysisArgs {
    /// Transactions CSV path
    #[arg(long)]
    transactions: String,

    /// Cohort CSV path (an `address` column, or the first column)
    #[arg(long)]
    cohort: String,

    /// JSON analysis config path
    #[arg(long)]
    config: Option<String>,

    /// Encoding mode: address_only or address_and_value
    #[arg(long)]
    mode: Option<String>,

    /// Similarity backend: naive_dp or fast_primitive
    #[arg(long)]
    backend: Option<String>,

    /// Minimum match length a similar address must exceed
    #[arg(long)]
    min_match_length: Option<usize>,

    /// Scale the match threshold with the address's transaction count
    #[arg(long, default_value = "false")]
    dynamic_threshold: bool,

    /// Addresses with at most this many transactions get the similarity pass
    #[arg(long)]
    few_transactions_threshold: Option<usize>,

    /// Log level
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the feature table for a cohort
    Score {
        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Feature table CSV output path
        #[arg(long, default_value = "features.csv")]
        output: String,

        /// Reference time (unix seconds) for time-relative series features
        #[arg(long)]
        current_time: Option<i64>,

        /// Sample output path for audit logs of flagged addresses
        #[arg(long)]
        sample_output_path: Option<String>,

        /// Write Prometheus metrics to this file when the run completes
        #[arg(long)]
        metrics_output_path: Option<String>,
    },
    /// Print the similarity matches of one address as JSON
    Similarity {
        #[command(flatten)]
        analysis: AnalysisArgs,

        /// Address to compare against the rest of the cohort
        #[arg(long)]
        address: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Score {
            analysis,
            output,
            current_time,
            sample_output_path,
            metrics_output_path,
        } => {
            init_logging(analysis.log_level.as_deref())?;
            run_score(
                &analysis,
                &output,
                current_time,
                sample_output_path,
                metrics_output_path.as_deref(),
            )?;
        }
        Commands::Similarity { analysis, address } => {
            init_logging(analysis.log_level.as_deref())?;
            run_similarity(&analysis, &address)?;
        }
    }

    Ok(())
}

/// Load the JSON config, if any, and apply command-line overrides.
///
/// Series features without a `current_time` parameter are evaluated against
/// `current_time`, or the wall clock when that is not given either.
fn load_config(args: &AnalysisArgs, current_time: Option<i64>) -> anyhow::Result<AnalysisConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config {}", path))?;
            serde_json::from_str(&raw).with_context(|| format!("Invalid config {}", path))?
        }
        None => AnalysisConfig::default(),
    };

    if let Some(mode) = &args.mode {
        config.encoding.mode = mode.parse()?;
    }
    if let Some(backend) = &args.backend {
        config.similarity.backend = backend.parse()?;
    }
    if let Some(min_match_length) = args.min_match_length {
        config.similarity.min_match_length = min_match_length;
    }
    if args.dynamic_threshold {
        config.similarity.dynamic_threshold = true;
    }
    if let Some(threshold) = args.few_transactions_threshold {
        config.few_transactions_threshold = threshold;
    }

    let now = current_time.unwrap_or_else(|| Utc::now().timestamp()) as f64;
    for spec in &mut config.series_features {
        spec.params.entry(CURRENT_TIME_PARAM.to_string()).or_insert(now);
    }

    config.validate()?;
    Ok(config)
}

fn load_store(args: &AnalysisArgs, metrics: &Metrics) -> anyhow::Result<TransactionStore> {
    let loaded = loader::load_transactions(&args.transactions)?;
    metrics.inc_rows_skipped(loaded.skipped as u64);
    let cohort = loader::load_cohort(&args.cohort)?;
    Ok(TransactionStore::new(loaded.table, cohort)?)
}

fn run_score(
    args: &AnalysisArgs,
    output: &str,
    current_time: Option<i64>,
    sample_output_path: Option<String>,
    metrics_output_path: Option<&str>,
) -> anyhow::Result<()> {
    info!("Starting sybil scoring run");

    let config = load_config(args, current_time)?;

    let metrics = Metrics::new()?;
    let store = load_store(args, &metrics)?;
    let runner = ScoreRunner::new(metrics, sample_output_path);
    let table = runner.run(&store, config)?;

    output::write_feature_csv(output, &table)?;
    if let Some(path) = metrics_output_path {
        output::write_metrics(path, &runner.metrics().gather()?)?;
    }
    Ok(())
}

fn run_similarity(args: &AnalysisArgs, address: &str) -> anyhow::Result<()> {
    let config = load_config(args, None)?;
    let metrics = Metrics::new()?;
    let store = load_store(args, &metrics)?;

    let aggregator = FeatureAggregator::new(&store, config)?;
    let report = aggregator.similarity_engine().similar_to(address);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
