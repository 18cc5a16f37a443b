//! Offline training run
//!
//! Loads the PR dataset, compares the candidate classifiers, calibrates the
//! decision threshold and writes model, schema, threshold and report.

use anyhow::{Context, Result};
use clap::Parser;
use pr_risk_prediction::config::AppConfig;
use pr_risk_prediction::logging::init_logging;
use pr_risk_prediction::training::{ImbalanceStrategy, TrainingPipeline};
use std::path::PathBuf;
use tracing::info;

#[derive(Debug, Parser)]
#[command(name = "train-model", about = "Train the PR failure-risk model")]
struct Args {
    /// Configuration file
    #[arg(long, env = "PR_RISK_CONFIG", default_value = "config/config.toml")]
    config: PathBuf,

    /// Override `training.dataset_path`
    #[arg(long)]
    dataset: Option<String>,

    /// Override `training.output_dir`
    #[arg(long)]
    output_dir: Option<String>,

    /// Override `training.imbalance` (class_weight, smote, none)
    #[arg(long, value_parser = parse_strategy)]
    imbalance: Option<ImbalanceStrategy>,

    /// Override `training.seed`
    #[arg(long)]
    seed: Option<u64>,
}

fn parse_strategy(raw: &str) -> Result<ImbalanceStrategy, String> {
    serde_json::from_value(serde_json::Value::String(raw.to_string()))
        .map_err(|_| format!("unknown imbalance strategy `{raw}`"))
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = if args.config.exists() {
        AppConfig::load_from_path(&args.config)?
    } else {
        AppConfig::default()
    };
    init_logging(&config.logging, "pr_risk_prediction")?;

    if let Some(dataset) = args.dataset {
        config.training.dataset_path = dataset;
    }
    if let Some(output_dir) = args.output_dir {
        config.training.output_dir = output_dir;
    }
    if let Some(strategy) = args.imbalance {
        config.training.imbalance = strategy;
    }
    if let Some(seed) = args.seed {
        config.training.seed = seed;
    }
    config.validate()?;

    info!(
        dataset = %config.training.dataset_path,
        output_dir = %config.training.output_dir,
        imbalance = ?config.training.imbalance,
        candidates = config.training.candidates.len(),
        "Starting training run"
    );

    let pipeline = TrainingPipeline::new(config.training.clone());
    let report = pipeline.run().context("Training run failed")?;

    for candidate in &report.candidates {
        info!(
            model = %candidate.name,
            recall = format!("{:.3}", candidate.metrics.recall),
            precision = format!("{:.3}", candidate.metrics.precision),
            accuracy = format!("{:.3}", candidate.metrics.accuracy),
            f1 = format!("{:.3}", candidate.metrics.f1),
            "Candidate result"
        );
    }
    info!(
        run_id = %report.run_id,
        model = %report.chosen_model,
        threshold = report.threshold.threshold,
        threshold_fallback = report.threshold.fallback,
        split = ?report.split_mode,
        "Training complete"
    );

    Ok(())
}
