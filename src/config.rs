//! Configuration management for the PR risk scorer and its training run

use crate::models::CandidateConfig;
use crate::training::ImbalanceStrategy;
use anyhow::{bail, Context, Result};
use config::{Config, File};
use serde::Deserialize;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";

/// What a scoring reply carries
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ScoringMode {
    /// `risk_score` only
    #[default]
    Probability,
    /// `risk_score` plus `decision` against the calibrated threshold
    Decision,
}

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub nats: NatsConfig,
    pub artifacts: ArtifactsConfig,
    pub scoring: ScoringConfig,
    pub training: TrainingConfig,
    pub pipeline: PipelineConfig,
    pub logging: LoggingConfig,
}

/// NATS connection configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub url: String,
    /// Subject scoring requests arrive on
    pub request_subject: String,
    /// Queue group shared by service replicas
    pub queue_group: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            request_subject: "pr.risk.score".to_string(),
            queue_group: "pr-risk-scorers".to_string(),
        }
    }
}

/// Locations of the persisted training artifacts
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactsConfig {
    pub model_path: String,
    pub schema_path: String,
    /// Optional; without it decision mode is unavailable
    pub threshold_path: Option<String>,
}

impl Default for ArtifactsConfig {
    fn default() -> Self {
        Self {
            model_path: "artifacts/risk_model.json".to_string(),
            schema_path: "artifacts/feature_schema.json".to_string(),
            threshold_path: Some("artifacts/decision_threshold.json".to_string()),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ScoringConfig {
    pub mode: ScoringMode,
    /// Demo-only uniform noise amplitude added to scores (0 disables).
    /// Ignored whenever a decision threshold is loaded.
    pub demo_jitter: f64,
}

/// Offline training run settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub dataset_path: String,
    /// Directory the artifacts and report are written to
    pub output_dir: String,
    /// Held-out fraction
    pub test_size: f64,
    pub seed: u64,
    pub imbalance: ImbalanceStrategy,
    /// Neighbours considered when synthesising minority rows
    pub smote_k: usize,
    /// Models compared, in tie-break order
    pub candidates: Vec<CandidateConfig>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            dataset_path: "data/pr_data.csv".to_string(),
            output_dir: "artifacts".to_string(),
            test_size: 0.2,
            seed: 42,
            imbalance: ImbalanceStrategy::ClassWeight,
            smote_k: 5,
            candidates: CandidateConfig::defaults(),
        }
    }
}

/// Pipeline configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum requests scored concurrently
    pub workers: usize,
    /// Seconds between metrics summaries
    pub metrics_interval_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            metrics_interval_secs: 30,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (json, pretty)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "json".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path
    pub fn load() -> Result<Self> {
        Self::load_from_path(DEFAULT_CONFIG_PATH)
    }

    /// Load configuration from a specific path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let config = Config::builder()
            .add_source(File::from(path.as_ref()))
            .build()
            .context("Failed to build configuration")?;

        let config: Self = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let test_size = self.training.test_size;
        if !(test_size > 0.0 && test_size < 1.0) {
            bail!("training.test_size must be in (0, 1), got {test_size}");
        }
        if self.training.candidates.is_empty() {
            bail!("training.candidates must list at least one model");
        }
        if self.pipeline.workers == 0 {
            bail!("pipeline.workers must be at least 1");
        }
        if !(self.scoring.demo_jitter >= 0.0 && self.scoring.demo_jitter <= 1.0) {
            bail!(
                "scoring.demo_jitter must be in [0, 1], got {}",
                self.scoring.demo_jitter
            );
        }
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            bail!(
                "logging.format must be `json` or `pretty`, got `{}`",
                self.logging.format
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.nats.url, "nats://localhost:4222");
        assert_eq!(config.scoring.mode, ScoringMode::Probability);
        assert_eq!(config.scoring.demo_jitter, 0.0);
        assert_eq!(config.training.test_size, 0.2);
        assert_eq!(config.training.seed, 42);
        assert_eq!(config.training.candidates.len(), 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_toml() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[scoring]
mode = "decision"

[training]
imbalance = "smote"
test_size = 0.25

[[training.candidates]]
kind = "random_forest"
n_trees = 10

[pipeline]
workers = 2
"#
        )
        .unwrap();

        let config = AppConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.scoring.mode, ScoringMode::Decision);
        assert_eq!(config.training.imbalance, ImbalanceStrategy::Smote);
        assert_eq!(config.training.test_size, 0.25);
        assert_eq!(config.training.candidates.len(), 1);
        assert_eq!(config.pipeline.workers, 2);
        assert_eq!(config.nats.request_subject, "pr.risk.score");
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = AppConfig::default();
        config.training.test_size = 1.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.pipeline.workers = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.logging.format = "xml".to_string();
        assert!(config.validate().is_err());
    }
}
