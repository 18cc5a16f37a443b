//! End-to-end offline training run

use super::dataset::{ClassCounts, Dataset};
use super::imbalance::{ImbalanceCorrector, ImbalanceStrategy};
use super::selector::{CandidateEvaluation, ModelSelector};
use super::split::{SplitMode, Splitter};
use super::threshold::{calibrate, CalibratedThreshold};
use crate::config::TrainingConfig;
use crate::error::TrainingError;
use crate::features::{FeatureEngineer, FeatureMatrix, FeatureSchema, SchemaAligner};
use crate::models::{ArtifactStore, ModelArtifact, ModelPayload, ThresholdArtifact, TrainedModel};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

/// Summary of one training run, written next to the artifacts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub rows: usize,
    pub class_counts: ClassCounts,
    pub features: Vec<String>,
    pub split_mode: SplitMode,
    pub train_rows: usize,
    pub test_rows: usize,
    pub imbalance: ImbalanceStrategy,
    pub synthetic_rows: usize,
    pub failure_weight: f64,
    pub candidates: Vec<CandidateEvaluation>,
    pub chosen_model: String,
    pub threshold: CalibratedThreshold,
}

/// Artifacts of a run, before they are written anywhere
#[derive(Debug)]
pub struct TrainingOutcome {
    pub schema: FeatureSchema,
    pub model: TrainedModel,
    pub report: TrainingReport,
}

impl TrainingOutcome {
    pub fn threshold_artifact(&self) -> ThresholdArtifact {
        let t = &self.report.threshold;
        ThresholdArtifact {
            run_id: self.report.run_id,
            threshold: t.threshold,
            precision: t.precision,
            recall: t.recall,
            f1: t.f1,
            fallback: t.fallback,
            calibrated_at: self.report.trained_at,
        }
    }

    /// Write schema, threshold, report and model, handing back the report
    pub fn persist(self, store: &ArtifactStore) -> Result<TrainingReport, TrainingError> {
        store.save_schema(&self.schema)?;
        if store.threshold_path().is_some() {
            store.save_threshold(&self.threshold_artifact())?;
        }
        store.save_report(&self.report)?;
        let artifact = ModelArtifact {
            run_id: self.report.run_id,
            trained_at: self.report.trained_at,
            model_name: self.report.chosen_model.clone(),
            feature_names: self.schema.columns().to_vec(),
            payload: ModelPayload::Native(self.model),
        };
        store.save_model(&artifact)?;
        Ok(self.report)
    }
}

pub struct TrainingPipeline {
    settings: TrainingConfig,
    engineer: FeatureEngineer,
}

impl TrainingPipeline {
    pub fn new(settings: TrainingConfig) -> Self {
        Self {
            settings,
            engineer: FeatureEngineer::new(),
        }
    }

    pub fn settings(&self) -> &TrainingConfig {
        &self.settings
    }

    /// Load the configured dataset, train, and write artifacts to `output_dir`
    pub fn run(&self) -> Result<TrainingReport, TrainingError> {
        let dataset = Dataset::from_path(&self.settings.dataset_path)?;
        let store = ArtifactStore::in_dir(Path::new(&self.settings.output_dir));
        let report = self.train(&dataset)?.persist(&store)?;
        info!(
            output_dir = %self.settings.output_dir,
            run_id = %report.run_id,
            "Training artifacts written"
        );
        Ok(report)
    }

    /// Train in memory: engineer, fix schema, align, split, rebalance,
    /// select, calibrate
    pub fn train(&self, dataset: &Dataset) -> Result<TrainingOutcome, TrainingError> {
        let run_id = Uuid::new_v4();
        let trained_at = Utc::now();
        let counts = dataset.class_counts();
        info!(
            %run_id,
            rows = dataset.len(),
            success = counts.success,
            failure = counts.failure,
            "Training run started"
        );

        let columns = self.engineer.schema_columns(dataset.source(), dataset.records());
        let schema = FeatureSchema::new(run_id, columns)?;
        info!(features = schema.len(), columns = ?schema.columns(), "Feature schema fixed");

        let engineered = self.engineer.engineer_batch(dataset.records());
        let aligner = SchemaAligner::new(&schema);
        let features = FeatureMatrix::from_vectors(&schema, aligner.align_batch(&engineered));

        let split = Splitter::new(self.settings.test_size, self.settings.seed)
            .split(&features, dataset.labels())?;
        let split_mode = split.mode;
        let train_rows = split.train.labels.len();
        let held_out = split.test;

        let corrector = ImbalanceCorrector::new(
            self.settings.imbalance,
            self.settings.smote_k,
            self.settings.seed,
        );
        let training = corrector.rebalance(split.train);

        let selection =
            ModelSelector::new(self.settings.candidates.clone()).select(&training, &held_out)?;
        let threshold = calibrate(&selection.held_out_probabilities, held_out.labels());

        let report = TrainingReport {
            run_id,
            trained_at,
            rows: dataset.len(),
            class_counts: counts,
            features: schema.columns().to_vec(),
            split_mode,
            train_rows,
            test_rows: held_out.len(),
            imbalance: self.settings.imbalance,
            synthetic_rows: training.synthetic_rows,
            failure_weight: training.weights.failure,
            candidates: selection.evaluations,
            chosen_model: selection.chosen,
            threshold,
        };
        info!(
            %run_id,
            model = %report.chosen_model,
            threshold = report.threshold.threshold,
            "Training run finished"
        );

        Ok(TrainingOutcome {
            schema,
            model: selection.model,
            report,
        })
    }
}
