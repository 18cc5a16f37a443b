//! Immutable runtime state shared by every scoring request

use crate::error::ScoringError;
use crate::features::{FeatureEngineer, FeatureMatrix, FeatureSchema, SchemaAligner};
use crate::models::{ArtifactBundle, Classifier};
use crate::types::RawRecord;
use tracing::debug;
use uuid::Uuid;

/// Model, schema and optional threshold from one training run.
///
/// Built once at startup and never mutated, so it can be shared through an
/// `Arc` without locking.
pub struct ScoringContext {
    model_name: String,
    classifier: Box<dyn Classifier>,
    schema: FeatureSchema,
    threshold: Option<f64>,
    engineer: FeatureEngineer,
}

impl ScoringContext {
    pub fn new(
        schema: FeatureSchema,
        classifier: Box<dyn Classifier>,
        threshold: Option<f64>,
    ) -> Result<Self, ScoringError> {
        let engineer = FeatureEngineer::new();

        if let Some(n_features) = classifier.n_features() {
            if n_features != schema.len() {
                return Err(ScoringError::SchemaMismatch(format!(
                    "{} expects {n_features} features, schema has {}",
                    classifier.name(),
                    schema.len()
                )));
            }
        }
        if let Some(t) = threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(ScoringError::SchemaMismatch(format!(
                    "decision threshold {t} is outside [0, 1]"
                )));
            }
        }
        if !schema.columns().iter().any(|c| engineer.produces(c)) {
            return Err(ScoringError::SchemaMismatch(
                "schema shares no column with the engineered features".to_string(),
            ));
        }

        Ok(Self {
            model_name: classifier.name().to_string(),
            classifier,
            schema,
            threshold,
            engineer,
        })
    }

    pub fn from_bundle(bundle: ArtifactBundle) -> Result<Self, ScoringError> {
        let mut context = Self::new(
            bundle.schema,
            bundle.model.classifier,
            bundle.threshold.map(|t| t.threshold),
        )?;
        context.model_name = bundle.model.name;
        Ok(context)
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn run_id(&self) -> Uuid {
        self.schema.run_id()
    }

    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn threshold(&self) -> Option<f64> {
        self.threshold
    }

    /// Raw failure probability: engineer, align, predict
    pub fn probability(&self, record: &RawRecord) -> Result<f64, ScoringError> {
        let engineered = self.engineer.engineer(record);
        let (vector, report) = SchemaAligner::new(&self.schema).align_with_report(&engineered);
        if !report.dropped.is_empty() {
            debug!(dropped = ?report.dropped, "Ignoring columns unknown to the schema");
        }

        let mut batch = FeatureMatrix::new(self.schema.len());
        batch.push(vector);
        let probability = self
            .classifier
            .predict_proba(&batch)?
            .first()
            .copied()
            .ok_or_else(|| {
                ScoringError::Inference(format!("{} returned no probability", self.model_name))
            })?;

        if !probability.is_finite() {
            return Err(ScoringError::Inference(format!(
                "{} returned a non-finite probability",
                self.model_name
            )));
        }
        Ok(probability)
    }
}

impl std::fmt::Debug for ScoringContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringContext")
            .field("model", &self.model_name)
            .field("run_id", &self.schema.run_id())
            .field("features", &self.schema.len())
            .field("threshold", &self.threshold)
            .finish()
    }
}
