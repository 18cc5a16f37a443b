//! Persisted artifacts: model, feature schema and decision threshold.
//!
//! All three are written by one training run and stamped with its run id.
//! Loading checks that they still belong together before anything is scored.

use super::{Classifier, TrainedModel};
use crate::config::ArtifactsConfig;
use crate::error::ArtifactError;
use crate::features::FeatureSchema;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

pub const MODEL_FILE: &str = "risk_model.json";
pub const SCHEMA_FILE: &str = "feature_schema.json";
pub const THRESHOLD_FILE: &str = "decision_threshold.json";
pub const REPORT_FILE: &str = "training_report.json";

/// How the model itself is stored
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "format", content = "model", rename_all = "snake_case")]
pub enum ModelPayload {
    /// Model fitted by this crate, embedded in the artifact
    Native(TrainedModel),
    /// Externally exported ONNX graph; relative paths resolve against the
    /// artifact's directory
    Onnx { path: PathBuf },
}

/// Model artifact envelope
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub run_id: Uuid,
    pub trained_at: DateTime<Utc>,
    pub model_name: String,
    /// Columns the model was fitted on, in order
    pub feature_names: Vec<String>,
    pub payload: ModelPayload,
}

/// Calibrated decision threshold with the held-out metrics at that point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdArtifact {
    pub run_id: Uuid,
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Held-out rows had no failures, so the threshold is the default
    /// rather than a calibrated one
    #[serde(default)]
    pub fallback: bool,
    pub calibrated_at: DateTime<Utc>,
}

/// A ready-to-use classifier plus the metadata it was loaded with
pub struct LoadedModel {
    pub name: String,
    pub run_id: Uuid,
    pub classifier: Box<dyn Classifier>,
}

impl fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoadedModel")
            .field("name", &self.name)
            .field("run_id", &self.run_id)
            .field("n_features", &self.classifier.n_features())
            .finish()
    }
}

/// Everything the scorer needs, verified to come from one training run
#[derive(Debug)]
pub struct ArtifactBundle {
    pub schema: FeatureSchema,
    pub model: LoadedModel,
    pub threshold: Option<ThresholdArtifact>,
}

/// Reads and writes the artifact files
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    model_path: PathBuf,
    schema_path: PathBuf,
    threshold_path: Option<PathBuf>,
}

impl ArtifactStore {
    /// Store using the standard file names inside `dir`
    pub fn in_dir<P: AsRef<Path>>(dir: P) -> Self {
        let dir = dir.as_ref();
        Self {
            model_path: dir.join(MODEL_FILE),
            schema_path: dir.join(SCHEMA_FILE),
            threshold_path: Some(dir.join(THRESHOLD_FILE)),
        }
    }

    pub fn from_config(config: &ArtifactsConfig) -> Self {
        Self {
            model_path: PathBuf::from(&config.model_path),
            schema_path: PathBuf::from(&config.schema_path),
            threshold_path: config.threshold_path.as_ref().map(PathBuf::from),
        }
    }

    pub fn model_path(&self) -> &Path {
        &self.model_path
    }

    pub fn schema_path(&self) -> &Path {
        &self.schema_path
    }

    pub fn threshold_path(&self) -> Option<&Path> {
        self.threshold_path.as_deref()
    }

    /// Training report lives next to the model artifact
    pub fn report_path(&self) -> PathBuf {
        self.model_path
            .parent()
            .map(|dir| dir.join(REPORT_FILE))
            .unwrap_or_else(|| PathBuf::from(REPORT_FILE))
    }

    pub fn save_report<T: Serialize>(&self, report: &T) -> Result<(), ArtifactError> {
        write_json(&self.report_path(), "training report", report)
    }

    pub fn save_schema(&self, schema: &FeatureSchema) -> Result<(), ArtifactError> {
        write_json(&self.schema_path, "feature schema", schema)
    }

    pub fn save_model(&self, artifact: &ModelArtifact) -> Result<(), ArtifactError> {
        write_json(&self.model_path, "model artifact", artifact)
    }

    pub fn save_threshold(&self, threshold: &ThresholdArtifact) -> Result<(), ArtifactError> {
        let path = self.threshold_path.as_ref().ok_or_else(|| {
            ArtifactError::Invalid("no threshold path configured".to_string())
        })?;
        validate_threshold(threshold.threshold)?;
        write_json(path, "decision threshold", threshold)
    }

    pub fn load_schema(&self) -> Result<FeatureSchema, ArtifactError> {
        read_json(&self.schema_path)
    }

    pub fn load_model_artifact(&self) -> Result<ModelArtifact, ArtifactError> {
        read_json(&self.model_path)
    }

    /// Threshold is optional: a missing file yields `None`, a corrupt one is an error
    pub fn load_threshold(&self) -> Result<Option<ThresholdArtifact>, ArtifactError> {
        let Some(path) = &self.threshold_path else {
            return Ok(None);
        };
        if !path.exists() {
            warn!(path = %path.display(), "Decision threshold not found, decisions unavailable");
            return Ok(None);
        }
        let threshold: ThresholdArtifact = read_json(path)?;
        validate_threshold(threshold.threshold)?;
        if threshold.fallback {
            warn!(
                threshold = threshold.threshold,
                "Decision threshold is the uncalibrated default"
            );
        }
        Ok(Some(threshold))
    }

    /// Load model, schema and threshold and verify they belong together
    pub fn load_bundle(&self) -> Result<ArtifactBundle, ArtifactError> {
        let schema = self.load_schema()?;
        let artifact = self.load_model_artifact()?;

        if artifact.run_id != schema.run_id() {
            return Err(ArtifactError::SchemaMismatch(format!(
                "model comes from run {} but schema from run {}",
                artifact.run_id,
                schema.run_id()
            )));
        }
        if artifact.feature_names.as_slice() != schema.columns() {
            return Err(ArtifactError::SchemaMismatch(format!(
                "model was fitted on {} columns that differ from the {} schema columns",
                artifact.feature_names.len(),
                schema.len()
            )));
        }

        let threshold = self.load_threshold()?;
        if let Some(threshold) = &threshold {
            if threshold.run_id != schema.run_id() {
                return Err(ArtifactError::SchemaMismatch(format!(
                    "threshold comes from run {} but schema from run {}",
                    threshold.run_id,
                    schema.run_id()
                )));
            }
        }

        let model = self.instantiate(artifact)?;
        if let Some(n_features) = model.classifier.n_features() {
            if n_features != schema.len() {
                return Err(ArtifactError::SchemaMismatch(format!(
                    "model expects {n_features} features, schema has {}",
                    schema.len()
                )));
            }
        }

        info!(
            model = %model.name,
            run_id = %model.run_id,
            features = schema.len(),
            threshold = ?threshold.as_ref().map(|t| t.threshold),
            "Artifacts loaded"
        );

        Ok(ArtifactBundle {
            schema,
            model,
            threshold,
        })
    }

    fn instantiate(&self, artifact: ModelArtifact) -> Result<LoadedModel, ArtifactError> {
        let classifier: Box<dyn Classifier> = match artifact.payload {
            ModelPayload::Native(model) => {
                model.validate().map_err(ArtifactError::Invalid)?;
                Box::new(model)
            }
            ModelPayload::Onnx { path } => self.load_onnx(&path)?,
        };

        Ok(LoadedModel {
            name: artifact.model_name,
            run_id: artifact.run_id,
            classifier,
        })
    }

    #[cfg(feature = "onnx")]
    fn load_onnx(&self, path: &Path) -> Result<Box<dyn Classifier>, ArtifactError> {
        let resolved = self.resolve(path);
        let model = super::onnx::OnnxClassifier::load(&resolved, 1)?;
        Ok(Box::new(model))
    }

    #[cfg(not(feature = "onnx"))]
    fn load_onnx(&self, path: &Path) -> Result<Box<dyn Classifier>, ArtifactError> {
        Err(ArtifactError::Unsupported(format!(
            "{} is an ONNX model but this build lacks the `onnx` feature",
            path.display()
        )))
    }

    #[cfg_attr(not(feature = "onnx"), allow(dead_code))]
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        self.model_path
            .parent()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|| path.to_path_buf())
    }
}

fn validate_threshold(threshold: f64) -> Result<(), ArtifactError> {
    if !(0.0..=1.0).contains(&threshold) {
        return Err(ArtifactError::Invalid(format!(
            "decision threshold {threshold} is outside [0, 1]"
        )));
    }
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, ArtifactError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ArtifactError::Parse {
        path: path.display().to_string(),
        source,
    })
}

fn write_json<T: Serialize>(
    path: &Path,
    what: &'static str,
    value: &T,
) -> Result<(), ArtifactError> {
    let json =
        serde_json::to_string_pretty(value).map_err(|source| ArtifactError::Serialize { what, source })?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|source| ArtifactError::Io {
            path: parent.display().to_string(),
            source,
        })?;
    }
    std::fs::write(path, json).map_err(|source| ArtifactError::Io {
        path: path.display().to_string(),
        source,
    })?;
    info!(path = %path.display(), "Wrote {}", what);
    Ok(())
}
