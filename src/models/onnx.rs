//! Externally exported ONNX classifiers, scored through ONNX Runtime

use super::Classifier;
use crate::error::{ArtifactError, ScoringError};
use crate::features::FeatureMatrix;
use ort::memory::Allocator;
use ort::session::{builder::GraphOptimizationLevel, Session, SessionOutputs};
use ort::value::{DowncastableTarget, DynMapValueType, DynSequenceValueType, DynValue, Tensor};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

/// ONNX session wrapped so it can be shared across requests
pub struct OnnxClassifier {
    name: String,
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
}

impl OnnxClassifier {
    pub fn load(path: &Path, threads: usize) -> Result<Self, ArtifactError> {
        let onnx_err = |e: ort::Error| {
            ArtifactError::Invalid(format!("ONNX model {}: {e}", path.display()))
        };

        ort::init().commit().map_err(onnx_err)?;
        let session = Session::builder()
            .map_err(onnx_err)?
            .with_optimization_level(GraphOptimizationLevel::Level3)
            .map_err(onnx_err)?
            .with_intra_threads(threads)
            .map_err(onnx_err)?
            .commit_from_file(path)
            .map_err(onnx_err)?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "float_input".to_string());
        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("prob"))
            .or_else(|| session.outputs.last())
            .map(|o| o.name.clone())
            .unwrap_or_else(|| "probabilities".to_string());

        let name = path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());

        info!(
            model = %name,
            input = %input_name,
            output = %output_name,
            threads,
            "ONNX model loaded"
        );

        Ok(Self {
            name,
            session: Mutex::new(session),
            input_name,
            output_name,
        })
    }

    fn score_row(&self, row: &[f64]) -> Result<f64, ScoringError> {
        let inference = |e: ort::Error| ScoringError::Inference(format!("{}: {e}", self.name));

        let values: Vec<f32> = row.iter().map(|&v| v as f32).collect();
        let shape = vec![1_i64, values.len() as i64];
        let input = Tensor::from_array((shape, values)).map_err(inference)?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| ScoringError::Inference(format!("{}: session lock poisoned", self.name)))?;
        let outputs = session
            .run(ort::inputs![self.input_name.as_str() => input])
            .map_err(inference)?;

        self.extract_probability(&outputs)
    }

    fn extract_probability(&self, outputs: &SessionOutputs) -> Result<f64, ScoringError> {
        let output = outputs.get(self.output_name.as_str()).ok_or_else(|| {
            ScoringError::Inference(format!("{}: missing output {}", self.name, self.output_name))
        })?;

        if let Ok((shape, data)) = output.try_extract_tensor::<f32>() {
            let classes = shape.last().copied().unwrap_or(1);
            let prob = if classes >= 2 { data.get(1) } else { data.first() };
            return prob.map(|&p| p as f64).ok_or_else(|| {
                ScoringError::Inference(format!("{}: empty probability tensor", self.name))
            });
        }

        if DynSequenceValueType::can_downcast(&output.dtype()) {
            return self.extract_from_sequence_map(output);
        }

        Err(ScoringError::Inference(format!(
            "{}: unsupported output type for {}",
            self.name, self.output_name
        )))
    }

    /// Tree exporters emit `seq(map(int64, float))`; class 1 is failure
    fn extract_from_sequence_map(&self, output: &DynValue) -> Result<f64, ScoringError> {
        let inference = |e: ort::Error| ScoringError::Inference(format!("{}: {e}", self.name));
        let allocator = Allocator::default();

        let sequence = output
            .downcast_ref::<DynSequenceValueType>()
            .map_err(inference)?;
        let maps = sequence
            .try_extract_sequence::<DynMapValueType>(&allocator)
            .map_err(inference)?;
        let first = maps
            .first()
            .ok_or_else(|| ScoringError::Inference(format!("{}: empty sequence", self.name)))?;
        let pairs = first.try_extract_key_values::<i64, f32>().map_err(inference)?;

        let prob = pairs
            .iter()
            .find(|(class, _)| *class == 1)
            .map(|(_, p)| *p as f64)
            .or_else(|| {
                pairs
                    .iter()
                    .find(|(class, _)| *class == 0)
                    .map(|(_, p)| 1.0 - *p as f64)
            })
            .ok_or_else(|| {
                ScoringError::Inference(format!("{}: no class probability in map", self.name))
            })?;
        debug!(model = %self.name, prob, "Extracted from seq(map)");
        Ok(prob)
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    /// Input width is checked against the schema by the graph itself
    fn n_features(&self) -> Option<usize> {
        None
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ScoringError> {
        features.rows().map(|row| self.score_row(row)).collect()
    }
}
