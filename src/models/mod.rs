//! Binary classifiers behind a single probability interface

pub mod boosting;
pub mod candidate;
pub mod forest;
pub mod loader;
pub mod logistic;
#[cfg(feature = "onnx")]
pub mod onnx;

use crate::error::{ScoringError, TrainingError};
use crate::features::FeatureMatrix;
use crate::types::Label;
use ndarray::Array2;

pub use boosting::{BoostedModel, BoostingParams};
pub use candidate::{CandidateConfig, TrainedModel};
pub use forest::{ForestModel, ForestParams};
pub use loader::{
    ArtifactBundle, ArtifactStore, LoadedModel, ModelArtifact, ModelPayload, ThresholdArtifact,
};
pub use logistic::{LogisticModel, LogisticParams};

/// Anything that maps a feature matrix to per-row failure probabilities.
///
/// Implementations must be shareable across scoring requests without locking.
pub trait Classifier: Send + Sync {
    /// Human-readable model name
    fn name(&self) -> &str;

    /// Number of input columns the model was fitted on, when known
    fn n_features(&self) -> Option<usize>;

    /// Probability of the failure class for each row
    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ScoringError>;
}

/// A classifier configuration that can be fitted on a training partition
pub trait Estimator {
    type Model: Classifier;

    /// Name reported in training summaries
    fn name(&self) -> String;

    /// Fit on rows with per-row sample weights
    fn fit(
        &self,
        features: &FeatureMatrix,
        labels: &[Label],
        sample_weights: &[f64],
    ) -> Result<Self::Model, TrainingError>;
}

/// Row-major copy of a feature matrix for the `ndarray` based learners
pub(crate) fn to_array(features: &FeatureMatrix) -> Array2<f64> {
    Array2::from_shape_fn((features.n_rows(), features.n_features()), |(i, j)| {
        features.row(i)[j]
    })
}

/// Failure is the positive class for every learner
pub(crate) fn failure_flags(labels: &[Label]) -> ndarray::Array1<bool> {
    labels.iter().map(|label| label.is_failure()).collect()
}

/// Reject a batch whose width differs from the fitted width
pub(crate) fn check_width(
    model: &str,
    expected: usize,
    features: &FeatureMatrix,
) -> Result<(), ScoringError> {
    if features.n_features() != expected {
        return Err(ScoringError::SchemaMismatch(format!(
            "{model} expects {expected} features, got {}",
            features.n_features()
        )));
    }
    Ok(())
}

/// Shared precondition for every estimator
pub(crate) fn check_training_inputs(
    model: &str,
    features: &FeatureMatrix,
    labels: &[Label],
    sample_weights: &[f64],
) -> Result<(), TrainingError> {
    let fail = |message: String| TrainingError::Fit {
        model: model.to_string(),
        message,
    };
    if features.is_empty() {
        return Err(fail("training partition is empty".to_string()));
    }
    if features.n_rows() != labels.len() || labels.len() != sample_weights.len() {
        return Err(fail(format!(
            "row count mismatch: {} rows, {} labels, {} weights",
            features.n_rows(),
            labels.len(),
            sample_weights.len()
        )));
    }
    if sample_weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(fail("sample weights must be finite and non-negative".to_string()));
    }
    if sample_weights.iter().all(|w| *w == 0.0) {
        return Err(fail("total sample weight is zero".to_string()));
    }
    Ok(())
}

/// Reject training partitions holding a single class
pub(crate) fn require_both_classes(model: &str, labels: &[Label]) -> Result<(), TrainingError> {
    let failures = labels.iter().filter(|l| l.is_failure()).count();
    if failures == 0 || failures == labels.len() {
        return Err(TrainingError::Fit {
            model: model.to_string(),
            message: "training partition holds a single class".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_array_keeps_row_order() {
        let features = FeatureMatrix::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        let array = to_array(&features);
        assert_eq!(array.dim(), (2, 2));
        assert_eq!(array[[1, 0]], 3.0);
        assert_eq!(array[[0, 1]], 2.0);
    }

    #[test]
    fn test_require_both_classes() {
        assert!(require_both_classes("m", &[Label::Success, Label::Failure]).is_ok());
        assert!(require_both_classes("m", &[Label::Success, Label::Success]).is_err());
    }

    #[test]
    fn test_check_training_inputs() {
        let features = FeatureMatrix::from_rows(vec![vec![1.0], vec![2.0]]).unwrap();
        let labels = [Label::Success, Label::Failure];

        assert!(check_training_inputs("m", &features, &labels, &[1.0, 1.0]).is_ok());
        assert!(check_training_inputs("m", &features, &labels, &[1.0]).is_err());
        assert!(check_training_inputs("m", &features, &labels, &[1.0, -1.0]).is_err());
        assert!(check_training_inputs("m", &features, &labels, &[0.0, 0.0]).is_err());
        assert!(check_training_inputs("m", &FeatureMatrix::new(1), &[], &[]).is_err());
    }
}
