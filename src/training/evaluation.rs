//! Held-out evaluation metrics for the failure class

use crate::types::Label;
use serde::{Deserialize, Serialize};

/// Confusion matrix with failure as the positive class
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub tp: usize,
    pub tn: usize,
    pub fp: usize,
    pub r#fn: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(predictions: &[bool], truth: &[Label]) -> Self {
        let mut matrix = Self::default();
        for (&pred, label) in predictions.iter().zip(truth) {
            match (pred, label.is_failure()) {
                (true, true) => matrix.tp += 1,
                (false, false) => matrix.tn += 1,
                (true, false) => matrix.fp += 1,
                (false, true) => matrix.r#fn += 1,
            }
        }
        matrix
    }

    /// Predict failure where `probability >= threshold`
    pub fn at_threshold(probabilities: &[f64], truth: &[Label], threshold: f64) -> Self {
        let predictions: Vec<bool> = probabilities.iter().map(|&p| p >= threshold).collect();
        Self::from_predictions(&predictions, truth)
    }

    pub fn total(&self) -> usize {
        self.tp + self.tn + self.fp + self.r#fn
    }

    pub fn accuracy(&self) -> f64 {
        ratio(self.tp + self.tn, self.total())
    }

    pub fn precision(&self) -> f64 {
        ratio(self.tp, self.tp + self.fp)
    }

    /// Minority-class recall; 0 when the held-out set has no failures
    pub fn recall(&self) -> f64 {
        ratio(self.tp, self.tp + self.r#fn)
    }

    pub fn f1_score(&self) -> f64 {
        let precision = self.precision();
        let recall = self.recall();
        if precision + recall == 0.0 {
            return 0.0;
        }
        2.0 * precision * recall / (precision + recall)
    }
}

fn ratio(num: usize, denom: usize) -> f64 {
    if denom == 0 {
        0.0
    } else {
        num as f64 / denom as f64
    }
}

/// Metrics summary serialised into the training report
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub recall: f64,
    pub precision: f64,
    pub accuracy: f64,
    pub f1: f64,
    pub confusion: ConfusionMatrix,
}

impl From<ConfusionMatrix> for EvaluationMetrics {
    fn from(confusion: ConfusionMatrix) -> Self {
        Self {
            recall: confusion.recall(),
            precision: confusion.precision(),
            accuracy: confusion.accuracy(),
            f1: confusion.f1_score(),
            confusion,
        }
    }
}
