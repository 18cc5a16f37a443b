//! L2-regularised logistic regression on standardised inputs, fitted with
//! `linfa-logistic`

use super::{
    check_training_inputs, check_width, require_both_classes, to_array, Classifier, Estimator,
};
use crate::error::{ScoringError, TrainingError};
use crate::features::FeatureMatrix;
use crate::types::Label;
use linfa::prelude::*;
use linfa_logistic::{FittedLogisticRegression, LogisticRegression};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Hyper-parameters for logistic regression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticParams {
    /// Inverse regularisation strength
    pub c: f64,
    pub max_iter: u64,
    /// Stop once the gradient norm falls below this
    pub tolerance: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tolerance: 1e-4,
        }
    }
}

/// Fitted logistic regression plus the standardisation it was fitted under
#[derive(Serialize, Deserialize)]
pub struct LogisticModel {
    means: Vec<f64>,
    scales: Vec<f64>,
    /// Whether linfa's positive class is the failure class
    failure_is_positive: bool,
    regression: FittedLogisticRegression<f64, bool>,
}

impl LogisticModel {
    fn standardise(&self, records: Array2<f64>) -> Array2<f64> {
        let means = ArrayView1::from(self.means.as_slice());
        let scales = ArrayView1::from(self.scales.as_slice());
        (records - &means) / &scales
    }

    /// Coefficients in standardised units
    pub fn coefficients(&self) -> &[f64] {
        self.regression.params().as_slice().unwrap_or(&[])
    }

    pub fn intercept(&self) -> f64 {
        self.regression.intercept()
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        let width = self.regression.params().len();
        if width == 0 {
            return Err("logistic regression has no coefficients".to_string());
        }
        if self.means.len() != width || self.scales.len() != width {
            return Err(format!(
                "logistic regression has {width} coefficients but {} means and {} scales",
                self.means.len(),
                self.scales.len()
            ));
        }
        if self.scales.iter().any(|s| !s.is_finite() || *s <= 0.0) {
            return Err("logistic regression scales must be finite and positive".to_string());
        }
        let finite = self
            .means
            .iter()
            .chain(self.regression.params().iter())
            .all(|v| v.is_finite())
            && self.regression.intercept().is_finite();
        if !finite {
            return Err("logistic regression holds non-finite parameters".to_string());
        }
        Ok(())
    }
}

impl fmt::Debug for LogisticModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogisticModel")
            .field("n_features", &self.means.len())
            .field("intercept", &self.regression.intercept())
            .finish_non_exhaustive()
    }
}

impl Classifier for LogisticModel {
    fn name(&self) -> &str {
        "logistic_regression"
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.regression.params().len())
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ScoringError> {
        check_width(self.name(), self.regression.params().len(), features)?;
        let records = self.standardise(to_array(features));
        let positive = self.regression.predict_probabilities(&records);
        Ok(positive
            .iter()
            .map(|p| if self.failure_is_positive { *p } else { 1.0 - p })
            .collect())
    }
}

impl Estimator for LogisticParams {
    type Model = LogisticModel;

    fn name(&self) -> String {
        "logistic_regression".to_string()
    }

    /// `linfa-logistic` fits unweighted rows, so sample weights are realised
    /// as row multiplicities relative to the smallest positive weight.
    fn fit(
        &self,
        features: &FeatureMatrix,
        labels: &[Label],
        sample_weights: &[f64],
    ) -> Result<LogisticModel, TrainingError> {
        let fail = |message: String| TrainingError::Fit {
            model: self.name(),
            message,
        };
        check_training_inputs("logistic_regression", features, labels, sample_weights)?;
        require_both_classes("logistic_regression", labels)?;
        if !(self.c > 0.0 && self.c.is_finite()) {
            return Err(fail(format!("C must be positive, got {}", self.c)));
        }

        let rows: Vec<usize> = replication(sample_weights)
            .into_iter()
            .enumerate()
            .flat_map(|(row, copies)| std::iter::repeat(row).take(copies))
            .collect();
        let records = Array2::from_shape_fn((rows.len(), features.n_features()), |(r, j)| {
            features.row(rows[r])[j]
        });
        let targets: Array1<bool> = rows.iter().map(|&r| labels[r].is_failure()).collect();

        let means = records
            .mean_axis(Axis(0))
            .ok_or_else(|| fail("no rows left after weighting".to_string()))?;
        let scales = records
            .std_axis(Axis(0), 0.0)
            .mapv(|std| if std > 1e-12 { std } else { 1.0 });
        let standardised = (&records - &means) / &scales;

        let dataset = Dataset::new(standardised, targets);
        let regression = LogisticRegression::default()
            .alpha(1.0 / self.c)
            .max_iterations(self.max_iter)
            .gradient_tolerance(self.tolerance)
            .fit(&dataset)
            .map_err(|e| fail(e.to_string()))?;

        // linfa reports the probability of whichever class it treats as
        // positive; read the orientation off its most confident prediction
        let probabilities = regression.predict_probabilities(dataset.records());
        let predicted: Array1<bool> = regression.predict(dataset.records());
        let failure_is_positive = probabilities
            .iter()
            .zip(predicted.iter())
            .max_by(|a, b| (a.0 - 0.5).abs().total_cmp(&(b.0 - 0.5).abs()))
            .map(|(p, failure)| *failure == (*p >= 0.5))
            .unwrap_or(true);

        Ok(LogisticModel {
            means: means.to_vec(),
            scales: scales.to_vec(),
            failure_is_positive,
            regression,
        })
    }
}

/// Copies of each row; zero-weight rows are dropped
fn replication(sample_weights: &[f64]) -> Vec<usize> {
    let unit = sample_weights
        .iter()
        .copied()
        .filter(|w| *w > 0.0)
        .fold(f64::INFINITY, f64::min);
    sample_weights
        .iter()
        .map(|w| {
            if *w > 0.0 {
                (w / unit).round().max(1.0) as usize
            } else {
                0
            }
        })
        .collect()
}
