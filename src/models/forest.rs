//! Random forest: bagged `linfa-trees` CART trees on random column subsets

use super::{
    check_training_inputs, check_width, failure_flags, to_array, Classifier, Estimator,
};
use crate::error::{ScoringError, TrainingError};
use crate::features::FeatureMatrix;
use crate::types::Label;
use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    /// Minimum total sample weight a node needs before it may split
    pub min_weight_split: f32,
    pub min_weight_leaf: f32,
    /// Draw a weighted bootstrap sample per tree; otherwise every tree sees
    /// all rows with their sample weights
    pub bootstrap: bool,
    /// Share of columns each tree is fitted on; `None` means √d columns
    pub feature_fraction: Option<f64>,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 100,
            max_depth: 12,
            min_weight_split: 2.0,
            min_weight_leaf: 1.0,
            bootstrap: true,
            feature_fraction: None,
            seed: 42,
        }
    }
}

impl ForestParams {
    fn subspace_width(&self, n_features: usize) -> usize {
        let width = match self.feature_fraction {
            Some(fraction) => (n_features as f64 * fraction).round(),
            None => (n_features as f64).sqrt().round(),
        };
        (width as usize).clamp(1, n_features)
    }
}

/// One bagged tree and the columns, in ascending order, it was fitted on
#[derive(Serialize, Deserialize)]
struct ForestMember {
    columns: Vec<usize>,
    tree: DecisionTree<f64, bool>,
}

impl ForestMember {
    fn project(&self, records: &Array2<f64>) -> Array2<f64> {
        Array2::from_shape_fn((records.nrows(), self.columns.len()), |(r, c)| {
            records[[r, self.columns[c]]]
        })
    }
}

/// Fitted forest; the failure probability is the share of trees voting failure
#[derive(Serialize, Deserialize)]
pub struct ForestModel {
    n_features: usize,
    members: Vec<ForestMember>,
}

impl ForestModel {
    pub fn tree_count(&self) -> usize {
        self.members.len()
    }

    pub(crate) fn validate(&self) -> Result<(), String> {
        if self.members.is_empty() {
            return Err("random forest has no trees".to_string());
        }
        for (i, member) in self.members.iter().enumerate() {
            if member.columns.is_empty() {
                return Err(format!("tree {i} reads no columns"));
            }
            if member.columns.windows(2).any(|pair| pair[0] >= pair[1]) {
                return Err(format!("tree {i} columns are not strictly increasing"));
            }
            if let Some(column) = member.columns.iter().find(|c| **c >= self.n_features) {
                return Err(format!(
                    "tree {i} reads column {column} but the model has {} features",
                    self.n_features
                ));
            }
            if let Some(split) = member
                .tree
                .features()
                .into_iter()
                .find(|f| *f >= member.columns.len())
            {
                return Err(format!(
                    "tree {i} splits on column {split} of {}",
                    member.columns.len()
                ));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for ForestModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForestModel")
            .field("n_features", &self.n_features)
            .field("trees", &self.members.len())
            .finish()
    }
}

impl Classifier for ForestModel {
    fn name(&self) -> &str {
        "random_forest"
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.n_features)
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ScoringError> {
        check_width(self.name(), self.n_features, features)?;
        if self.members.is_empty() {
            return Err(ScoringError::Inference("forest has no trees".to_string()));
        }
        let records = to_array(features);
        let mut votes = vec![0usize; features.n_rows()];
        for member in &self.members {
            let predicted: Array1<bool> = member.tree.predict(&member.project(&records));
            for (count, failure) in votes.iter_mut().zip(predicted.iter()) {
                if *failure {
                    *count += 1;
                }
            }
        }
        let n_trees = self.members.len() as f64;
        Ok(votes.into_iter().map(|v| v as f64 / n_trees).collect())
    }
}

impl Estimator for ForestParams {
    type Model = ForestModel;

    fn name(&self) -> String {
        "random_forest".to_string()
    }

    fn fit(
        &self,
        features: &FeatureMatrix,
        labels: &[Label],
        sample_weights: &[f64],
    ) -> Result<ForestModel, TrainingError> {
        let fail = |message: String| TrainingError::Fit {
            model: self.name(),
            message,
        };
        check_training_inputs("random_forest", features, labels, sample_weights)?;
        if self.n_trees == 0 {
            return Err(fail("n_trees must be at least 1".to_string()));
        }

        let n_rows = features.n_rows();
        let n_features = features.n_features();
        let width = self.subspace_width(n_features);
        let records = to_array(features);
        let sampler = WeightedIndex::new(sample_weights).map_err(|e| fail(e.to_string()))?;
        let params = DecisionTree::params()
            .split_quality(SplitQuality::Gini)
            .max_depth(Some(self.max_depth))
            .min_weight_split(self.min_weight_split)
            .min_weight_leaf(self.min_weight_leaf);

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut members = Vec::with_capacity(self.n_trees);
        for _ in 0..self.n_trees {
            let mut columns = index::sample(&mut rng, n_features, width).into_vec();
            columns.sort_unstable();

            let dataset = if self.bootstrap {
                let rows: Vec<usize> = (0..n_rows).map(|_| sampler.sample(&mut rng)).collect();
                let sample = Array2::from_shape_fn((n_rows, width), |(r, c)| {
                    records[[rows[r], columns[c]]]
                });
                let targets: Array1<bool> =
                    rows.iter().map(|&r| labels[r].is_failure()).collect();
                Dataset::new(sample, targets)
            } else {
                let sample =
                    Array2::from_shape_fn((n_rows, width), |(r, c)| records[[r, columns[c]]]);
                let weights: Array1<f32> = sample_weights.iter().map(|w| *w as f32).collect();
                Dataset::new(sample, failure_flags(labels)).with_weights(weights)
            };

            let tree = params.fit(&dataset).map_err(|e| fail(e.to_string()))?;
            members.push(ForestMember { columns, tree });
        }

        Ok(ForestModel {
            n_features,
            members,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> (FeatureMatrix, Vec<Label>) {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..40 {
            let size = (i * 50) as f64;
            rows.push(vec![size, (i % 7) as f64]);
            labels.push(if i >= 30 { Label::Failure } else { Label::Success });
        }
        (FeatureMatrix::from_rows(rows).unwrap(), labels)
    }

    fn small_forest() -> ForestParams {
        ForestParams {
            n_trees: 15,
            max_depth: 4,
            feature_fraction: Some(1.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_forest_learns_threshold() {
        let (features, labels) = dataset();
        let model = small_forest().fit(&features, &labels, &[1.0; 40]).unwrap();

        let queries = FeatureMatrix::from_rows(vec![vec![100.0, 1.0], vec![1900.0, 1.0]]).unwrap();
        let probs = model.predict_proba(&queries).unwrap();
        assert!(probs[0] < 0.5);
        assert!(probs[1] > 0.5);
        assert!(probs.iter().all(|p| (0.0..=1.0).contains(p)));
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_forest_is_deterministic_for_seed() {
        let (features, labels) = dataset();
        let a = small_forest().fit(&features, &labels, &[1.0; 40]).unwrap();
        let b = small_forest().fit(&features, &labels, &[1.0; 40]).unwrap();
        assert_eq!(
            a.predict_proba(&features).unwrap(),
            b.predict_proba(&features).unwrap()
        );
        assert_eq!(a.tree_count(), 15);
    }

    #[test]
    fn test_unweighted_fit_without_bootstrap() {
        let (features, labels) = dataset();
        let params = ForestParams {
            bootstrap: false,
            ..small_forest()
        };
        let model = params.fit(&features, &labels, &[1.0; 40]).unwrap();
        let probs = model.predict_proba(&features).unwrap();
        assert!(probs[39] > probs[0]);
    }

    #[test]
    fn test_subspace_width() {
        let params = ForestParams::default();
        assert_eq!(params.subspace_width(9), 3);
        assert_eq!(params.subspace_width(1), 1);
        let half = ForestParams {
            feature_fraction: Some(0.5),
            ..Default::default()
        };
        assert_eq!(half.subspace_width(7), 4);
        let none = ForestParams {
            feature_fraction: Some(0.0),
            ..Default::default()
        };
        assert_eq!(none.subspace_width(7), 1);
    }

    #[test]
    fn test_zero_trees_rejected() {
        let (features, labels) = dataset();
        let params = ForestParams {
            n_trees: 0,
            ..Default::default()
        };
        assert!(params.fit(&features, &labels, &[1.0; 40]).is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_columns() {
        let (features, labels) = dataset();
        let model = small_forest().fit(&features, &labels, &[1.0; 40]).unwrap();
        let mut json = serde_json::to_value(&model).unwrap();
        json["members"][0]["columns"] = serde_json::json!([0, 2]);
        let tampered: ForestModel = serde_json::from_value(json).unwrap();

        let err = tampered.validate().unwrap_err();
        assert!(err.contains("column 2"), "{err}");
    }

    #[test]
    fn test_validate_rejects_empty_forest() {
        let (features, labels) = dataset();
        let model = small_forest().fit(&features, &labels, &[1.0; 40]).unwrap();
        let mut json = serde_json::to_value(&model).unwrap();
        json["members"] = serde_json::json!([]);
        let tampered: ForestModel = serde_json::from_value(json).unwrap();

        assert!(tampered.validate().is_err());
    }
}
