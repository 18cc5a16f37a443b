//! Gradient-boosted regression trees on the logistic likelihood, via `gbdt`
//!
//! `gbdt` computes in `f32`; conversions happen at this boundary.

use super::{check_training_inputs, check_width, require_both_classes, Classifier, Estimator};
use crate::error::{ScoringError, TrainingError};
use crate::features::FeatureMatrix;
use crate::types::Label;
use gbdt::config::Config;
use gbdt::decision_tree::Data;
use gbdt::gradient_boost::GBDT;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    /// Shrinkage applied to every tree
    pub learning_rate: f64,
    pub max_depth: u32,
    pub min_leaf_size: usize,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 6,
            min_leaf_size: 1,
        }
    }
}

#[derive(Serialize, Deserialize)]
pub struct BoostedModel {
    n_features: usize,
    booster: GBDT,
}

impl BoostedModel {
    /// Walk the serialised booster: every node array may only link a node
    /// to later positions in the same array, 0 marking an absent child.
    pub(crate) fn validate(&self) -> Result<(), String> {
        let booster = serde_json::to_value(&self.booster).map_err(|e| e.to_string())?;
        if let Some(trees) = booster.get("trees").and_then(Value::as_array) {
            if trees.is_empty() {
                return Err("gradient boosting model has no trees".to_string());
            }
        }
        check_node_links(&booster, self.n_features)
    }
}

fn is_tree_node(value: &Value) -> bool {
    value.get("left").is_some_and(Value::is_u64) && value.get("right").is_some_and(Value::is_u64)
}

fn check_node_links(value: &Value, n_features: usize) -> Result<(), String> {
    match value {
        Value::Array(items) => {
            let node_array = !items.is_empty() && items.iter().all(is_tree_node);
            for (position, item) in items.iter().enumerate() {
                if node_array {
                    check_node(item, position, items.len(), n_features)?;
                }
                check_node_links(item, n_features)?;
            }
            Ok(())
        }
        Value::Object(fields) => fields
            .values()
            .try_for_each(|field| check_node_links(field, n_features)),
        _ => Ok(()),
    }
}

fn check_node(node: &Value, position: usize, len: usize, n_features: usize) -> Result<(), String> {
    for side in ["left", "right"] {
        let child = node.get(side).and_then(Value::as_u64).unwrap_or(0) as usize;
        if child != 0 && (child <= position || child >= len) {
            return Err(format!(
                "tree node {position} links its {side} child to node {child}"
            ));
        }
    }
    let feature = node
        .get("value")
        .unwrap_or(node)
        .get("feature_index")
        .and_then(Value::as_u64);
    if let Some(feature) = feature {
        if feature as usize >= n_features {
            return Err(format!(
                "tree node {position} splits on feature {feature} of {n_features}"
            ));
        }
    }
    Ok(())
}

fn row_f32(row: &[f64]) -> Vec<f32> {
    row.iter().map(|v| *v as f32).collect()
}

impl fmt::Debug for BoostedModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BoostedModel")
            .field("n_features", &self.n_features)
            .finish_non_exhaustive()
    }
}

impl Classifier for BoostedModel {
    fn name(&self) -> &str {
        "gradient_boosting"
    }

    fn n_features(&self) -> Option<usize> {
        Some(self.n_features)
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ScoringError> {
        check_width(self.name(), self.n_features, features)?;
        if features.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<Data> = features
            .rows()
            .map(|row| Data::new_test_data(row_f32(row), None))
            .collect();
        Ok(self
            .booster
            .predict(&rows)
            .into_iter()
            .map(|p| f64::from(p).clamp(0.0, 1.0))
            .collect())
    }
}

impl Estimator for BoostingParams {
    type Model = BoostedModel;

    fn name(&self) -> String {
        "gradient_boosting".to_string()
    }

    /// Labels follow the `LogLikelyhood` convention: failure is 1, success -1.
    /// Sample weights become `gbdt` row weights, which scales the failure
    /// class the way `scale_pos_weight` would.
    fn fit(
        &self,
        features: &FeatureMatrix,
        labels: &[Label],
        sample_weights: &[f64],
    ) -> Result<BoostedModel, TrainingError> {
        let fail = |message: String| TrainingError::Fit {
            model: self.name(),
            message,
        };
        check_training_inputs("gradient_boosting", features, labels, sample_weights)?;
        require_both_classes("gradient_boosting", labels)?;
        if self.n_estimators == 0 || self.max_depth == 0 {
            return Err(fail("n_estimators and max_depth must be at least 1".to_string()));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(fail(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }

        let mut config = Config::new();
        config.set_feature_size(features.n_features());
        config.set_max_depth(self.max_depth);
        config.set_iterations(self.n_estimators);
        config.set_shrinkage(self.learning_rate as f32);
        config.set_loss("LogLikelyhood");
        config.set_debug(false);
        config.set_min_leaf_size(self.min_leaf_size.max(1));
        config.set_data_sample_ratio(1.0);
        config.set_feature_sample_ratio(1.0);
        config.set_training_optimization_level(2);

        let mut rows: Vec<Data> = features
            .rows()
            .zip(labels)
            .zip(sample_weights)
            .map(|((row, label), weight)| {
                let target = if label.is_failure() { 1.0 } else { -1.0 };
                Data::new_training_data(row_f32(row), *weight as f32, target, None)
            })
            .collect();

        let mut booster = GBDT::new(&config);
        booster.fit(&mut rows);

        Ok(BoostedModel {
            n_features: features.n_features(),
            booster,
        })
    }
}
