//! Candidate classifier configurations and their fitted, persistable forms

use super::{
    BoostedModel, BoostingParams, Classifier, Estimator, ForestModel, ForestParams, LogisticModel,
    LogisticParams,
};
use crate::error::{ScoringError, TrainingError};
use crate::features::FeatureMatrix;
use crate::types::Label;
use serde::{Deserialize, Serialize};

/// One entry of the model comparison, as read from configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateConfig {
    LogisticRegression(LogisticParams),
    RandomForest(ForestParams),
    GradientBoosting(BoostingParams),
}

impl CandidateConfig {
    /// Logistic regression, random forest and gradient boosting, in that order
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::LogisticRegression(LogisticParams::default()),
            Self::RandomForest(ForestParams::default()),
            Self::GradientBoosting(BoostingParams::default()),
        ]
    }
}

impl Estimator for CandidateConfig {
    type Model = TrainedModel;

    fn name(&self) -> String {
        match self {
            Self::LogisticRegression(params) => params.name(),
            Self::RandomForest(params) => params.name(),
            Self::GradientBoosting(params) => params.name(),
        }
    }

    fn fit(
        &self,
        features: &FeatureMatrix,
        labels: &[Label],
        sample_weights: &[f64],
    ) -> Result<TrainedModel, TrainingError> {
        Ok(match self {
            Self::LogisticRegression(params) => {
                TrainedModel::LogisticRegression(params.fit(features, labels, sample_weights)?)
            }
            Self::RandomForest(params) => {
                TrainedModel::RandomForest(params.fit(features, labels, sample_weights)?)
            }
            Self::GradientBoosting(params) => {
                TrainedModel::GradientBoosting(params.fit(features, labels, sample_weights)?)
            }
        })
    }
}

/// A fitted native model, serialisable into the model artifact
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TrainedModel {
    LogisticRegression(LogisticModel),
    RandomForest(ForestModel),
    GradientBoosting(BoostedModel),
}

impl TrainedModel {
    /// Structural checks for a model read back from disk
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::LogisticRegression(model) => model.validate(),
            Self::RandomForest(model) => model.validate(),
            Self::GradientBoosting(model) => model.validate(),
        }
    }

    fn inner(&self) -> &dyn Classifier {
        match self {
            Self::LogisticRegression(model) => model,
            Self::RandomForest(model) => model,
            Self::GradientBoosting(model) => model,
        }
    }
}

impl Classifier for TrainedModel {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn n_features(&self) -> Option<usize> {
        self.inner().n_features()
    }

    fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ScoringError> {
        self.inner().predict_proba(features)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_names() {
        let names: Vec<String> = CandidateConfig::defaults().iter().map(|c| c.name()).collect();
        assert_eq!(
            names,
            vec!["logistic_regression", "random_forest", "gradient_boosting"]
        );
    }

    #[test]
    fn test_candidate_config_deserializes_with_defaults() {
        let json = r#"[
            {"kind": "logistic_regression", "c": 0.5},
            {"kind": "random_forest", "n_trees": 10},
            {"kind": "gradient_boosting"}
        ]"#;
        let candidates: Vec<CandidateConfig> = serde_json::from_str(json).unwrap();

        match &candidates[0] {
            CandidateConfig::LogisticRegression(p) => {
                assert_eq!(p.c, 0.5);
                assert_eq!(p.max_iter, LogisticParams::default().max_iter);
            }
            other => panic!("unexpected candidate {other:?}"),
        }
        match &candidates[1] {
            CandidateConfig::RandomForest(p) => assert_eq!(p.n_trees, 10),
            other => panic!("unexpected candidate {other:?}"),
        }
        assert_eq!(
            candidates[2],
            CandidateConfig::GradientBoosting(BoostingParams::default())
        );
    }

    #[test]
    fn test_trained_models_round_trip() {
        let features = FeatureMatrix::from_rows(vec![
            vec![1.0, 0.0],
            vec![2.0, 1.0],
            vec![3.0, 0.0],
            vec![8.0, 0.0],
            vec![9.0, 1.0],
            vec![10.0, 1.0],
        ])
        .unwrap();
        let labels = [
            Label::Success,
            Label::Success,
            Label::Success,
            Label::Failure,
            Label::Failure,
            Label::Failure,
        ];
        let candidates = [
            CandidateConfig::LogisticRegression(LogisticParams::default()),
            CandidateConfig::RandomForest(ForestParams {
                n_trees: 5,
                ..Default::default()
            }),
            CandidateConfig::GradientBoosting(BoostingParams {
                n_estimators: 5,
                max_depth: 2,
                ..Default::default()
            }),
        ];

        for candidate in candidates {
            let model = candidate.fit(&features, &labels, &[1.0; 6]).unwrap();
            let json = serde_json::to_string(&model).unwrap();
            let restored: TrainedModel = serde_json::from_str(&json).unwrap();

            assert!(restored.validate().is_ok());
            assert_eq!(restored.name(), candidate.name());
            assert_eq!(restored.n_features(), Some(2));
            assert_eq!(
                model.predict_proba(&features).unwrap(),
                restored.predict_proba(&features).unwrap()
            );
        }
    }
}
