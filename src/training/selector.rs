//! Candidate comparison by held-out minority-class recall

use super::evaluation::{ConfusionMatrix, EvaluationMetrics};
use super::imbalance::RebalancedTraining;
use super::split::HeldOutPartition;
use crate::error::TrainingError;
use crate::models::{Classifier, Estimator};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Held-out predictions are positive strictly above this probability
pub const PREDICTION_CUTOFF: f64 = 0.5;

/// Held-out metrics for one fitted candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateEvaluation {
    pub name: String,
    #[serde(flatten)]
    pub metrics: EvaluationMetrics,
}

/// Winning model plus everything needed to calibrate and report on it
#[derive(Debug)]
pub struct Selection<M> {
    pub model: M,
    pub chosen: String,
    pub evaluations: Vec<CandidateEvaluation>,
    /// Winner's failure probabilities on the held-out rows
    pub held_out_probabilities: Vec<f64>,
}

pub struct ModelSelector<E> {
    candidates: Vec<E>,
}

impl<E: Estimator> ModelSelector<E> {
    pub fn new(candidates: Vec<E>) -> Self {
        Self { candidates }
    }

    /// Fit every candidate and keep the one with the highest failure recall.
    ///
    /// Earlier candidates win ties. Candidates that fail to fit or predict
    /// are skipped with a warning.
    pub fn select(
        &self,
        training: &RebalancedTraining,
        held_out: &HeldOutPartition,
    ) -> Result<Selection<E::Model>, TrainingError> {
        let weights = training.sample_weights();
        let mut evaluations = Vec::with_capacity(self.candidates.len());
        let mut best: Option<(E::Model, String, Vec<f64>)> = None;
        let mut best_recall = -1.0;

        for candidate in &self.candidates {
            let name = candidate.name();
            let model = match candidate.fit(
                &training.partition.features,
                &training.partition.labels,
                &weights,
            ) {
                Ok(model) => model,
                Err(e) => {
                    warn!(model = %name, error = %e, "Candidate failed to fit, skipping");
                    continue;
                }
            };
            let probabilities = match model.predict_proba(held_out.features()) {
                Ok(p) => p,
                Err(e) => {
                    warn!(model = %name, error = %e, "Candidate failed on held-out rows, skipping");
                    continue;
                }
            };

            let predictions: Vec<bool> =
                probabilities.iter().map(|&p| p > PREDICTION_CUTOFF).collect();
            let metrics = EvaluationMetrics::from(ConfusionMatrix::from_predictions(
                &predictions,
                held_out.labels(),
            ));
            info!(
                model = %name,
                recall = metrics.recall,
                precision = metrics.precision,
                accuracy = metrics.accuracy,
                f1 = metrics.f1,
                "Candidate evaluated"
            );

            if metrics.recall > best_recall {
                best_recall = metrics.recall;
                best = Some((model, name.clone(), probabilities));
            }
            evaluations.push(CandidateEvaluation { name, metrics });
        }

        let (model, chosen, held_out_probabilities) = best.ok_or(TrainingError::NoCandidate)?;
        info!(model = %chosen, recall = best_recall, "Model selected");

        Ok(Selection {
            model,
            chosen,
            evaluations,
            held_out_probabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ScoringError;
    use crate::features::FeatureMatrix;
    use crate::training::imbalance::ClassWeights;
    use crate::training::split::{Splitter, TrainingPartition};
    use crate::types::Label;

    /// Predicts failure for rows whose first value is at least `cutoff`
    struct Rule {
        name: &'static str,
        cutoff: f64,
    }

    impl Classifier for Rule {
        fn name(&self) -> &str {
            self.name
        }

        fn n_features(&self) -> Option<usize> {
            None
        }

        fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ScoringError> {
            Ok(features
                .rows()
                .map(|row| if row[0] >= self.cutoff { 0.9 } else { 0.1 })
                .collect())
        }
    }

    enum Fake {
        Rule(&'static str, f64),
        FailsToFit,
    }

    impl Estimator for Fake {
        type Model = Rule;

        fn name(&self) -> String {
            match self {
                Fake::Rule(name, _) => name.to_string(),
                Fake::FailsToFit => "broken".to_string(),
            }
        }

        fn fit(
            &self,
            _: &FeatureMatrix,
            _: &[Label],
            _: &[f64],
        ) -> Result<Rule, TrainingError> {
            match self {
                Fake::Rule(name, cutoff) => Ok(Rule {
                    name: *name,
                    cutoff: *cutoff,
                }),
                Fake::FailsToFit => Err(TrainingError::Fit {
                    model: "broken".to_string(),
                    message: "diverged".to_string(),
                }),
            }
        }
    }

    /// Rows 0..20, failures are the rows with value >= 15
    fn setup() -> (RebalancedTraining, HeldOutPartition) {
        let rows = (0..20).map(|i| vec![i as f64]).collect();
        let labels: Vec<Label> = (0..20)
            .map(|i| if i >= 15 { Label::Failure } else { Label::Success })
            .collect();
        let split = Splitter::new(0.5, 1)
            .split(&FeatureMatrix::from_rows(rows).unwrap(), &labels)
            .unwrap();
        let training = RebalancedTraining {
            partition: TrainingPartition {
                features: split.train.features,
                labels: split.train.labels,
            },
            weights: ClassWeights::uniform(),
            synthetic_rows: 0,
        };
        (training, split.test)
    }

    #[test]
    fn test_highest_recall_wins() {
        let (training, held_out) = setup();
        let selector = ModelSelector::new(vec![
            Fake::Rule("strict", 100.0),
            Fake::Rule("lenient", 0.0),
            Fake::Rule("exact", 15.0),
        ]);

        let selection = selector.select(&training, &held_out).unwrap();
        assert_eq!(selection.chosen, "lenient");
        assert_eq!(selection.evaluations.len(), 3);
        assert_eq!(selection.evaluations[0].metrics.recall, 0.0);
        assert_eq!(selection.held_out_probabilities.len(), held_out.len());
    }

    #[test]
    fn test_ties_go_to_first_candidate() {
        let (training, held_out) = setup();
        let selector =
            ModelSelector::new(vec![Fake::Rule("exact", 15.0), Fake::Rule("lenient", 0.0)]);

        let selection = selector.select(&training, &held_out).unwrap();
        assert_eq!(selection.chosen, "exact");
        assert!(selection.evaluations[0].metrics.precision > selection.evaluations[1].metrics.precision);
    }

    #[test]
    fn test_failed_candidates_are_skipped() {
        let (training, held_out) = setup();
        let selector = ModelSelector::new(vec![Fake::FailsToFit, Fake::Rule("exact", 15.0)]);

        let selection = selector.select(&training, &held_out).unwrap();
        assert_eq!(selection.chosen, "exact");
        assert_eq!(selection.evaluations.len(), 1);
    }

    #[test]
    fn test_no_usable_candidate() {
        let (training, held_out) = setup();
        let selector = ModelSelector::new(vec![Fake::FailsToFit]);
        assert!(matches!(
            selector.select(&training, &held_out),
            Err(TrainingError::NoCandidate)
        ));
    }
}
