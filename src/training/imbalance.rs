//! Class-imbalance correction applied to the training partition only.
//!
//! Takes a [`TrainingPartition`] by value and never sees the held-out rows,
//! so evaluation data cannot be reweighted or resampled.

use super::split::TrainingPartition;
use crate::features::FeatureMatrix;
use crate::types::Label;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImbalanceStrategy {
    /// Weight minority rows by the majority:minority ratio
    #[default]
    ClassWeight,
    /// Synthesise minority rows until the classes balance
    Smote,
    None,
}

/// Per-class sample weights
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassWeights {
    pub success: f64,
    pub failure: f64,
}

impl Default for ClassWeights {
    fn default() -> Self {
        Self::uniform()
    }
}

impl ClassWeights {
    pub fn uniform() -> Self {
        Self {
            success: 1.0,
            failure: 1.0,
        }
    }

    /// Majority weight 1, minority weight `majority / minority`
    pub fn balanced(labels: &[Label]) -> Self {
        let failure = labels.iter().filter(|l| l.is_failure()).count();
        let success = labels.len() - failure;
        if failure == 0 || success == 0 {
            warn!(success, failure, "Class missing from training partition, using uniform weights");
            return Self::uniform();
        }
        if failure <= success {
            Self {
                success: 1.0,
                failure: success as f64 / failure as f64,
            }
        } else {
            Self {
                success: failure as f64 / success as f64,
                failure: 1.0,
            }
        }
    }

    pub fn weight(&self, label: Label) -> f64 {
        match label {
            Label::Success => self.success,
            Label::Failure => self.failure,
        }
    }

    pub fn sample_weights(&self, labels: &[Label]) -> Vec<f64> {
        labels.iter().map(|&l| self.weight(l)).collect()
    }
}

/// Training partition after correction, ready for fitting
#[derive(Debug, Clone)]
pub struct RebalancedTraining {
    pub partition: TrainingPartition,
    pub weights: ClassWeights,
    pub synthetic_rows: usize,
}

impl RebalancedTraining {
    pub fn sample_weights(&self) -> Vec<f64> {
        self.weights.sample_weights(&self.partition.labels)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ImbalanceCorrector {
    strategy: ImbalanceStrategy,
    smote_k: usize,
    seed: u64,
}

impl ImbalanceCorrector {
    pub fn new(strategy: ImbalanceStrategy, smote_k: usize, seed: u64) -> Self {
        Self {
            strategy,
            smote_k,
            seed,
        }
    }

    pub fn strategy(&self) -> ImbalanceStrategy {
        self.strategy
    }

    pub fn rebalance(&self, partition: TrainingPartition) -> RebalancedTraining {
        let rebalanced = match self.strategy {
            ImbalanceStrategy::ClassWeight => RebalancedTraining {
                weights: ClassWeights::balanced(&partition.labels),
                partition,
                synthetic_rows: 0,
            },
            ImbalanceStrategy::Smote => self.smote(partition),
            ImbalanceStrategy::None => RebalancedTraining {
                partition,
                weights: ClassWeights::uniform(),
                synthetic_rows: 0,
            },
        };
        let counts = rebalanced.partition.class_counts();
        info!(
            strategy = ?self.strategy,
            success = counts.success,
            failure = counts.failure,
            failure_weight = rebalanced.weights.failure,
            synthetic_rows = rebalanced.synthetic_rows,
            "Training partition rebalanced"
        );
        rebalanced
    }

    fn smote(&self, mut partition: TrainingPartition) -> RebalancedTraining {
        let counts = partition.class_counts();
        let minority_label = if counts.failure <= counts.success {
            Label::Failure
        } else {
            Label::Success
        };
        let minority: Vec<usize> = (0..partition.labels.len())
            .filter(|&i| partition.labels[i] == minority_label)
            .collect();
        let deficit = counts.success.max(counts.failure) - minority.len();

        if minority.len() < 2 {
            warn!(
                minority = minority.len(),
                "SMOTE needs at least 2 minority rows, leaving partition unchanged"
            );
            return RebalancedTraining {
                partition,
                weights: ClassWeights::uniform(),
                synthetic_rows: 0,
            };
        }

        let k = self.smote_k.max(1).min(minority.len() - 1);
        let neighbours: Vec<Vec<usize>> = minority
            .iter()
            .map(|&i| nearest(&partition.features, i, &minority, k))
            .collect();

        let mut rng = StdRng::seed_from_u64(self.seed);
        let mut synthetic = Vec::with_capacity(deficit);
        for _ in 0..deficit {
            let anchor = rng.gen_range(0..minority.len());
            let neighbour = neighbours[anchor][rng.gen_range(0..k)];
            let gap: f64 = rng.gen();
            let base = partition.features.row(minority[anchor]);
            let other = partition.features.row(neighbour);
            synthetic.push(
                base.iter()
                    .zip(other)
                    .map(|(a, b)| a + gap * (b - a))
                    .collect::<Vec<f64>>(),
            );
        }

        for row in synthetic {
            partition.features.push_row(row);
            partition.labels.push(minority_label);
        }

        RebalancedTraining {
            partition,
            weights: ClassWeights::uniform(),
            synthetic_rows: deficit,
        }
    }
}

/// The `k` minority rows closest to `row` (Euclidean), excluding itself
fn nearest(features: &FeatureMatrix, row: usize, candidates: &[usize], k: usize) -> Vec<usize> {
    let origin = features.row(row);
    let mut by_distance: Vec<(f64, usize)> = candidates
        .iter()
        .filter(|&&j| j != row)
        .map(|&j| {
            let d: f64 = origin
                .iter()
                .zip(features.row(j))
                .map(|(a, b)| (a - b).powi(2))
                .sum();
            (d, j)
        })
        .collect();
    by_distance.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    by_distance.into_iter().take(k).map(|(_, j)| j).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition(success: usize, failure: usize) -> TrainingPartition {
        let mut rows = Vec::new();
        let mut labels = Vec::new();
        for i in 0..success {
            rows.push(vec![i as f64, 0.0]);
            labels.push(Label::Success);
        }
        for i in 0..failure {
            rows.push(vec![100.0 + i as f64, 10.0 + i as f64]);
            labels.push(Label::Failure);
        }
        TrainingPartition {
            features: FeatureMatrix::from_rows(rows).unwrap(),
            labels,
        }
    }

    #[test]
    fn test_balanced_weights() {
        let weights = ClassWeights::balanced(&partition(90, 10).labels);
        assert_eq!(weights.success, 1.0);
        assert_eq!(weights.failure, 9.0);

        let flipped = ClassWeights::balanced(&partition(10, 40).labels);
        assert_eq!(flipped.success, 4.0);
        assert_eq!(flipped.failure, 1.0);
    }

    #[test]
    fn test_missing_class_gets_uniform_weights() {
        assert_eq!(ClassWeights::balanced(&partition(5, 0).labels), ClassWeights::uniform());
    }

    #[test]
    fn test_class_weight_keeps_rows() {
        let corrector = ImbalanceCorrector::new(ImbalanceStrategy::ClassWeight, 5, 42);
        let rebalanced = corrector.rebalance(partition(30, 5));

        assert_eq!(rebalanced.partition.labels.len(), 35);
        assert_eq!(rebalanced.synthetic_rows, 0);
        let weights = rebalanced.sample_weights();
        assert_eq!(weights[0], 1.0);
        assert_eq!(weights[34], 6.0);
    }

    #[test]
    fn test_smote_balances_with_interpolated_rows() {
        let corrector = ImbalanceCorrector::new(ImbalanceStrategy::Smote, 3, 42);
        let rebalanced = corrector.rebalance(partition(30, 5));

        let counts = rebalanced.partition.class_counts();
        assert_eq!(counts.success, 30);
        assert_eq!(counts.failure, 30);
        assert_eq!(rebalanced.synthetic_rows, 25);

        for row in rebalanced.partition.features.rows().skip(35) {
            assert!((100.0..=104.0).contains(&row[0]));
            assert!((10.0..=14.0).contains(&row[1]));
        }
    }

    #[test]
    fn test_smote_skips_single_minority_row() {
        let corrector = ImbalanceCorrector::new(ImbalanceStrategy::Smote, 5, 42);
        let rebalanced = corrector.rebalance(partition(10, 1));

        assert_eq!(rebalanced.partition.labels.len(), 11);
        assert_eq!(rebalanced.synthetic_rows, 0);
    }

    #[test]
    fn test_none_strategy_is_identity() {
        let corrector = ImbalanceCorrector::new(ImbalanceStrategy::None, 5, 42);
        let rebalanced = corrector.rebalance(partition(10, 2));
        assert_eq!(rebalanced.weights, ClassWeights::uniform());
        assert_eq!(rebalanced.partition.labels.len(), 12);
    }
}
