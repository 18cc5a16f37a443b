//! Runtime risk scorer with fail-closed loading

use super::context::ScoringContext;
use crate::config::ScoringConfig;
use crate::error::ScoringError;
use crate::models::ArtifactStore;
use crate::types::RawRecord;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Scorer lifecycle. `Failed` is terminal until the process restarts.
#[derive(Debug, Clone)]
pub enum ScorerState {
    Ready(Arc<ScoringContext>),
    Failed(String),
}

/// Thresholded outcome for one request
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    /// Exact score the decision was taken on
    pub risk_score: f64,
    pub decision: bool,
    pub threshold: f64,
}

#[derive(Debug, Clone)]
pub struct RiskScorer {
    state: ScorerState,
    demo_jitter: f64,
}

impl RiskScorer {
    /// Load artifacts. Never fails: a load error yields a scorer in the
    /// `Failed` state that refuses every request.
    pub fn load(store: &ArtifactStore, scoring: &ScoringConfig) -> Self {
        let context = store
            .load_bundle()
            .map_err(ScoringError::from)
            .and_then(ScoringContext::from_bundle);

        match context {
            Ok(context) => {
                info!(
                    model = %context.model_name(),
                    run_id = %context.run_id(),
                    threshold = ?context.threshold(),
                    "Risk scorer ready"
                );
                Self::from_context(context, scoring.demo_jitter)
            }
            Err(e) => {
                error!(error = %e, "Failed to load scoring artifacts, refusing requests");
                Self::failed(e.to_string())
            }
        }
    }

    pub fn from_context(context: ScoringContext, demo_jitter: f64) -> Self {
        let demo_jitter = if !(0.0..=1.0).contains(&demo_jitter) {
            warn!(demo_jitter, "Demo jitter outside [0, 1], jitter disabled");
            0.0
        } else if demo_jitter > 0.0 && context.threshold().is_some() {
            warn!(
                demo_jitter,
                "Demo jitter requested but a decision threshold is loaded, jitter disabled"
            );
            0.0
        } else {
            demo_jitter
        };
        Self {
            state: ScorerState::Ready(Arc::new(context)),
            demo_jitter,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            state: ScorerState::Failed(reason.into()),
            demo_jitter: 0.0,
        }
    }

    pub fn state(&self) -> &ScorerState {
        &self.state
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state, ScorerState::Ready(_))
    }

    pub fn context(&self) -> Result<&ScoringContext, ScoringError> {
        match &self.state {
            ScorerState::Ready(context) => Ok(context),
            ScorerState::Failed(reason) => Err(ScoringError::Configuration(reason.clone())),
        }
    }

    /// Whether scores returned by [`score`](Self::score) carry demo noise
    pub fn jitter_active(&self) -> bool {
        self.demo_jitter > 0.0
    }

    /// Failure probability in [0, 1]
    pub fn score(&self, record: &RawRecord) -> Result<f64, ScoringError> {
        let mut score = self.context()?.probability(record)?;
        if self.jitter_active() {
            score += rand::thread_rng().gen_range(-self.demo_jitter..=self.demo_jitter);
        }
        Ok(score.clamp(0.0, 1.0))
    }

    /// Score and compare against the calibrated threshold (inclusive).
    /// Never jittered.
    pub fn decide(&self, record: &RawRecord) -> Result<Decision, ScoringError> {
        let context = self.context()?;
        let threshold = context.threshold().ok_or_else(|| {
            ScoringError::Configuration("no decision threshold loaded".to_string())
        })?;
        let risk_score = context.probability(record)?.clamp(0.0, 1.0);
        Ok(Decision {
            risk_score,
            decision: risk_score >= threshold,
            threshold,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureMatrix, FeatureSchema};
    use crate::models::Classifier;
    use crate::types::AuthorAssociation;
    use proptest::prelude::*;
    use uuid::Uuid;

    /// Returns the same probability for every row
    struct Constant(f64);

    impl Classifier for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn n_features(&self) -> Option<usize> {
            None
        }

        fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ScoringError> {
            Ok(vec![self.0; features.n_rows()])
        }
    }

    /// `lines_added / 1000`, unclamped
    struct Linear;

    impl Classifier for Linear {
        fn name(&self) -> &str {
            "linear"
        }

        fn n_features(&self) -> Option<usize> {
            Some(3)
        }

        fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ScoringError> {
            Ok(features.rows().map(|row| row[0] / 1000.0).collect())
        }
    }

    fn schema() -> FeatureSchema {
        let columns = ["lines_added", "author_MEMBER", "change_size"];
        FeatureSchema::new(Uuid::new_v4(), columns.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    fn build(model: impl Classifier + 'static, threshold: Option<f64>, jitter: f64) -> RiskScorer {
        let context = ScoringContext::new(schema(), Box::new(model), threshold).unwrap();
        RiskScorer::from_context(context, jitter)
    }

    #[test]
    fn test_boundary_score_is_a_positive_decision() {
        let scorer = build(Constant(0.42), Some(0.42), 0.0);
        let decision = scorer.decide(&RawRecord::new(10, 5, 2)).unwrap();
        assert!(decision.decision);
        assert_eq!(decision.risk_score, 0.42);
        assert_eq!(decision.threshold, 0.42);

        let below = build(Constant(0.4199), Some(0.42), 0.0);
        assert!(!below.decide(&RawRecord::new(10, 5, 2)).unwrap().decision);
    }

    #[test]
    fn test_decide_requires_threshold() {
        let scorer = build(Constant(0.5), None, 0.0);
        assert!(matches!(
            scorer.decide(&RawRecord::new(1, 1, 1)),
            Err(ScoringError::Configuration(_))
        ));
        assert_eq!(scorer.score(&RawRecord::new(1, 1, 1)).unwrap(), 0.5);
    }

    #[test]
    fn test_failed_scorer_refuses_every_call() {
        let scorer = RiskScorer::failed("model file missing");
        assert!(!scorer.is_ready());
        let record = RawRecord::new(1, 1, 1);
        assert!(matches!(scorer.score(&record), Err(ScoringError::Configuration(_))));
        assert!(matches!(scorer.decide(&record), Err(ScoringError::Configuration(_))));
    }

    #[test]
    fn test_load_from_empty_directory_fails_closed() {
        let dir = tempfile::tempdir().unwrap();
        let scorer = RiskScorer::load(&ArtifactStore::in_dir(dir.path()), &ScoringConfig::default());
        assert!(matches!(scorer.state(), ScorerState::Failed(_)));
        assert_eq!(
            scorer.score(&RawRecord::new(1, 0, 1)).unwrap_err().kind(),
            "configuration"
        );
    }

    #[test]
    fn test_width_mismatch_rejected_at_construction() {
        struct Wide;
        impl Classifier for Wide {
            fn name(&self) -> &str {
                "wide"
            }
            fn n_features(&self) -> Option<usize> {
                Some(9)
            }
            fn predict_proba(&self, _: &FeatureMatrix) -> Result<Vec<f64>, ScoringError> {
                Ok(vec![])
            }
        }
        assert!(matches!(
            ScoringContext::new(schema(), Box::new(Wide), None),
            Err(ScoringError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_jitter_disabled_when_threshold_loaded() {
        let with_threshold = build(Constant(0.3), Some(0.5), 0.05);
        assert!(!with_threshold.jitter_active());
        assert_eq!(with_threshold.score(&RawRecord::new(1, 1, 1)).unwrap(), 0.3);

        let demo = build(Constant(0.3), None, 0.05);
        assert!(demo.jitter_active());
        let score = demo.score(&RawRecord::new(1, 1, 1)).unwrap();
        assert!((0.249..=0.351).contains(&score));
    }

    #[test]
    fn test_out_of_range_jitter_is_disabled() {
        for jitter in [f64::INFINITY, f64::NAN, -0.1, 1.5] {
            let scorer = build(Constant(0.3), None, jitter);
            assert!(!scorer.jitter_active(), "jitter {jitter} stayed active");
            assert_eq!(scorer.score(&RawRecord::new(1, 1, 1)).unwrap(), 0.3);
        }
    }

    #[test]
    fn test_unseen_author_scores_like_absent_author() {
        let scorer = build(Linear, None, 0.0);
        let plain = RawRecord::new(200, 3, 1);
        let unseen = plain
            .clone()
            .with_author(AuthorAssociation::Other("MANNEQUIN".to_string()));
        assert_eq!(scorer.score(&plain).unwrap(), scorer.score(&unseen).unwrap());
    }

    proptest! {
        #[test]
        fn prop_score_stays_in_unit_interval(
            added in 0u64..100_000,
            deleted in 0u64..100_000,
            files in 0u64..500,
        ) {
            let scorer = build(Linear, None, 0.0);
            let score = scorer.score(&RawRecord::new(added, deleted, files)).unwrap();
            prop_assert!((0.0..=1.0).contains(&score));
        }

        #[test]
        fn prop_decision_matches_threshold(added in 0u64..2_000, threshold in 0.0f64..=1.0) {
            let scorer = build(Linear, Some(threshold), 0.0);
            let decision = scorer.decide(&RawRecord::new(added, 0, 1)).unwrap();
            prop_assert_eq!(decision.decision, decision.risk_score >= threshold);
        }
    }
}
