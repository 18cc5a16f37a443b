//! Request handling independent of the transport

use crate::config::ScoringMode;
use crate::error::ScoringError;
use crate::metrics::ServiceMetrics;
use crate::scoring::RiskScorer;
use crate::types::{RawRecord, ScoreResponse};
use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

/// Turns request payloads into replies. Every outcome, including malformed
/// input and an unavailable model, becomes a [`ScoreResponse`].
pub struct ScoringService {
    scorer: RiskScorer,
    mode: ScoringMode,
    metrics: Arc<ServiceMetrics>,
}

impl ScoringService {
    pub fn new(scorer: RiskScorer, mode: ScoringMode, metrics: Arc<ServiceMetrics>) -> Self {
        Self {
            scorer,
            mode,
            metrics,
        }
    }

    pub fn scorer(&self) -> &RiskScorer {
        &self.scorer
    }

    pub fn mode(&self) -> ScoringMode {
        self.mode
    }

    pub fn metrics(&self) -> &Arc<ServiceMetrics> {
        &self.metrics
    }

    pub fn handle_payload(&self, payload: &[u8]) -> ScoreResponse {
        let start = Instant::now();
        match self.respond(payload) {
            Ok((response, risk_score, decision)) => {
                self.metrics.record_score(start.elapsed(), risk_score, decision);
                debug!(
                    risk_score,
                    decision = ?decision,
                    elapsed_us = start.elapsed().as_micros() as u64,
                    "Request scored"
                );
                response
            }
            Err(e) => {
                self.metrics.record_error(start.elapsed(), e.kind());
                if e.is_client_error() {
                    debug!(error = %e, "Rejected scoring request");
                } else {
                    warn!(error = %e, kind = e.kind(), "Scoring request failed");
                }
                ScoreResponse::from(e)
            }
        }
    }

    fn respond(&self, payload: &[u8]) -> Result<(ScoreResponse, f64, Option<bool>), ScoringError> {
        let body: Value = serde_json::from_slice(payload)
            .map_err(|e| ScoringError::InputValidation(format!("malformed JSON: {e}")))?;
        let record = RawRecord::from_request(&body)?;

        match self.mode {
            ScoringMode::Probability => {
                let score = self.scorer.score(&record)?;
                Ok((
                    ScoreResponse::score(score, self.scorer.jitter_active()),
                    score,
                    None,
                ))
            }
            ScoringMode::Decision => {
                let d = self.scorer.decide(&record)?;
                Ok((
                    ScoreResponse::decision(d.risk_score, d.decision, d.threshold),
                    d.risk_score,
                    Some(d.decision),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{FeatureMatrix, FeatureSchema};
    use crate::models::Classifier;
    use crate::scoring::ScoringContext;
    use crate::types::RiskScoreBody;
    use std::sync::atomic::Ordering;
    use uuid::Uuid;

    struct Fixed(f64);

    impl Classifier for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        fn n_features(&self) -> Option<usize> {
            Some(2)
        }

        fn predict_proba(&self, features: &FeatureMatrix) -> Result<Vec<f64>, ScoringError> {
            Ok(vec![self.0; features.n_rows()])
        }
    }

    fn service(probability: f64, threshold: Option<f64>, mode: ScoringMode) -> ScoringService {
        let schema = FeatureSchema::new(
            Uuid::new_v4(),
            vec!["lines_added".to_string(), "change_size".to_string()],
        )
        .unwrap();
        let context = ScoringContext::new(schema, Box::new(Fixed(probability)), threshold).unwrap();
        ScoringService::new(
            RiskScorer::from_context(context, 0.0),
            mode,
            Arc::new(ServiceMetrics::new()),
        )
    }

    fn body(response: ScoreResponse) -> RiskScoreBody {
        match response {
            ScoreResponse::Score(body) => body,
            ScoreResponse::Error(e) => panic!("unexpected error response: {e:?}"),
        }
    }

    #[test]
    fn test_probability_reply_is_rounded() {
        let service = service(0.876543, None, ScoringMode::Probability);
        let reply = body(service.handle_payload(br#"{"lines_added": 10, "lines_deleted": 5}"#));

        assert_eq!(reply.risk_score, 0.8765);
        assert_eq!(reply.decision, None);
        assert!(!reply.jittered);
    }

    #[test]
    fn test_decision_reply() {
        let service = service(0.42, Some(0.42), ScoringMode::Decision);
        let reply = body(service.handle_payload(br#"{"lines_added": 10, "files_changed": 2}"#));

        assert_eq!(reply.decision, Some(true));
        assert_eq!(reply.threshold, Some(0.42));
        assert_eq!(service.metrics().positive_decisions.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_invalid_requests_get_error_replies() {
        let service = service(0.5, None, ScoringMode::Probability);

        for payload in [
            &b"not json"[..],
            br#"{"lines_deleted": 3}"#,
            br#"{"lines_added": -4, "lines_deleted": 3}"#,
            br#"{"lines_added": 4}"#,
        ] {
            match service.handle_payload(payload) {
                ScoreResponse::Error(e) => assert_eq!(e.kind, "input_validation"),
                other => panic!("expected error for {payload:?}, got {other:?}"),
            }
        }
        assert_eq!(service.metrics().requests_failed.load(Ordering::Relaxed), 4);
    }

    #[test]
    fn test_unavailable_scorer_reports_configuration_error() {
        let service = ScoringService::new(
            RiskScorer::failed("schema missing"),
            ScoringMode::Probability,
            Arc::new(ServiceMetrics::new()),
        );
        match service.handle_payload(br#"{"lines_added": 1, "lines_deleted": 1}"#) {
            ScoreResponse::Error(e) => assert_eq!(e.kind, "configuration"),
            other => panic!("expected configuration error, got {other:?}"),
        }
    }

    #[test]
    fn test_decision_mode_without_threshold() {
        let service = service(0.5, None, ScoringMode::Decision);
        assert!(service
            .handle_payload(br#"{"lines_added": 1, "lines_deleted": 1}"#)
            .is_error());
    }
}
