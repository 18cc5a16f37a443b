//! Response payloads returned to the calling system

use crate::error::ScoringError;
use serde::{Deserialize, Serialize};

/// Round a score to 4 decimal places for presentation
pub fn round_score(score: f64) -> f64 {
    (score * 10_000.0).round() / 10_000.0
}

/// Successful scoring result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskScoreBody {
    /// Failure probability, rounded to 4 decimals
    pub risk_score: f64,

    /// Binary decision against the calibrated threshold (decision mode only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decision: Option<bool>,

    /// Threshold the decision was made against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,

    /// Set when demo jitter was added to the score; such scores are not reproducible
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub jittered: bool,
}

/// Structured error returned instead of a score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: String,
}

/// Reply sent for every scoring request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScoreResponse {
    Score(RiskScoreBody),
    Error(ErrorBody),
}

impl ScoreResponse {
    /// Probability-only response
    pub fn score(risk_score: f64, jittered: bool) -> Self {
        Self::Score(RiskScoreBody {
            risk_score: round_score(risk_score),
            decision: None,
            threshold: None,
            jittered,
        })
    }

    /// Response carrying a thresholded decision
    pub fn decision(risk_score: f64, decision: bool, threshold: f64) -> Self {
        Self::Score(RiskScoreBody {
            risk_score: round_score(risk_score),
            decision: Some(decision),
            threshold: Some(threshold),
            jittered: false,
        })
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Serialize for the wire; falls back to a static error body
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|_| {
            br#"{"error":"failed to encode response","kind":"inference"}"#.to_vec()
        })
    }
}

impl From<ScoringError> for ScoreResponse {
    fn from(err: ScoringError) -> Self {
        Self::Error(ErrorBody {
            kind: err.kind().to_string(),
            error: err.to_string(),
        })
    }
}
