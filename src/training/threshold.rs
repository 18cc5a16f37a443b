//! Decision threshold calibration on held-out probabilities

use super::evaluation::ConfusionMatrix;
use crate::types::Label;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Keeps the F1 denominator non-zero
pub const F1_EPSILON: f64 = 1e-9;

/// Used when the held-out set cannot calibrate anything
pub const FALLBACK_THRESHOLD: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibratedThreshold {
    pub threshold: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// No failures held out; threshold is the default, not calibrated
    pub fallback: bool,
}

/// F1-maximising threshold over the distinct held-out scores.
///
/// Candidates are swept in ascending order with `p >= t` as the positive
/// prediction, so ties resolve to the lowest threshold.
pub fn calibrate(probabilities: &[f64], labels: &[Label]) -> CalibratedThreshold {
    if probabilities.is_empty() || !labels.iter().any(|l| l.is_failure()) {
        warn!(
            held_out = labels.len(),
            threshold = FALLBACK_THRESHOLD,
            "No failures in held-out rows, using default decision threshold"
        );
        let m = ConfusionMatrix::at_threshold(probabilities, labels, FALLBACK_THRESHOLD);
        return CalibratedThreshold {
            threshold: FALLBACK_THRESHOLD,
            precision: m.precision(),
            recall: m.recall(),
            f1: f1(m.precision(), m.recall()),
            fallback: true,
        };
    }

    let mut candidates: Vec<f64> = probabilities.iter().copied().filter(|p| p.is_finite()).collect();
    candidates.sort_by(f64::total_cmp);
    candidates.dedup();

    let mut best = CalibratedThreshold {
        threshold: FALLBACK_THRESHOLD,
        precision: 0.0,
        recall: 0.0,
        f1: -1.0,
        fallback: false,
    };
    for &t in &candidates {
        let m = ConfusionMatrix::at_threshold(probabilities, labels, t);
        let (precision, recall) = (m.precision(), m.recall());
        let score = f1(precision, recall);
        if score > best.f1 {
            best = CalibratedThreshold {
                threshold: t,
                precision,
                recall,
                f1: score,
                fallback: false,
            };
        }
    }

    info!(
        threshold = best.threshold,
        precision = best.precision,
        recall = best.recall,
        f1 = best.f1,
        candidates = candidates.len(),
        "Decision threshold calibrated"
    );
    best
}

fn f1(precision: f64, recall: f64) -> f64 {
    2.0 * precision * recall / (precision + recall + F1_EPSILON)
}
