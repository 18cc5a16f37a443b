//! Runtime scoring path

pub mod context;
pub mod scorer;

pub use context::ScoringContext;
pub use scorer::{Decision, RiskScorer, ScorerState};
