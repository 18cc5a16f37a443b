//! Type definitions shared by the scorer and the training pipeline

pub mod record;
pub mod response;

pub use record::{AuthorAssociation, Label, RawRecord};
pub use response::{ErrorBody, RiskScoreBody, ScoreResponse};
