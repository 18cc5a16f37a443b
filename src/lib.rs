//! PR Risk Prediction Library
//!
//! Scores pull requests for build-failure risk. The offline side engineers
//! features, fixes a schema, corrects class imbalance, selects a classifier
//! by minority-class recall and calibrates a decision threshold. The runtime
//! side loads those artifacts into an immutable context and answers scoring
//! requests over NATS.

pub mod config;
pub mod consumer;
pub mod error;
pub mod features;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod producer;
pub mod scoring;
pub mod service;
pub mod training;
pub mod types;

pub use config::AppConfig;
pub use error::{ArtifactError, ScoringError, TrainingError};
pub use features::{FeatureEngineer, FeatureSchema, FeatureVector, SchemaAligner};
pub use models::{ArtifactStore, Classifier};
pub use scoring::{Decision, RiskScorer, ScoringContext};
pub use service::ScoringService;
pub use training::TrainingPipeline;
pub use types::{RawRecord, ScoreResponse};
