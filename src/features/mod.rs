//! Feature pipeline shared by training and scoring

pub mod aligner;
pub mod engineer;
pub mod schema;

pub use aligner::{AlignmentReport, SchemaAligner};
pub use engineer::{EngineeredRecord, FeatureEngineer, SourceColumns};
pub use schema::{FeatureMatrix, FeatureSchema, FeatureVector};
