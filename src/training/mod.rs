//! Offline training: dataset loading, splitting, imbalance correction,
//! model selection and threshold calibration

pub mod dataset;
pub mod evaluation;
pub mod imbalance;
pub mod pipeline;
pub mod selector;
pub mod split;
pub mod threshold;

pub use dataset::{ClassCounts, Dataset};
pub use evaluation::{ConfusionMatrix, EvaluationMetrics};
pub use imbalance::{ClassWeights, ImbalanceCorrector, ImbalanceStrategy, RebalancedTraining};
pub use pipeline::{TrainingOutcome, TrainingPipeline, TrainingReport};
pub use selector::{CandidateEvaluation, ModelSelector, Selection};
pub use split::{DataSplit, HeldOutPartition, SplitMode, Splitter, TrainingPartition};
pub use threshold::{calibrate, CalibratedThreshold};
