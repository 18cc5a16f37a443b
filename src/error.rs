//! Error taxonomy for scoring, training and artifact handling

use thiserror::Error;

/// Errors raised while loading or validating persisted artifacts.
#[derive(Error, Debug)]
pub enum ArtifactError {
    /// Artifact file is missing or unreadable
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Artifact file exists but could not be parsed
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Failed to serialize an artifact before writing
    #[error("failed to serialize {what}: {source}")]
    Serialize {
        what: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Artifacts disagree on run id or feature names
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Artifact content violates an invariant (empty schema, threshold out of range, ...)
    #[error("invalid artifact: {0}")]
    Invalid(String),

    /// Artifact requires a capability this build does not include
    #[error("unsupported model: {0}")]
    Unsupported(String),
}

/// Errors returned by the runtime risk scorer.
///
/// Every variant maps to a structured error response; none of them should
/// take the process down.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoringError {
    /// Model or schema unavailable; scoring refused until restart
    #[error("scoring unavailable: {0}")]
    Configuration(String),

    /// Request is missing fields or carries malformed values
    #[error("invalid request: {0}")]
    InputValidation(String),

    /// Engineered features cannot be reconciled with the loaded schema
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),

    /// Model failed while producing probabilities
    #[error("inference failed: {0}")]
    Inference(String),
}

impl ScoringError {
    /// Stable machine-readable kind used in error responses and metrics
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::InputValidation(_) => "input_validation",
            Self::SchemaMismatch(_) => "schema_mismatch",
            Self::Inference(_) => "inference",
        }
    }

    /// Whether the failure is attributable to the caller rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::InputValidation(_))
    }
}

impl From<ArtifactError> for ScoringError {
    fn from(err: ArtifactError) -> Self {
        match err {
            ArtifactError::SchemaMismatch(msg) => Self::SchemaMismatch(msg),
            other => Self::Configuration(other.to_string()),
        }
    }
}

/// Errors that abort an offline training run.
#[derive(Error, Debug)]
pub enum TrainingError {
    /// Dataset missing, empty, or unusable
    #[error("training data error: {0}")]
    Data(String),

    /// CSV reader failure
    #[error("failed to read dataset: {0}")]
    Csv(#[from] csv::Error),

    /// A candidate classifier could not be fitted
    #[error("model fitting failed for {model}: {message}")]
    Fit { model: String, message: String },

    /// No candidate produced a usable model
    #[error("no candidate model could be selected")]
    NoCandidate,

    /// Writing artifacts failed
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoring_error_kinds() {
        assert_eq!(
            ScoringError::Configuration("x".into()).kind(),
            "configuration"
        );
        assert_eq!(
            ScoringError::InputValidation("x".into()).kind(),
            "input_validation"
        );
        assert!(ScoringError::InputValidation("x".into()).is_client_error());
        assert!(!ScoringError::Inference("x".into()).is_client_error());
    }

    #[test]
    fn test_artifact_mismatch_keeps_severity() {
        let err: ScoringError = ArtifactError::SchemaMismatch("run ids differ".into()).into();
        assert_eq!(err.kind(), "schema_mismatch");

        let err: ScoringError = ArtifactError::Invalid("empty schema".into()).into();
        assert_eq!(err.kind(), "configuration");
    }
}
