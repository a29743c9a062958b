//! Error taxonomy shared by every featurization step.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidInput,
    InvalidConfig,
    InferenceFailure,
    InsufficientData,
    SchemaMismatch,
    OutOfPhase,
    Internal,
    Step,
    Io,
}

#[derive(Debug, Error)]
pub enum FeaturizeError {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("frequency could not be inferred (coverage {coverage:.3}): {reason}")]
    InferenceFailure { coverage: f64, reason: String },
    #[error(
        "insufficient data: every series is shorter than the required {required} points; observed lengths {observed:?}"
    )]
    InsufficientData {
        required: usize,
        observed: Vec<(String, usize)>,
    },
    #[error("scoring data is missing columns seen at fit: {missing:?}")]
    SchemaMismatch { missing: Vec<String> },
    #[error("schema fingerprint mismatch: expected {expected}, got {actual}")]
    FingerprintMismatch { expected: String, actual: String },
    #[error("all scoring rows are out of phase with the training frequency {freq}")]
    OutOfPhase { freq: String },
    #[error("internal error: {0}")]
    Internal(String),
    #[error("step {step} failed: {reason}")]
    Step { step: &'static str, reason: String },
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FeaturizeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidInput(_) => ErrorKind::InvalidInput,
            Self::InvalidConfig(_) | Self::Json(_) => ErrorKind::InvalidConfig,
            Self::InferenceFailure { .. } => ErrorKind::InferenceFailure,
            Self::InsufficientData { .. } => ErrorKind::InsufficientData,
            Self::SchemaMismatch { .. } | Self::FingerprintMismatch { .. } => {
                ErrorKind::SchemaMismatch
            }
            Self::OutOfPhase { .. } => ErrorKind::OutOfPhase,
            Self::Internal(_) => ErrorKind::Internal,
            Self::Step { .. } => ErrorKind::Step,
            Self::Csv(_) | Self::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn step(step: &'static str, reason: impl Into<String>) -> Self {
        Self::Step {
            step,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, FeaturizeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_offending_columns() {
        let err = FeaturizeError::SchemaMismatch {
            missing: vec!["price".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "scoring data is missing columns seen at fit: [\"price\"]"
        );
        assert_eq!(err.kind(), ErrorKind::SchemaMismatch);
    }

    #[test]
    fn insufficient_data_reports_lengths() {
        let err = FeaturizeError::InsufficientData {
            required: 10,
            observed: vec![("a".to_string(), 3)],
        };
        let text = err.to_string();
        assert!(text.contains("required 10"));
        assert!(text.contains("(\"a\", 3)"));
    }
}
