use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by the forecasting and classification core.
///
/// None of these abort the registry: every failure is local to one
/// (region, parameter) key or to the classifier.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("numeric backend unavailable: {0}")]
    Unavailable(String),

    #[error("insufficient data for {context}: {actual} samples (minimum {required})")]
    InsufficientData {
        context: String,
        required: usize,
        actual: usize,
    },

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("training failed: {0}")]
    Training(String),

    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// Coarse classification of a [`ModelError`], stable across releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Unavailable,
    InsufficientData,
    ModelNotFound,
    ShapeMismatch,
    InvalidInput,
    Training,
    Persistence,
}

impl ErrorKind {
    /// Short message used in structured prediction results
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::Unavailable => "numeric backend unavailable",
            ErrorKind::InsufficientData => "insufficient data",
            ErrorKind::ModelNotFound => "model not found",
            ErrorKind::ShapeMismatch => "shape mismatch",
            ErrorKind::InvalidInput => "invalid input",
            ErrorKind::Training => "training failed",
            ErrorKind::Persistence => "persistence failure",
        }
    }
}

impl ModelError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ModelError::Unavailable(_) => ErrorKind::Unavailable,
            ModelError::InsufficientData { .. } => ErrorKind::InsufficientData,
            ModelError::ModelNotFound(_) => ErrorKind::ModelNotFound,
            ModelError::ShapeMismatch(_) => ErrorKind::ShapeMismatch,
            ModelError::InvalidInput(_) => ErrorKind::InvalidInput,
            ModelError::Training(_) => ErrorKind::Training,
            ModelError::Persistence(_) => ErrorKind::Persistence,
        }
    }

    pub fn insufficient(context: impl Into<String>, required: usize, actual: usize) -> Self {
        ModelError::InsufficientData {
            context: context.into(),
            required,
            actual,
        }
    }
}

impl From<std::io::Error> for ModelError {
    fn from(error: std::io::Error) -> Self {
        ModelError::Persistence(format!("I/O error: {}", error))
    }
}

impl From<bincode::Error> for ModelError {
    fn from(error: bincode::Error) -> Self {
        ModelError::Persistence(format!("encoding error: {}", error))
    }
}

/// Structured error returned in place of a prediction payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionError {
    pub error: String,
    pub kind: ErrorKind,
    pub detail: String,
}

impl From<&ModelError> for PredictionError {
    fn from(error: &ModelError) -> Self {
        let kind = error.kind();
        Self {
            error: kind.message().to_string(),
            kind,
            detail: error.to_string(),
        }
    }
}

/// Either a prediction payload or a structured error; serializes to the bare
/// payload or to `{"error": ..., "kind": ..., "detail": ...}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PredictionOutcome<T> {
    Ready(T),
    Failed(PredictionError),
}

impl<T> PredictionOutcome<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, PredictionOutcome::Ready(_))
    }

    pub fn ready(&self) -> Option<&T> {
        match self {
            PredictionOutcome::Ready(value) => Some(value),
            PredictionOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&PredictionError> {
        match self {
            PredictionOutcome::Ready(_) => None,
            PredictionOutcome::Failed(err) => Some(err),
        }
    }
}

impl<T> From<Result<T, ModelError>> for PredictionOutcome<T> {
    fn from(result: Result<T, ModelError>) -> Self {
        match result {
            Ok(value) => PredictionOutcome::Ready(value),
            Err(err) => PredictionOutcome::Failed(PredictionError::from(&err)),
        }
    }
}
