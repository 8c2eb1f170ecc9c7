use crate::types::ModelId;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Model load error: {0}")]
    ModelLoad(#[from] ModelLoadError),
}

/// A classifier artifact could not be materialised. This points at a
/// packaging or deployment problem, not at the page being checked.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("artifact for {model} not found at {path}")]
    Missing { model: ModelId, path: String },

    #[error("failed to read artifact for {model}: {source}")]
    Io {
        model: ModelId,
        #[source]
        source: std::io::Error,
    },

    #[error("artifact for {model} is not valid JSON: {source}")]
    Decode {
        model: ModelId,
        #[source]
        source: serde_json::Error,
    },

    #[error("artifact for {model} holds a {found} model, expected {expected}")]
    KindMismatch {
        model: ModelId,
        expected: &'static str,
        found: &'static str,
    },

    #[error("artifact for {model} is malformed: {reason}")]
    Malformed { model: ModelId, reason: String },

    #[error("artifact digest mismatch for {model}: manifest {expected}, file {actual}")]
    DigestMismatch {
        model: ModelId,
        expected: String,
        actual: String,
    },

    #[error("model manifest is unreadable: {0}")]
    Manifest(String),
}

/// Inference failed for a single request.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PredictionError {
    #[error("model expects {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("feature {index} is not a finite number")]
    NonFinite { index: usize },

    #[error("model produced no decision: {0}")]
    Degenerate(String),
}

/// Shorthand for structural checks run while loading an artifact.
pub fn malformed(model: ModelId, reason: impl Into<String>) -> ModelLoadError {
    ModelLoadError::Malformed {
        model,
        reason: reason.into(),
    }
}
