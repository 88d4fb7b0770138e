//! Error types for V-WSD ranking and evaluation.
//!
//! Errors are grouped by where they arise (configuration, dataset files,
//! the similarity model, evaluation) and carry the offending data so a
//! failed run can be diagnosed from the message alone.

use std::path::PathBuf;
use thiserror::Error;

/// Top-level error type for vwsd operations.
#[derive(Error, Debug)]
pub enum VwsdError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Dataset loading errors
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// Similarity model errors
    #[error("Similarity error: {0}")]
    Similarity(#[from] SimilarityError),

    /// Evaluation integrity errors
    #[error("Evaluation error: {0}")]
    Eval(#[from] EvalError),

    /// General I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV serialization errors
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read the config file from disk
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    /// Failed to parse TOML configuration
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    /// Configuration values are invalid
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Dataset and reference file errors.
#[derive(Error, Debug)]
pub enum DatasetError {
    /// Expected dataset file does not exist
    #[error("Dataset file not found: {0}")]
    NotFound(PathBuf),

    /// A line could not be parsed
    #[error("Malformed line {line} in {path}: {message}")]
    Malformed {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

/// Errors raised by a similarity scorer.
#[derive(Error, Debug)]
pub enum SimilarityError {
    /// Model loading or inference failed
    #[error("Model error: {message}")]
    Model { message: String },

    /// A candidate or query image could not be read
    #[error("Image error for {path}: {message}")]
    Image { path: PathBuf, message: String },
}

/// Integrity violations found while evaluating predictions.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Prediction and reference files disagree on sample count
    #[error("{language}: prediction count ({predictions}) does not match reference count ({references})")]
    CountMismatch {
        language: String,
        predictions: usize,
        references: usize,
    },

    /// A prediction lists the same candidate more than once
    #[error("Prediction {index} contains duplicate candidates: {prediction:?}")]
    DuplicateCandidates {
        index: usize,
        prediction: Vec<String>,
    },

    /// Gold candidates missing from their predictions, as (index, reference, prediction)
    #[error("{} reference(s) not found in prediction: {pairs:?}", pairs.len())]
    ReferenceNotRanked {
        pairs: Vec<(usize, String, Vec<String>)>,
    },

    /// Metric name is not recognised
    #[error("Unknown metric: {0}")]
    UnknownMetric(String),
}

/// Convenience type alias for vwsd results.
pub type Result<T> = std::result::Result<T, VwsdError>;

/// Convenience type alias for similarity-scorer results.
pub type SimilarityResult<T> = std::result::Result<T, SimilarityError>;
