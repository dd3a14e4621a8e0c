//! Error Handling Module
//!
//! Defines the error type shared by the library layers of the classifier.
//! Uses thiserror for ergonomic error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Main error type for transfer classifier operations
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// Error loading or decoding an image
    #[error("Failed to load image at '{0}': {1}")]
    ImageLoad(PathBuf, String),

    /// Error with dataset discovery or loading
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Error building or loading a model
    #[error("Model error: {0}")]
    Model(String),

    /// Error during the training loop
    #[error("Training error: {0}")]
    Training(String),

    /// Error with inference
    #[error("Inference error: {0}")]
    Inference(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown backbone architecture tag
    #[error("Unknown architecture '{0}' (expected one of: {1})")]
    UnknownArchitecture(String, String),

    /// Checkpoint read/write error
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Path not found
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        ClassifierError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for ClassifierError {
    fn from(err: toml::de::Error) -> Self {
        ClassifierError::Config(err.to_string())
    }
}

impl From<burn::record::RecorderError> for ClassifierError {
    fn from(err: burn::record::RecorderError) -> Self {
        ClassifierError::Checkpoint(err.to_string())
    }
}

/// Convenience Result type for transfer classifier operations
pub type Result<T> = std::result::Result<T, ClassifierError>;

/// Extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context with a closure (lazy evaluation)
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: std::error::Error> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| ClassifierError::InvalidInput(format!("{}: {}", f(), e)))
    }
}
