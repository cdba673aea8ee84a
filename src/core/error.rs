//! Error types for the X-ray classification pipeline

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum XRayError {
    #[error("Unknown split: {0} (expected train, validation or test)")]
    UnknownSplit(String),

    #[error("Cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot decode image {path}: {source}")]
    ImageDecode {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Invalid dataset: {0}")]
    InvalidDataset(String),

    #[error("Empty dataset: {0}")]
    EmptyDataset(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Plotting failed: {0}")]
    Plot(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl XRayError {
    /// Wrap an I/O error with the path that produced it
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        XRayError::Io {
            path: path.into(),
            source,
        }
    }
}

impl From<linfa_svm::SvmError> for XRayError {
    fn from(err: linfa_svm::SvmError) -> Self {
        XRayError::Training(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, XRayError>;
