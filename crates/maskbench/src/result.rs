//! Result and error types for maskbench.
//!
//! Per-job outcomes (schema rejection, false accept/reject, crashes) are
//! data, not errors. `BenchError` covers harness failures only.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for maskbench operations
pub type BenchResult<T> = Result<T, BenchError>;

/// Errors raised by the harness itself
#[derive(Debug, Error)]
pub enum BenchError {
    /// Corpus file could not be read or does not have the expected shape
    #[error("Invalid corpus file {path}: {message}")]
    Corpus {
        /// Offending file
        path: PathBuf,
        /// Error message
        message: String,
    },

    /// Run configuration is unusable
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Tokenizer could not be constructed
    #[error("Tokenizer error: {message}")]
    Tokenizer {
        /// Error message
        message: String,
    },

    /// Score and mask shapes disagree
    #[error("Shape mismatch: scores have {scores} rows, mask has {mask}")]
    ShapeMismatch {
        /// Rows in the score batch
        scores: usize,
        /// Rows in the mask
        mask: usize,
    },

    /// Score buffer length does not match the requested shape
    #[error("Score buffer holds {actual} values, expected {expected}")]
    ScoreLength {
        /// `batch * width`
        expected: usize,
        /// Values in the buffer
        actual: usize,
    },

    /// A claim was taken over before the owner persisted its result
    #[error("Claim on {job_id} is no longer held by this run")]
    OwnershipLost {
        /// Job whose marker changed owner
        job_id: String,
    },

    /// Process limit could not be applied
    #[error("Resource limit error: {message}")]
    Limit {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml_ng::Error),
}

impl BenchError {
    /// Create a corpus error
    #[must_use]
    pub fn corpus(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Corpus {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a tokenizer error
    #[must_use]
    pub fn tokenizer(message: impl Into<String>) -> Self {
        Self::Tokenizer {
            message: message.into(),
        }
    }

    /// Create a resource limit error
    #[must_use]
    pub fn limit(message: impl Into<String>) -> Self {
        Self::Limit {
            message: message.into(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_corpus_error_names_file() {
        let err = BenchError::corpus("corpus/a.json", "missing schema");
        let msg = err.to_string();
        assert!(msg.contains("corpus/a.json"));
        assert!(msg.contains("missing schema"));
    }

    #[test]
    fn test_shape_mismatch_message() {
        let err = BenchError::ShapeMismatch { scores: 3, mask: 2 };
        assert_eq!(err.to_string(), "Shape mismatch: scores have 3 rows, mask has 2");
    }

    #[test]
    fn test_score_length_message() {
        let err = BenchError::ScoreLength {
            expected: 6,
            actual: 5,
        };
        assert_eq!(err.to_string(), "Score buffer holds 5 values, expected 6");
    }

    #[test]
    fn test_io_error_from() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BenchError = io_err.into();
        assert!(err.to_string().contains("I/O"));
    }

    #[test]
    fn test_json_error_from() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: BenchError = json_err.into();
        assert!(err.to_string().starts_with("JSON error"));
    }
}
