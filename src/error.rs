//! Error types for the metaml AutoML driver

use thiserror::Error;

/// Result type alias for metaml operations
pub type Result<T> = std::result::Result<T, MetaMlError>;

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum MetaMlError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Catalog error: {0}")]
    CatalogError(String),

    #[error("Duplicate candidate in catalog: {algorithm} {parameters}")]
    DuplicateCandidate { algorithm: String, parameters: String },

    #[error("Knowledgebase error: {0}")]
    KnowledgebaseError(String),

    #[error("Recommender error: {0}")]
    RecommenderError(String),

    #[error("Unknown algorithm: {0}")]
    UnknownAlgorithm(String),

    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Training error: {0}")]
    TrainingError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Data error: {0}")]
    DataError(String),

    #[error("Model not fitted: call fit() before predict() or score()")]
    ModelNotFitted,

    #[error("Search exhausted: {0}")]
    Exhausted(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<serde_json::Error> for MetaMlError {
    fn from(err: serde_json::Error) -> Self {
        MetaMlError::SerializationError(err.to_string())
    }
}

impl From<polars::error::PolarsError> for MetaMlError {
    fn from(err: polars::error::PolarsError) -> Self {
        MetaMlError::DataError(err.to_string())
    }
}

impl From<ndarray::ShapeError> for MetaMlError {
    fn from(err: ndarray::ShapeError) -> Self {
        MetaMlError::ShapeError {
            expected: "valid shape".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MetaMlError::ConfigError("stopping_criteria must be positive".to_string());
        assert_eq!(
            err.to_string(),
            "Configuration error: stopping_criteria must be positive"
        );
    }

    #[test]
    fn test_invalid_parameter_display() {
        let err = MetaMlError::InvalidParameter {
            name: "max_depth".to_string(),
            value: "\"deep\"".to_string(),
            reason: "expected an integer or None".to_string(),
        };
        assert!(err.to_string().contains("max_depth"));
        assert!(err.to_string().contains("expected an integer"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: MetaMlError = io_err.into();
        assert!(matches!(err, MetaMlError::IoError(_)));
    }

    #[test]
    fn test_error_from_json() {
        let json_err = serde_json::from_str::<Vec<u8>>("not json").unwrap_err();
        let err: MetaMlError = json_err.into();
        assert!(matches!(err, MetaMlError::SerializationError(_)));
    }
}
