//! Error types for the oncotree training engine

use thiserror::Error;

/// Result type alias for oncotree operations
pub type Result<T> = std::result::Result<T, OncoTreeError>;

/// Main error type for the oncotree engine
///
/// Every variant is a recoverable caller-side condition: the offending
/// value and the violated constraint are carried so the caller can
/// correct its input. Zero-denominator rate metrics are not errors;
/// they resolve to a defined value and are flagged inside the
/// [`EvaluationReport`](crate::metrics::EvaluationReport).
#[derive(Error, Debug)]
pub enum OncoTreeError {
    #[error("Invalid parameter: {name} = {value}, {reason}")]
    InvalidParameter {
        name: String,
        value: String,
        reason: String,
    },

    #[error("Training set is empty")]
    EmptyTrainingSet,

    #[error("Insufficient data: class {class} has {count} rows, at least {required} required")]
    InsufficientData {
        class: usize,
        count: usize,
        required: usize,
    },

    #[error("Invalid shape: expected {expected}, got {actual}")]
    ShapeError { expected: String, actual: String },

    #[error("Model not fitted")]
    NotFitted,

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl OncoTreeError {
    /// Shorthand for [`OncoTreeError::InvalidParameter`].
    pub fn invalid_parameter(
        name: impl Into<String>,
        value: impl ToString,
        reason: impl Into<String>,
    ) -> Self {
        OncoTreeError::InvalidParameter {
            name: name.into(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for OncoTreeError {
    fn from(err: serde_json::Error) -> Self {
        OncoTreeError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OncoTreeError::invalid_parameter("train_fraction", 1.5, "must be in (0, 1)");
        assert_eq!(
            err.to_string(),
            "Invalid parameter: train_fraction = 1.5, must be in (0, 1)"
        );
    }

    #[test]
    fn test_insufficient_data_display() {
        let err = OncoTreeError::InsufficientData {
            class: 1,
            count: 1,
            required: 2,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient data: class 1 has 1 rows, at least 2 required"
        );
    }
}
