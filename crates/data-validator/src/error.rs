//! Validation Error Types

use thiserror::Error;

/// Errors during request validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Value out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// Text longer than allowed
    #[error("{field} is longer than {max} characters")]
    TooLong { field: &'static str, max: usize },

    /// Value not recognised for an enumerated field
    #[error("Invalid {field} parameter: {value}")]
    UnknownValue { field: &'static str, value: String },

    /// Invalid data format
    #[error("Invalid data format: {0}")]
    InvalidFormat(String),

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}
