//! Error types for value and schema operations.

use thiserror::Error;

/// Result type for value operations.
pub type Result<T> = std::result::Result<T, ValueError>;

/// Errors raised while parsing types or asserting values against a schema.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValueError {
    /// A type expression could not be parsed.
    #[error("invalid type expression '{0}'")]
    InvalidType(String),

    /// A value is not an instance of the expected type.
    #[error("{label}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// What was being checked (activity label, attribute path).
        label: String,
        /// The expected type.
        expected: String,
        /// Description of the actual value.
        actual: String,
    },

    /// An attribute is not declared by the object type.
    #[error("type {type_name} has no attribute '{name}'")]
    NoSuchAttribute { type_name: String, name: String },

    /// A required attribute is absent.
    #[error("type {type_name}: missing required attribute '{name}'")]
    MissingAttribute { type_name: String, name: String },
}

impl ValueError {
    /// Create a type mismatch error.
    pub fn mismatch(
        label: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            label: label.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }
}
