//! Domain error types
//!
//! This module defines error types specific to domain operations,
//! including validation failures and identifier parsing errors.

use thiserror::Error;

/// Errors that can occur in domain operations
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Invalid entity address (`table:id`)
    #[error("Invalid entity key: {0}")]
    InvalidEntityKey(String),

    /// Unknown enum value while parsing a stored or user-supplied name
    #[error("Unknown {kind}: {value}")]
    UnknownVariant {
        /// The kind of value being parsed (e.g. "severity")
        kind: &'static str,
        /// The offending input
        value: String,
    },

    /// Generic validation failure
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// ID parsing error
    #[error("Invalid ID format: {0}")]
    InvalidId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DomainError::InvalidEntityKey("account".to_string());
        assert_eq!(err.to_string(), "Invalid entity key: account");

        let err = DomainError::UnknownVariant {
            kind: "severity",
            value: "extreme".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown severity: extreme");
    }

    #[test]
    fn test_error_equality() {
        let err1 = DomainError::InvalidId("x".to_string());
        let err2 = DomainError::InvalidId("x".to_string());
        let err3 = DomainError::InvalidId("y".to_string());

        assert_eq!(err1, err2);
        assert_ne!(err1, err3);
    }
}
