//! Error types for the bridge

use thiserror::Error;

use crate::abi::Status;

/// Result type for native -> host operations.
pub type BindResult<T> = Result<T, BindError>;

/// Argument conversion failures; thrown to the host as `TypeError`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    #[error("Insufficient number of arguments.")]
    InsufficientArguments,

    #[error("Error converting this from {actual} to {expected}.")]
    ReceiverMismatch { expected: String, actual: String },

    #[error("Error processing argument at index {index}, conversion failure from {actual} to {expected}.")]
    ArgumentMismatch {
        index: usize,
        expected: String,
        actual: String,
    },
}

/// Errors surfaced to native callers.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BindError {
    #[error("host call failed: {0}")]
    Abi(#[from] Status),

    #[error(transparent)]
    Conversion(#[from] ConversionError),

    #[error("cannot convert return value from {actual} to {expected}")]
    ReturnMismatch { expected: String, actual: String },

    #[error("The function has been garbage collected")]
    CallableCollected,

    #[error("uncaught exception: {0}")]
    UncaughtException(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_messages() {
        assert_eq!(
            ConversionError::InsufficientArguments.to_string(),
            "Insufficient number of arguments."
        );

        let err = ConversionError::ArgumentMismatch {
            index: 1,
            expected: "Integer".into(),
            actual: "String".into(),
        };
        assert_eq!(
            err.to_string(),
            "Error processing argument at index 1, conversion failure from String to Integer."
        );

        let err = ConversionError::ReceiverMismatch {
            expected: "TestClass".into(),
            actual: "Object".into(),
        };
        assert_eq!(err.to_string(), "Error converting this from Object to TestClass.");
    }

    #[test]
    fn test_bind_error_from_status() {
        let err: BindError = Status::PendingException.into();
        assert_eq!(err, BindError::Abi(Status::PendingException));
    }
}
