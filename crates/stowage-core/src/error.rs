//! Codec error types
//!
//! Errors raised while parsing canonical id/name/path strings or while
//! converting item states to and from their key-value documents.

use thiserror::Error;

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors produced by the value, bundle and state codecs
#[derive(Error, Debug)]
pub enum CodecError {
    /// A scalar or identifier string does not follow its grammar
    #[error("Malformed {kind} '{value}': {reason}")]
    Format {
        kind: &'static str,
        value: String,
        reason: String,
    },

    /// A recorded property type name is not part of the type enumeration
    #[error("Unsupported property type: {0}")]
    UnsupportedType(String),

    /// A value variant does not match the declared property type
    #[error("Value of type {actual} cannot be stored in a {declared} property")]
    TypeMismatch {
        declared: &'static str,
        actual: &'static str,
    },

    /// Document shape is wrong (missing fields, wrong JSON kinds)
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    /// Underlying JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CodecError {
    /// Create a format error for a value of the given kind
    pub fn format(kind: &'static str, value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Format {
            kind,
            value: value.into(),
            reason: reason.into(),
        }
    }

    /// Create a deserialization error
    pub fn deserialization<S: Into<String>>(msg: S) -> Self {
        Self::Deserialization(msg.into())
    }

    /// Check if the error comes from a grammar violation in a stored string
    pub fn is_format(&self) -> bool {
        matches!(self, Self::Format { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_error_message() {
        let err = CodecError::format("entity id", "nope", "invalid length");
        assert!(err.is_format());
        assert_eq!(err.to_string(), "Malformed entity id 'nope': invalid length");
    }

    #[test]
    fn test_json_error_converts() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: CodecError = json_err.into();
        assert!(matches!(err, CodecError::Json(_)));
        assert!(!err.is_format());
    }
}
