//! Persistence error types
//!
//! `KvError` is what a key-value client reports; `PersistenceError` is what
//! the adapters surface to the hosting repository.

use stowage_config::ConfigError;
use stowage_core::CodecError;
use thiserror::Error;

use crate::lifecycle::LifecycleState;

/// Result type for key-value client calls
pub type KvResult<T> = Result<T, KvError>;

/// Result type for adapter operations
pub type PersistenceResult<T> = Result<T, PersistenceError>;

/// Failures reported by a key-value client
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KvError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Operation timed out: {0}")]
    Timeout(String),

    #[error("Invalid request: {0}")]
    Build(String),
}

impl KvError {
    pub fn transport<S: Into<String>>(msg: S) -> Self {
        Self::Transport(msg.into())
    }

    pub fn build<S: Into<String>>(msg: S) -> Self {
        Self::Build(msg.into())
    }
}

/// Errors surfaced by the entity stores
#[derive(Error, Debug)]
pub enum PersistenceError {
    /// Missing or duplicate initialization, or a table that does not match
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Item not found: {0}")]
    NotFound(String),

    /// A stored document does not decode
    #[error("Decode error: {0}")]
    Decode(String),

    /// A stored scalar or id string violates its grammar
    #[error("Format error: {0}")]
    Format(String),

    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// A property type or store feature outside what this layer supports
    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Batch write left {unprocessed} item(s) unprocessed")]
    IncompleteBatch { unprocessed: usize },

    #[error("Store is {actual}, expected {expected}")]
    InvalidState {
        expected: LifecycleState,
        actual: LifecycleState,
    },
}

impl PersistenceError {
    pub fn configuration<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    pub fn not_found<S: Into<String>>(id: S) -> Self {
        Self::NotFound(id.into())
    }

    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    pub fn unavailable<S: Into<String>>(msg: S) -> Self {
        Self::StoreUnavailable(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Errors that indicate a deployment or version problem rather than a
    /// per-call failure
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Unsupported(_))
    }
}

/// Conversion for calls made once the store is ready. A table that vanishes
/// after initialization is an outage; the provisioner reports missing tables
/// during `init` as `Configuration` itself.
impl From<KvError> for PersistenceError {
    fn from(err: KvError) -> Self {
        match err {
            KvError::TableNotFound(table) => {
                Self::StoreUnavailable(format!("table {} does not exist", table))
            }
            other => Self::StoreUnavailable(other.to_string()),
        }
    }
}

impl From<CodecError> for PersistenceError {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::Format { .. } => Self::Format(err.to_string()),
            CodecError::UnsupportedType(t) => {
                Self::Unsupported(format!("property type {}", t))
            }
            other => Self::Decode(other.to_string()),
        }
    }
}

impl From<ConfigError> for PersistenceError {
    fn from(err: ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kv_error_mapping() {
        let err: PersistenceError = KvError::TableNotFound("Bundles".to_string()).into();
        assert!(matches!(err, PersistenceError::StoreUnavailable(ref m) if m.contains("Bundles")));
        assert!(!err.is_fatal());

        let err: PersistenceError = KvError::Timeout("get_item".to_string()).into();
        assert!(matches!(err, PersistenceError::StoreUnavailable(_)));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_codec_error_mapping() {
        let err: PersistenceError = CodecError::format("entity id", "x", "bad").into();
        assert!(matches!(err, PersistenceError::Format(_)));

        let err: PersistenceError = CodecError::UnsupportedType("Geometry".to_string()).into();
        assert!(matches!(err, PersistenceError::Unsupported(_)));
        assert!(err.is_fatal());

        let err: PersistenceError = CodecError::deserialization("data missing").into();
        assert!(matches!(err, PersistenceError::Decode(_)));
    }

    #[test]
    fn test_not_found_helper() {
        assert!(PersistenceError::not_found("n1").is_not_found());
        assert!(!PersistenceError::decode("n1").is_not_found());
    }
}
