//! # Storage Error Types

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    #[error("Object not found: {key}")]
    NotFound { key: String },

    #[error("Storage I/O failed: {operation} {key}: {message}")]
    Io {
        operation: String,
        key: String,
        message: String,
    },

    #[error("Invalid object key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("Malformed object {key}: {message}")]
    Malformed { key: String, message: String },
}

impl StorageError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn io(
        operation: impl Into<String>,
        key: impl Into<String>,
        message: impl std::fmt::Display,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            key: key.into(),
            message: message.to_string(),
        }
    }

    pub fn invalid_key(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidKey {
            key: key.into(),
            reason: reason.into(),
        }
    }

    pub fn malformed(key: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::Malformed {
            key: key.into(),
            message: message.to_string(),
        }
    }

    /// I/O failures may clear up on retry; a missing or malformed object will not.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Io { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }
}
