//! # Messaging Error Types
//!
//! Structured errors for the intake envelope and outbound notifications.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessagingError {
    #[error("Message serialization error: {message}")]
    Serialization { message: String },

    #[error("Unsupported envelope version: {version}")]
    UnsupportedVersion { version: String },

    #[error("Invalid message: {message}")]
    Validation { message: String },

    #[error("Publish failed for {event_type} after {attempts} attempt(s): {message}")]
    Publish {
        event_type: String,
        attempts: u32,
        message: String,
    },
}

impl MessagingError {
    /// Create a message serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Create an unsupported version error
    pub fn unsupported_version(version: impl Into<String>) -> Self {
        Self::UnsupportedVersion {
            version: version.into(),
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create a publish error
    pub fn publish(event_type: impl Into<String>, attempts: u32, message: impl Into<String>) -> Self {
        Self::Publish {
            event_type: event_type.into(),
            attempts,
            message: message.into(),
        }
    }
}

/// Conversion from serde_json::Error to MessagingError
impl From<serde_json::Error> for MessagingError {
    fn from(err: serde_json::Error) -> Self {
        MessagingError::serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            MessagingError::unsupported_version("2.0").to_string(),
            "Unsupported envelope version: 2.0"
        );
        let publish = MessagingError::publish("SUBMITTED", 3, "broker down");
        assert!(publish.to_string().contains("after 3 attempt(s)"));
    }

    #[test]
    fn test_serde_conversion() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(matches!(
            MessagingError::from(err),
            MessagingError::Serialization { .. }
        ));
    }
}
