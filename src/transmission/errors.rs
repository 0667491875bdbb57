//! # Transmission Error Types

use thiserror::Error;

use crate::models::{Batch, Bundle};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransmissionError {
    #[error("Login rejected: {reason}")]
    LoginRejected { reason: String },

    #[error("No active session; login first")]
    NotLoggedIn,

    #[error("Session expired or was revoked")]
    SessionExpired,

    #[error("Acceptance system unreachable: {message}")]
    Unreachable { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl TransmissionError {
    pub fn login_rejected(reason: impl Into<String>) -> Self {
        Self::LoginRejected {
            reason: reason.into(),
        }
    }

    pub fn unreachable(message: impl Into<String>) -> Self {
        Self::Unreachable {
            message: message.into(),
        }
    }

    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Whether the same bundle can be submitted again after a new login.
    /// Rejected credentials and protocol errors will fail the same way.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TransmissionError::NotLoggedIn
                | TransmissionError::SessionExpired
                | TransmissionError::Unreachable { .. }
                | TransmissionError::Timeout { .. }
        )
    }

    /// Whether the client should forget its session token
    pub fn invalidates_session(&self) -> bool {
        matches!(
            self,
            TransmissionError::NotLoggedIn
                | TransmissionError::SessionExpired
                | TransmissionError::Unreachable { .. }
                | TransmissionError::Timeout { .. }
        )
    }
}

/// A failed submit, carrying the batch and bundle it was for
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Submitting bundle {} for batch {batch} failed: {source}", .bundle.bundle_id)]
pub struct SubmissionFailureError {
    pub batch: Batch,
    pub bundle: Box<Bundle>,
    #[source]
    pub source: TransmissionError,
}

impl SubmissionFailureError {
    pub fn new(batch: Batch, bundle: Bundle, source: TransmissionError) -> Self {
        Self {
            batch,
            bundle: Box::new(bundle),
            source,
        }
    }

    /// Members of the bundle that did not get through
    pub fn submission_ids(&self) -> Vec<String> {
        self.bundle.submission_ids()
    }

    pub fn is_retryable(&self) -> bool {
        self.source.is_retryable()
    }
}
