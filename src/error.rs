//! # Pipeline Error Types
//!
//! Crate-wide error enum. Component errors (storage, transmission, messaging,
//! configuration) keep their own structured types and convert into
//! [`PipelineError`] at the seams where handlers and the loop meet.

use thiserror::Error;

use crate::config::ConfigurationError;
use crate::messaging::MessagingError;
use crate::storage::StorageError;
use crate::transmission::{SubmissionFailureError, TransmissionError};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
    #[error("Transmission error: {0}")]
    Transmission(#[from] TransmissionError),
    #[error("Submission failed: {0}")]
    Submission(Box<SubmissionFailureError>),
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
    #[error("Messaging error: {0}")]
    Messaging(#[from] MessagingError),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Queue error: {0}")]
    Queue(String),
}

impl From<SubmissionFailureError> for PipelineError {
    fn from(error: SubmissionFailureError) -> Self {
        PipelineError::Submission(Box::new(error))
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(error: serde_json::Error) -> Self {
        PipelineError::Validation(format!("JSON serialization error: {error}"))
    }
}

impl PipelineError {
    /// Whether retrying the same operation later can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            PipelineError::Storage(e) => e.is_transient(),
            PipelineError::Transmission(e) => e.is_retryable(),
            PipelineError::Submission(e) => e.source.is_retryable(),
            PipelineError::Messaging(e) => matches!(e, MessagingError::Publish { .. }),
            PipelineError::Queue(_) => true,
            PipelineError::Configuration(_)
            | PipelineError::Validation(_)
            | PipelineError::InvalidState(_) => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
