//! # Intake
//!
//! Decodes intake envelopes from the message transport and hands supported
//! versions to the [`BatchAssembler`]. The transport sees only an
//! [`IntakeAck`]; it decides how to ack, nack or requeue.
//!
//! ```json
//! {
//!   "headers": { "version": "1.0" },
//!   "payload": {
//!     "userId": "...", "taxReturnId": "...", "submissionId": "...",
//!     "manifestPath": "...", "submissionPath": "...", "userContextPath": "..."
//!   }
//! }
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::MessagingError;
use crate::batching::BatchAssembler;
use crate::constants::versions;
use crate::models::Submission;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntakeHeaders {
    pub version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntakeEnvelope {
    pub headers: IntakeHeaders,
    pub payload: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntakePayloadV1 {
    pub user_id: Uuid,
    pub tax_return_id: Uuid,
    pub manifest_path: String,
    pub submission_path: String,
    pub user_context_path: String,
    pub submission_id: String,
}

impl From<IntakePayloadV1> for Submission {
    fn from(payload: IntakePayloadV1) -> Self {
        Submission {
            submission_id: payload.submission_id,
            tax_return_id: payload.tax_return_id,
            user_id: payload.user_id,
            manifest_path: payload.manifest_path,
            submission_path: payload.submission_path,
            user_context_path: payload.user_context_path,
        }
    }
}

/// What the transport should do with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntakeAck {
    /// Processed; acknowledge
    Ack,
    /// Transient failure; requeue
    Retry,
    /// Malformed or invalid; drop without requeue
    Reject,
    /// Version this build does not handle; logged only, not acknowledged as processed
    Unsupported,
}

/// Parse an intake message into a submission
pub fn decode_intake(body: &[u8]) -> Result<Submission, MessagingError> {
    let envelope: IntakeEnvelope = serde_json::from_slice(body)?;
    let version = envelope.headers.version.trim();
    if !versions::SUPPORTED_INTAKE_VERSIONS.contains(&version) {
        return Err(MessagingError::unsupported_version(version));
    }

    let payload: IntakePayloadV1 = serde_json::from_value(envelope.payload)
        .map_err(|e| MessagingError::validation(format!("invalid {version} payload: {e}")))?;
    let submission = Submission::from(payload);
    submission
        .validate()
        .map_err(|e| MessagingError::validation(e.to_string()))?;
    Ok(submission)
}

/// Consumption contract for the message transport
#[async_trait]
pub trait IntakeConsumer: Send + Sync {
    async fn handle_message(&self, body: &[u8]) -> IntakeAck;
}

/// Sink for envelope versions nobody handles
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedVersionHandler;

impl UnsupportedVersionHandler {
    pub fn handle(&self, version: &str, body: &[u8]) -> IntakeAck {
        warn!(
            version,
            size_bytes = body.len(),
            supported = ?versions::SUPPORTED_INTAKE_VERSIONS,
            "Dropping intake message with unsupported envelope version"
        );
        IntakeAck::Unsupported
    }
}

#[derive(Debug, Clone)]
pub struct IntakeDispatcher {
    assembler: Arc<BatchAssembler>,
    unsupported: UnsupportedVersionHandler,
}

impl IntakeDispatcher {
    pub fn new(assembler: Arc<BatchAssembler>) -> Self {
        Self {
            assembler,
            unsupported: UnsupportedVersionHandler,
        }
    }
}

#[async_trait]
impl IntakeConsumer for IntakeDispatcher {
    async fn handle_message(&self, body: &[u8]) -> IntakeAck {
        let submission = match decode_intake(body) {
            Ok(submission) => submission,
            Err(MessagingError::UnsupportedVersion { version }) => {
                return self.unsupported.handle(&version, body);
            }
            Err(e) => {
                warn!(error = %e, "Rejecting malformed intake message");
                return IntakeAck::Reject;
            }
        };

        match self.assembler.accept(&submission).await {
            Ok(placement) => {
                info!(
                    submission_id = %submission.submission_id,
                    batch_id = placement.batch.batch_id,
                    redelivered = placement.redelivered,
                    "📥 INTAKE: Submission accepted"
                );
                IntakeAck::Ack
            }
            Err(e) if e.is_transient() => {
                warn!(
                    submission_id = %submission.submission_id,
                    error = %e,
                    "Intake failed transiently, requesting redelivery"
                );
                IntakeAck::Retry
            }
            Err(e) => {
                error!(
                    submission_id = %submission.submission_id,
                    error = %e,
                    "Intake failed permanently"
                );
                IntakeAck::Reject
            }
        }
    }
}
