//! # Outbound Notifications
//!
//! Confirmation and failure events for downstream consumers, wrapped in a
//! versioned envelope:
//!
//! ```json
//! {
//!   "headers": { "version": "1.0", "eventType": "SUBMITTED" },
//!   "payload": {
//!     "statuses": [
//!       { "taxReturnId": "...", "submissionId": "...", "receiptId": "...", "receivedAt": "..." }
//!     ]
//!   }
//! }
//! ```
//!
//! Failure statuses carry `{submissionId, eventType: "FAILED", metadata}`.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::MessagingError;
use crate::config::NotificationConfig;
use crate::constants::{versions, NotificationEventType};
use crate::models::{ReceiptedSubmission, SubmissionFailureContext};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationHeaders {
    pub version: String,
    pub event_type: NotificationEventType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedStatus {
    pub tax_return_id: Uuid,
    pub submission_id: String,
    pub receipt_id: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailureMetadata {
    pub batch_id: u64,
    pub control_year: i32,
    /// Why this member failed
    pub reason: String,
    /// Why the batch, or part of it, ended in failure
    pub context: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FailedStatus {
    pub submission_id: String,
    pub event_type: NotificationEventType,
    pub metadata: FailureMetadata,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SubmissionStatus {
    Submitted(SubmittedStatus),
    Failed(FailedStatus),
}

impl SubmissionStatus {
    pub fn submission_id(&self) -> &str {
        match self {
            SubmissionStatus::Submitted(status) => &status.submission_id,
            SubmissionStatus::Failed(status) => &status.submission_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub statuses: Vec<SubmissionStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    pub headers: NotificationHeaders,
    pub payload: NotificationPayload,
}

impl NotificationEnvelope {
    pub fn submitted(receipts: &[ReceiptedSubmission]) -> Self {
        Self {
            headers: NotificationHeaders {
                version: versions::NOTIFICATION_V1.to_string(),
                event_type: NotificationEventType::Submitted,
            },
            payload: NotificationPayload {
                statuses: receipts
                    .iter()
                    .map(|receipt| {
                        SubmissionStatus::Submitted(SubmittedStatus {
                            tax_return_id: receipt.tax_return_id,
                            submission_id: receipt.submission_id.clone(),
                            receipt_id: receipt.receipt_id.clone(),
                            received_at: receipt.received_at,
                        })
                    })
                    .collect(),
            },
        }
    }

    pub fn failed(context: &SubmissionFailureContext) -> Self {
        Self {
            headers: NotificationHeaders {
                version: versions::NOTIFICATION_V1.to_string(),
                event_type: NotificationEventType::Failed,
            },
            payload: NotificationPayload {
                statuses: context
                    .failures
                    .iter()
                    .map(|failure| {
                        SubmissionStatus::Failed(FailedStatus {
                            submission_id: failure.submission_id.clone(),
                            event_type: NotificationEventType::Failed,
                            metadata: FailureMetadata {
                                batch_id: context.batch.batch_id,
                                control_year: context.batch.control_year,
                                reason: failure.reason.clone(),
                                context: context.reason.clone(),
                                bundle_id: context.bundle_id,
                            },
                        })
                    })
                    .collect(),
            },
        }
    }

    pub fn event_type(&self) -> NotificationEventType {
        self.headers.event_type
    }

    pub fn submission_ids(&self) -> Vec<String> {
        self.payload
            .statuses
            .iter()
            .map(|status| status.submission_id().to_string())
            .collect()
    }

    pub fn to_json(&self) -> Result<Vec<u8>, MessagingError> {
        Ok(serde_json::to_vec(self)?)
    }
}

#[async_trait]
pub trait NotificationPublisher: Send + Sync + Debug + 'static {
    async fn publish(&self, envelope: &NotificationEnvelope) -> Result<(), MessagingError>;

    fn publisher_name(&self) -> &'static str;
}

/// Keeps every published envelope in memory (for testing)
#[derive(Debug, Default)]
pub struct InMemoryNotificationPublisher {
    published: RwLock<Vec<NotificationEnvelope>>,
    failures_remaining: AtomicU32,
}

impl InMemoryNotificationPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` publish calls
    pub fn fail_next(&self, count: u32) {
        self.failures_remaining.store(count, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<NotificationEnvelope> {
        self.published.read().clone()
    }

    fn ids_for(&self, event_type: NotificationEventType) -> Vec<String> {
        self.published
            .read()
            .iter()
            .filter(|envelope| envelope.event_type() == event_type)
            .flat_map(NotificationEnvelope::submission_ids)
            .collect()
    }

    pub fn submitted_ids(&self) -> Vec<String> {
        self.ids_for(NotificationEventType::Submitted)
    }

    pub fn failed_ids(&self) -> Vec<String> {
        self.ids_for(NotificationEventType::Failed)
    }
}

#[async_trait]
impl NotificationPublisher for InMemoryNotificationPublisher {
    async fn publish(&self, envelope: &NotificationEnvelope) -> Result<(), MessagingError> {
        let failing = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(MessagingError::publish(
                envelope.event_type().as_str(),
                1,
                "injected publish failure",
            ));
        }
        self.published.write().push(envelope.clone());
        Ok(())
    }

    fn publisher_name(&self) -> &'static str {
        "in_memory"
    }
}

/// Forwards envelopes to a channel for an in-process consumer
#[derive(Debug, Clone)]
pub struct ChannelNotificationPublisher {
    tx: mpsc::UnboundedSender<NotificationEnvelope>,
}

impl ChannelNotificationPublisher {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<NotificationEnvelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl NotificationPublisher for ChannelNotificationPublisher {
    async fn publish(&self, envelope: &NotificationEnvelope) -> Result<(), MessagingError> {
        self.tx.send(envelope.clone()).map_err(|_| {
            MessagingError::publish(envelope.event_type().as_str(), 1, "receiver dropped")
        })
    }

    fn publisher_name(&self) -> &'static str {
        "channel"
    }
}

/// Publishes envelopes with bounded retry
#[derive(Debug, Clone)]
pub struct NotificationService {
    publisher: Arc<dyn NotificationPublisher>,
    attempts: u32,
    backoff: Duration,
}

impl NotificationService {
    pub fn new(publisher: Arc<dyn NotificationPublisher>, config: &NotificationConfig) -> Self {
        Self {
            publisher,
            attempts: config.publish_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    pub async fn publish(&self, envelope: &NotificationEnvelope) -> Result<(), MessagingError> {
        let event_type = envelope.event_type();
        let mut last_error = None;

        for attempt in 1..=self.attempts {
            match self.publisher.publish(envelope).await {
                Ok(()) => {
                    debug!(
                        event_type = %event_type,
                        statuses = envelope.payload.statuses.len(),
                        attempt,
                        publisher = self.publisher.publisher_name(),
                        "Published notification"
                    );
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        event_type = %event_type,
                        attempt,
                        max_attempts = self.attempts,
                        error = %e,
                        "Notification publish failed"
                    );
                    last_error = Some(e);
                    if attempt < self.attempts {
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                }
            }
        }

        Err(MessagingError::publish(
            event_type.as_str(),
            self.attempts,
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempt made".to_string()),
        ))
    }

    /// One SUBMITTED envelope per receipt. Returns the ids whose confirmation
    /// went out; only those may be cleaned up.
    pub async fn publish_submitted(&self, receipts: &[ReceiptedSubmission]) -> Vec<String> {
        let mut published = Vec::with_capacity(receipts.len());
        for receipt in receipts {
            let envelope = NotificationEnvelope::submitted(std::slice::from_ref(receipt));
            match self.publish(&envelope).await {
                Ok(()) => published.push(receipt.submission_id.clone()),
                Err(e) => warn!(
                    submission_id = %receipt.submission_id,
                    error = %e,
                    "Confirmation not published; artifacts will be kept"
                ),
            }
        }
        published
    }

    pub async fn publish_failed(&self, context: &SubmissionFailureContext) -> Result<(), MessagingError> {
        if context.failures.is_empty() {
            return Ok(());
        }
        self.publish(&NotificationEnvelope::failed(context)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Batch, MemberFailure};

    fn receipt(id: &str) -> ReceiptedSubmission {
        ReceiptedSubmission {
            submission_id: id.to_string(),
            receipt_id: format!("R-{id}"),
            tax_return_id: Uuid::nil(),
            received_at: Utc::now(),
        }
    }

    fn failure_context() -> SubmissionFailureContext {
        SubmissionFailureContext {
            batch: Batch {
                application_id: "app".to_string(),
                control_year: 2024,
                batch_id: 2,
                prefix: "submissions/app/2024/2/".to_string(),
            },
            bundle_id: None,
            failures: vec![MemberFailure::new("x", "rejected")],
            reason: "partial rejection".to_string(),
            pending_cleanup: None,
        }
    }

    fn service(publisher: Arc<InMemoryNotificationPublisher>, attempts: u32) -> NotificationService {
        NotificationService::new(
            publisher,
            &NotificationConfig {
                publish_attempts: attempts,
                retry_backoff_ms: 1,
            },
        )
    }

    #[test]
    fn test_submitted_envelope_wire_shape() {
        let envelope = NotificationEnvelope::submitted(&[receipt("a")]);
        let json: serde_json::Value =
            serde_json::from_slice(&envelope.to_json().unwrap()).unwrap();
        assert_eq!(json["headers"]["version"], "1.0");
        assert_eq!(json["headers"]["eventType"], "SUBMITTED");
        let status = &json["payload"]["statuses"][0];
        assert_eq!(status["submissionId"], "a");
        assert_eq!(status["receiptId"], "R-a");
        assert!(status.get("taxReturnId").is_some());
        assert!(status.get("receivedAt").is_some());
    }

    #[test]
    fn test_failed_envelope_wire_shape() {
        let envelope = NotificationEnvelope::failed(&failure_context());
        let json = serde_json::to_value(&envelope).unwrap();
        let status = &json["payload"]["statuses"][0];
        assert_eq!(status["eventType"], "FAILED");
        assert_eq!(status["metadata"]["batchId"], 2);
        assert_eq!(status["metadata"]["controlYear"], 2024);
        assert_eq!(status["metadata"]["reason"], "rejected");
        assert!(status["metadata"].get("bundleId").is_none());
    }

    #[tokio::test]
    async fn test_publish_retries_then_succeeds() {
        let publisher = Arc::new(InMemoryNotificationPublisher::new());
        publisher.fail_next(2);
        let service = service(publisher.clone(), 3);

        let published = service.publish_submitted(&[receipt("a")]).await;
        assert_eq!(published, vec!["a"]);
        assert_eq!(publisher.submitted_ids(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_publish_gives_up_after_attempts() {
        let publisher = Arc::new(InMemoryNotificationPublisher::new());
        publisher.fail_next(5);
        let service = service(publisher.clone(), 2);

        let err = service.publish_failed(&failure_context()).await.unwrap_err();
        assert!(matches!(err, MessagingError::Publish { attempts: 2, .. }));
        assert!(publisher.published().is_empty());
    }

    #[tokio::test]
    async fn test_channel_publisher_forwards() {
        let (publisher, mut rx) = ChannelNotificationPublisher::new();
        publisher
            .publish(&NotificationEnvelope::submitted(&[receipt("a")]))
            .await
            .unwrap();
        let envelope = rx.recv().await.unwrap();
        assert_eq!(envelope.submission_ids(), vec!["a"]);
    }
}
