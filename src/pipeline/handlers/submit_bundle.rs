//! SubmitBundle: hand a bundle to the acceptance system and route the outcome.
//!
//! - Login failure: offline mode, same request back on in-progress
//! - Retryable error with attempts left: offline mode, next attempt on in-progress
//! - Anything else that fails: every member goes to SubmissionFailure
//! - Success: confirmations go out first. Rejected and carried members go to
//!   SubmissionFailure, which releases Cleanup of the confirmed ones once the
//!   FAILED event is out; with no failures Cleanup follows directly

use std::sync::Arc;

use tracing::{error, info, warn};

use crate::error::Result;
use crate::messaging::NotificationService;
use crate::models::{CleanupRequest, MemberFailure, SubmissionFailureContext, SubmitRequest};
use crate::pipeline::{Action, FollowUp, OfflineGate};
use crate::transmission::TransmissionSessionClient;

#[derive(Debug, Clone)]
pub struct SubmitBundleHandler {
    session: Arc<TransmissionSessionClient>,
    gate: OfflineGate,
    notifications: NotificationService,
    max_attempts: u32,
}

impl SubmitBundleHandler {
    pub fn new(
        session: Arc<TransmissionSessionClient>,
        gate: OfflineGate,
        notifications: NotificationService,
        max_attempts: u32,
    ) -> Self {
        Self {
            session,
            gate,
            notifications,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn session(&self) -> &Arc<TransmissionSessionClient> {
        &self.session
    }

    pub async fn handle(&self, request: SubmitRequest) -> Result<Vec<FollowUp>> {
        let batch_id = request.bundle.batch.batch_id;

        if !self.session.login().await {
            self.gate.set_offline("login failed before submit");
            warn!(
                batch_id,
                bundle_id = %request.bundle.bundle_id,
                attempt = request.attempt,
                "Login failed, bundle will be retried once the acceptance system is back"
            );
            return Ok(vec![FollowUp::in_progress(Action::SubmitBundle(request))]);
        }

        let bundle = &request.bundle;
        match self.session.submit_bundles(bundle, &bundle.batch).await {
            Ok(container) => {
                let confirmed = self
                    .notifications
                    .publish_submitted(&container.receipted)
                    .await;

                info!(
                    batch_id,
                    bundle_id = %bundle.bundle_id,
                    receipted = container.receipted.len(),
                    confirmed = confirmed.len(),
                    failed = container.failed.len(),
                    carried_failures = bundle.carried_failures.len(),
                    "📨 SUBMIT: Bundle receipted"
                );

                let mut failures = container.failed;
                failures.extend(bundle.carried_failures.iter().cloned());

                let cleanup = (!confirmed.is_empty()).then(|| CleanupRequest {
                    batch: bundle.batch.clone(),
                    submission_ids: confirmed,
                });

                // Rejected members must be reported before anything is deleted
                let follow_up = if !failures.is_empty() {
                    Some(Action::SubmissionFailure(SubmissionFailureContext {
                        batch: bundle.batch.clone(),
                        bundle_id: Some(bundle.bundle_id),
                        failures,
                        reason: "not accepted by the acceptance system".to_string(),
                        pending_cleanup: cleanup,
                    }))
                } else {
                    cleanup.map(Action::Cleanup)
                };
                Ok(follow_up.into_iter().map(FollowUp::in_progress).collect())
            }
            Err(e) if e.is_retryable() && request.attempt < self.max_attempts => {
                self.gate.set_offline(&e.to_string());
                warn!(
                    batch_id,
                    bundle_id = %bundle.bundle_id,
                    attempt = request.attempt,
                    max_attempts = self.max_attempts,
                    error = %e,
                    "Submit failed, retrying after the acceptance system recovers"
                );
                Ok(vec![FollowUp::in_progress(Action::SubmitBundle(
                    request.retry(),
                ))])
            }
            Err(e) => {
                error!(
                    batch_id,
                    bundle_id = %bundle.bundle_id,
                    attempt = request.attempt,
                    error = %e,
                    "❌ SUBMIT: Bundle failed"
                );
                let reason = e.source.to_string();
                let mut failures: Vec<MemberFailure> = e
                    .submission_ids()
                    .into_iter()
                    .map(|id| MemberFailure::new(id, reason.clone()))
                    .collect();
                failures.extend(e.bundle.carried_failures.iter().cloned());

                Ok(vec![FollowUp::in_progress(Action::SubmissionFailure(
                    SubmissionFailureContext {
                        batch: e.batch.clone(),
                        bundle_id: Some(e.bundle.bundle_id),
                        failures,
                        reason: format!("transmission failed: {reason}"),
                        pending_cleanup: None,
                    },
                ))])
            }
        }
    }
}
