//! SubmissionFailure: publish one FAILED event for the affected members.
//! Their artifacts stay where they are. A pending Cleanup of the confirmed
//! members is released only after the event is out.

use tracing::warn;

use crate::error::Result;
use crate::logging::log_batch_operation;
use crate::messaging::NotificationService;
use crate::models::SubmissionFailureContext;
use crate::pipeline::{Action, FollowUp};

#[derive(Debug, Clone)]
pub struct SubmissionFailureHandler {
    notifications: NotificationService,
}

impl SubmissionFailureHandler {
    pub fn new(notifications: NotificationService) -> Self {
        Self { notifications }
    }

    pub async fn handle(&self, mut context: SubmissionFailureContext) -> Result<Vec<FollowUp>> {
        warn!(
            batch_id = context.batch.batch_id,
            control_year = context.batch.control_year,
            bundle_id = ?context.bundle_id,
            failed = context.failures.len(),
            reason = %context.reason,
            "⚠️ FAILURE: Reporting failed submissions"
        );
        self.notifications.publish_failed(&context).await?;
        log_batch_operation(
            "submission_failure",
            context.batch.batch_id,
            context.batch.control_year,
            "reported",
            Some(&context.reason),
        );
        Ok(context
            .pending_cleanup
            .take()
            .map(|cleanup| FollowUp::in_progress(Action::Cleanup(cleanup)))
            .into_iter()
            .collect())
    }
}
