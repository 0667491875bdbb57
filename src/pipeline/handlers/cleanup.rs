//! Cleanup: delete the artifacts of confirmed members. Members not named in
//! the request are never touched.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::batching::BatchRepository;
use crate::config::CleanupConfig;
use crate::error::Result;
use crate::logging::log_batch_operation;
use crate::models::CleanupRequest;
use crate::pipeline::FollowUp;

#[derive(Debug, Clone)]
pub struct CleanupHandler {
    repository: Arc<BatchRepository>,
    attempts: u32,
    backoff: Duration,
}

impl CleanupHandler {
    pub fn new(repository: Arc<BatchRepository>, config: &CleanupConfig) -> Self {
        Self {
            repository,
            attempts: config.delete_attempts.max(1),
            backoff: Duration::from_millis(config.retry_backoff_ms),
        }
    }

    pub async fn handle(&self, request: CleanupRequest) -> Result<Vec<FollowUp>> {
        let mut deleted = 0usize;
        let mut kept = Vec::new();

        for submission_id in &request.submission_ids {
            if self.delete_with_retry(&request, submission_id).await {
                deleted += 1;
            } else {
                kept.push(submission_id.as_str());
            }
        }

        if kept.is_empty() {
            info!(
                batch_id = request.batch.batch_id,
                control_year = request.batch.control_year,
                deleted,
                "🧹 CLEANUP: Confirmed members removed"
            );
            log_batch_operation(
                "cleanup",
                request.batch.batch_id,
                request.batch.control_year,
                "completed",
                None,
            );
        } else {
            warn!(
                batch_id = request.batch.batch_id,
                deleted,
                kept = ?kept,
                "Some confirmed members could not be removed; they are picked up again at the next startup"
            );
        }
        Ok(Vec::new())
    }

    async fn delete_with_retry(&self, request: &CleanupRequest, submission_id: &str) -> bool {
        for attempt in 1..=self.attempts {
            match self
                .repository
                .delete_member(&request.batch, submission_id)
                .await
            {
                Ok(()) => return true,
                Err(e) => {
                    warn!(
                        batch_id = request.batch.batch_id,
                        submission_id,
                        attempt,
                        error = %e,
                        "Artifact deletion failed"
                    );
                    if attempt < self.attempts {
                        tokio::time::sleep(self.backoff * attempt).await;
                    }
                }
            }
        }
        false
    }
}
