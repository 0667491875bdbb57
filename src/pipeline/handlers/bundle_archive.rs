//! BundleArchive: package the archived members into one transmittable bundle.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::Result;
use crate::models::{ArchiveCreationResult, Bundle, SubmissionFailureContext, SubmitRequest};
use crate::pipeline::{Action, FollowUp};
use crate::utils::Clock;

#[derive(Debug, Clone)]
pub struct BundleArchiveHandler {
    clock: Arc<dyn Clock>,
}

impl BundleArchiveHandler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub async fn handle(&self, result: ArchiveCreationResult) -> Result<Vec<FollowUp>> {
        if result.archives.is_empty() {
            warn!(
                batch_id = result.batch.batch_id,
                failed = result.failures.len(),
                "No member of the batch could be archived"
            );
            return Ok(vec![FollowUp::in_progress(Action::SubmissionFailure(
                SubmissionFailureContext {
                    batch: result.batch,
                    bundle_id: None,
                    failures: result.failures,
                    reason: "no member of the batch could be archived".to_string(),
                    pending_cleanup: None,
                },
            ))]);
        }

        let bundle = Bundle::assemble(result, self.clock.now());
        info!(
            batch_id = bundle.batch.batch_id,
            bundle_id = %bundle.bundle_id,
            entries = bundle.len(),
            carried_failures = bundle.carried_failures.len(),
            "📦 BUNDLE: Bundle assembled"
        );

        Ok(vec![FollowUp::in_progress(Action::SubmitBundle(
            SubmitRequest::first(bundle),
        ))])
    }
}
