//! CreateArchive: read every complete member of a closed batch back from the
//! store. Members that cannot be read are reported individually; only a
//! failure to list the batch stops it.

use std::sync::Arc;

use tracing::{info, warn};

use crate::batching::BatchRepository;
use crate::error::Result;
use crate::models::{ArchiveCreationResult, Batch, MemberFailure, SubmissionArchive, UserContext};
use crate::pipeline::{Action, FollowUp, WorkerPool};
use crate::storage::ArtifactKind;

#[derive(Debug, Clone)]
pub struct CreateArchiveHandler {
    repository: Arc<BatchRepository>,
    pool: WorkerPool,
}

impl CreateArchiveHandler {
    pub fn new(repository: Arc<BatchRepository>, pool: WorkerPool) -> Self {
        Self { repository, pool }
    }

    pub async fn handle(&self, batch: Batch) -> Result<Vec<FollowUp>> {
        let members = self.repository.list_members(&batch).await?;
        if members.is_empty() {
            info!(
                batch_id = batch.batch_id,
                control_year = batch.control_year,
                "Batch has no complete members, nothing to archive"
            );
            return Ok(Vec::new());
        }

        let outcomes = self
            .pool
            .map_bounded(members, |member| {
                self.read_archive(&batch, member.submission_id)
            })
            .await;

        let mut archives = Vec::new();
        let mut failures = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(archive) => archives.push(archive),
                Err(failure) => {
                    warn!(
                        batch_id = batch.batch_id,
                        submission_id = %failure.submission_id,
                        reason = %failure.reason,
                        "Member could not be archived"
                    );
                    failures.push(failure);
                }
            }
        }

        info!(
            batch_id = batch.batch_id,
            control_year = batch.control_year,
            archived = archives.len(),
            failed = failures.len(),
            "🗜️ ARCHIVE: Batch archived"
        );

        Ok(vec![FollowUp::in_progress(Action::BundleArchive(
            ArchiveCreationResult {
                batch,
                archives,
                failures,
            },
        ))])
    }

    async fn read_archive(
        &self,
        batch: &Batch,
        submission_id: String,
    ) -> std::result::Result<SubmissionArchive, MemberFailure> {
        let id = submission_id.as_str();
        let loaded = futures::try_join!(
            self.repository
                .read_artifact(batch, id, ArtifactKind::Manifest),
            self.repository
                .read_artifact(batch, id, ArtifactKind::Submission),
            self.repository
                .read_artifact(batch, id, ArtifactKind::UserContext),
        );
        let (manifest, submission, context) = match loaded {
            Ok(parts) => parts,
            Err(e) => return Err(MemberFailure::new(submission_id, e.to_string())),
        };

        let context = match UserContext::from_json(&context) {
            Ok(context) => context,
            Err(e) => {
                return Err(MemberFailure::new(
                    submission_id,
                    format!("user context unreadable: {e}"),
                ))
            }
        };
        if context.submission_id != submission_id {
            return Err(MemberFailure::new(
                submission_id,
                format!(
                    "user context belongs to submission {}",
                    context.submission_id
                ),
            ));
        }

        Ok(SubmissionArchive {
            submission_id,
            manifest,
            submission,
            context,
        })
    }
}
