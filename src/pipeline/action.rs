//! Pipeline actions: one variant per stage, immutable values.

use crate::constants::ActionChannel;
use crate::models::{
    ArchiveCreationResult, Batch, CleanupRequest, SubmissionFailureContext, SubmitRequest,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    CreateArchive,
    BundleArchive,
    SubmitBundle,
    Cleanup,
    SubmissionFailure,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::CreateArchive => "create_archive",
            Stage::BundleArchive => "bundle_archive",
            Stage::SubmitBundle => "submit_bundle",
            Stage::Cleanup => "cleanup",
            Stage::SubmissionFailure => "submission_failure",
        }
    }

    /// Stages that settle a member's outcome. SubmissionFailure may still
    /// release a pending Cleanup.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Stage::Cleanup | Stage::SubmissionFailure)
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    CreateArchive(Batch),
    BundleArchive(ArchiveCreationResult),
    SubmitBundle(SubmitRequest),
    Cleanup(CleanupRequest),
    SubmissionFailure(SubmissionFailureContext),
}

impl Action {
    pub fn stage(&self) -> Stage {
        match self {
            Action::CreateArchive(_) => Stage::CreateArchive,
            Action::BundleArchive(_) => Stage::BundleArchive,
            Action::SubmitBundle(_) => Stage::SubmitBundle,
            Action::Cleanup(_) => Stage::Cleanup,
            Action::SubmissionFailure(_) => Stage::SubmissionFailure,
        }
    }

    /// The batch this action advances
    pub fn batch(&self) -> &Batch {
        match self {
            Action::CreateArchive(batch) => batch,
            Action::BundleArchive(result) => &result.batch,
            Action::SubmitBundle(request) => &request.bundle.batch,
            Action::Cleanup(request) => &request.batch,
            Action::SubmissionFailure(context) => &context.batch,
        }
    }
}

/// An action a handler wants enqueued, and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowUp {
    pub channel: ActionChannel,
    pub action: Action,
}

impl FollowUp {
    pub fn in_progress(action: Action) -> Self {
        Self {
            channel: ActionChannel::InProgress,
            action,
        }
    }

    pub fn new_batch(action: Action) -> Self {
        Self {
            channel: ActionChannel::New,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_and_batch_accessors() {
        let batch = Batch {
            application_id: "app".to_string(),
            control_year: 2024,
            batch_id: 9,
            prefix: "submissions/app/2024/9/".to_string(),
        };
        let action = Action::Cleanup(CleanupRequest {
            batch: batch.clone(),
            submission_ids: vec!["a".to_string()],
        });
        assert_eq!(action.stage(), Stage::Cleanup);
        assert!(action.stage().is_terminal());
        assert_eq!(action.batch(), &batch);
        assert!(!Action::CreateArchive(batch).stage().is_terminal());
    }
}
