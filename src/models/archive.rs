//! Values carried between pipeline stages: archives, bundles and the
//! requests built from them.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use super::batch::Batch;
use super::submission::UserContext;

/// One member's stored artifacts, read back for packaging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionArchive {
    pub submission_id: String,
    pub manifest: Vec<u8>,
    pub submission: Vec<u8>,
    pub context: UserContext,
}

/// A member that dropped out of the pipeline, with the reason reported downstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberFailure {
    pub submission_id: String,
    pub reason: String,
}

impl MemberFailure {
    pub fn new(submission_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            submission_id: submission_id.into(),
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveCreationResult {
    pub batch: Batch,
    pub archives: Vec<SubmissionArchive>,
    pub failures: Vec<MemberFailure>,
}

/// Per-user details needed to emit confirmations once the bundle is receipted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionMetadata {
    pub user_id: Uuid,
    pub tax_return_id: Uuid,
    pub taxpayer_id: String,
    pub remote_address: String,
    pub signature_date: NaiveDate,
}

impl From<&UserContext> for SubmissionMetadata {
    fn from(context: &UserContext) -> Self {
        Self {
            user_id: context.user_id,
            tax_return_id: context.tax_return_id,
            taxpayer_id: context.taxpayer_id.clone(),
            remote_address: context.remote_address.clone(),
            signature_date: context.signature_date,
        }
    }
}

/// The transmittable form of a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub bundle_id: Uuid,
    pub batch: Batch,
    pub entries: Vec<SubmissionArchive>,
    /// Keyed by submission id
    pub metadata: BTreeMap<String, SubmissionMetadata>,
    /// Members that already failed during archiving; reported with the outcome
    pub carried_failures: Vec<MemberFailure>,
    pub created_at: DateTime<Utc>,
}

impl Bundle {
    pub fn assemble(result: ArchiveCreationResult, created_at: DateTime<Utc>) -> Self {
        let metadata = result
            .archives
            .iter()
            .map(|archive| {
                (
                    archive.submission_id.clone(),
                    SubmissionMetadata::from(&archive.context),
                )
            })
            .collect();

        Self {
            bundle_id: Uuid::new_v4(),
            batch: result.batch,
            entries: result.archives,
            metadata,
            carried_failures: result.failures,
            created_at,
        }
    }

    pub fn submission_ids(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|entry| entry.submission_id.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A bundle on its way to the acceptance system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitRequest {
    pub bundle: Bundle,
    /// 1-based
    pub attempt: u32,
}

impl SubmitRequest {
    pub fn first(bundle: Bundle) -> Self {
        Self { bundle, attempt: 1 }
    }

    pub fn retry(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }
}

/// Delete the artifacts of exactly these members
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupRequest {
    pub batch: Batch,
    pub submission_ids: Vec<String>,
}

/// Members to report as failed; their artifacts are left in place
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionFailureContext {
    pub batch: Batch,
    pub bundle_id: Option<Uuid>,
    pub failures: Vec<MemberFailure>,
    pub reason: String,
    /// Cleanup of confirmed members, released only once this report is out
    pub pending_cleanup: Option<CleanupRequest>,
}
