//! Submission records and the per-user context stored alongside them.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{PipelineError, Result};
use crate::storage::ArtifactKind;

/// A completed filing as announced by an intake event.
///
/// Immutable once received. Batches reference submissions by id through the
/// keys they are stored under; nothing holds a `Submission` across stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub submission_id: String,
    pub tax_return_id: Uuid,
    pub user_id: Uuid,
    /// Object key of the manifest produced upstream
    pub manifest_path: String,
    pub submission_path: String,
    pub user_context_path: String,
}

impl Submission {
    /// The submission id becomes a key segment, so it has to be one.
    pub fn validate(&self) -> Result<()> {
        let id = self.submission_id.as_str();
        if id.trim().is_empty() {
            return Err(PipelineError::Validation(
                "submissionId must not be empty".to_string(),
            ));
        }
        if id.contains('/') || id == "." || id == ".." {
            return Err(PipelineError::Validation(format!(
                "submissionId '{id}' is not a valid key segment"
            )));
        }
        for (field, path) in [
            ("manifestPath", &self.manifest_path),
            ("submissionPath", &self.submission_path),
            ("userContextPath", &self.user_context_path),
        ] {
            if path.trim().is_empty() {
                return Err(PipelineError::Validation(format!(
                    "{field} must not be empty for submission {id}"
                )));
            }
        }
        Ok(())
    }

    /// Where the upstream producer left the given artifact
    pub fn source_path(&self, artifact: ArtifactKind) -> &str {
        match artifact {
            ArtifactKind::Manifest => &self.manifest_path,
            ArtifactKind::Submission => &self.submission_path,
            ArtifactKind::UserContext => &self.user_context_path,
        }
    }
}

/// Contents of `userContext.json`: what the confirmation events need about
/// the filer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserContext {
    pub submission_id: String,
    pub user_id: Uuid,
    pub tax_return_id: Uuid,
    pub taxpayer_id: String,
    pub remote_address: String,
    pub signature_date: NaiveDate,
}

impl UserContext {
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}
