//! Outcome of a transmit attempt.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::archive::MemberFailure;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReceiptedSubmission {
    pub submission_id: String,
    pub receipt_id: String,
    pub tax_return_id: Uuid,
    pub received_at: DateTime<Utc>,
}

/// Receipted and failed members of one bundle, each reportable on its own
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmittedDataContainer {
    pub receipted: Vec<ReceiptedSubmission>,
    pub failed: Vec<MemberFailure>,
}

impl SubmittedDataContainer {
    pub fn receipted_ids(&self) -> Vec<String> {
        self.receipted
            .iter()
            .map(|r| r.submission_id.clone())
            .collect()
    }

    pub fn is_fully_receipted(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn total(&self) -> usize {
        self.receipted.len() + self.failed.len()
    }
}
