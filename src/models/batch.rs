//! Batch identity and membership.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// `(control_year, batch_id)`
pub type BatchKey = (i32, u64);

/// A numbered folder of submissions for one application and control year.
///
/// Membership is never held here; it is whatever the object store lists under
/// `prefix`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Batch {
    pub application_id: String,
    pub control_year: i32,
    pub batch_id: u64,
    /// Key prefix, with trailing slash
    pub prefix: String,
}

impl Batch {
    pub fn key(&self) -> BatchKey {
        (self.control_year, self.batch_id)
    }
}

impl fmt::Display for Batch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.application_id, self.control_year, self.batch_id
        )
    }
}

/// A submission whose three artifacts are all present in a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchMember {
    pub submission_id: String,
    /// Last-modified of the newest of its artifacts
    pub completed_at: DateTime<Utc>,
}

/// Result of resolving where the next submission goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WritingBatch {
    pub batch: Batch,
    /// Set when this resolution closed the previous writable batch
    pub rotated_from: Option<Batch>,
}

impl WritingBatch {
    pub fn batch_id(&self) -> u64 {
        self.batch.batch_id
    }

    pub fn rotated(&self) -> bool {
        self.rotated_from.is_some()
    }
}
