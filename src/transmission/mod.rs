//! # Transmission
//!
//! Session-based hand-off of bundles to the external acceptance system.
//!
//! [`AcceptanceSystem`] is the wire seam: login, submit, logout. The
//! [`TransmissionSessionClient`] layers session state on top of it and turns
//! per-submission statuses into a [`SubmittedDataContainer`]. Neither retries;
//! retry and offline handling belong to the SubmitBundle stage and the health
//! gate.
//!
//! [`SubmittedDataContainer`]: crate::models::SubmittedDataContainer

pub mod errors;
pub mod session;
pub mod simulated;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::models::Bundle;

pub use errors::{SubmissionFailureError, TransmissionError};
pub use session::{SessionState, TransmissionSessionClient};
pub use simulated::SimulatedAcceptanceSystem;

/// Opaque session credential issued at login
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(***)")
    }
}

/// Per-submission outcome reported by the acceptance system
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransmissionStatus {
    Accepted {
        submission_id: String,
        receipt_id: String,
        received_at: DateTime<Utc>,
    },
    Rejected {
        submission_id: String,
        reason: String,
    },
}

impl TransmissionStatus {
    pub fn submission_id(&self) -> &str {
        match self {
            TransmissionStatus::Accepted { submission_id, .. }
            | TransmissionStatus::Rejected { submission_id, .. } => submission_id,
        }
    }
}

#[async_trait]
pub trait AcceptanceSystem: Send + Sync + fmt::Debug + 'static {
    async fn login(&self) -> Result<SessionToken, TransmissionError>;

    /// One status per bundle entry the system recognised
    async fn submit(
        &self,
        token: &SessionToken,
        bundle: &Bundle,
    ) -> Result<Vec<TransmissionStatus>, TransmissionError>;

    async fn logout(&self, token: &SessionToken) -> Result<(), TransmissionError>;

    fn system_name(&self) -> &'static str;
}
