//! # Pipeline Constants
//!
//! Object layout names, envelope versions and event types shared by the
//! repository, the intake dispatcher and the notification publisher.

use serde::{Deserialize, Serialize};

/// Artifact written first for every member
pub const MANIFEST_FILE_NAME: &str = "manifest.xml";

pub const SUBMISSION_FILE_NAME: &str = "submission.xml";

/// Written last; a member without it is not counted
pub const USER_CONTEXT_FILE_NAME: &str = "userContext.json";

/// Durable record of the most recently opened batch number per control year
pub const HIGH_WATER_MARKER: &str = "_latest";

/// Envelope versions
pub mod versions {
    pub const INTAKE_V1: &str = "1.0";

    /// Intake versions routed to the assembler; anything else is log-only
    pub const SUPPORTED_INTAKE_VERSIONS: &[&str] = &[INTAKE_V1];

    pub const NOTIFICATION_V1: &str = "1.0";
}

/// Outbound notification event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NotificationEventType {
    Submitted,
    Failed,
}

impl NotificationEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationEventType::Submitted => "SUBMITTED",
            NotificationEventType::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for NotificationEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which action channel a request travels on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionChannel {
    /// Freshly closed batches
    New,
    /// Continuations of batches already moving through the pipeline
    InProgress,
}

impl ActionChannel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionChannel::New => "new",
            ActionChannel::InProgress => "in_progress",
        }
    }
}

impl std::fmt::Display for ActionChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
