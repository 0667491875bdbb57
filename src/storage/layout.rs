//! Object key layout for batches:
//!
//! ```text
//! {submissionsRoot}/{applicationId}/{controlYear}/{batchId}/{submissionId}/manifest.xml
//!                                                                        /submission.xml
//!                                                                        /userContext.json
//! {submissionsRoot}/{applicationId}/{controlYear}/_latest
//! ```

use crate::constants::{
    HIGH_WATER_MARKER, MANIFEST_FILE_NAME, SUBMISSION_FILE_NAME, USER_CONTEXT_FILE_NAME,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKind {
    Manifest,
    Submission,
    UserContext,
}

impl ArtifactKind {
    /// Write order; the user context goes last so its presence marks a complete member
    pub const ALL: [ArtifactKind; 3] = [
        ArtifactKind::Manifest,
        ArtifactKind::Submission,
        ArtifactKind::UserContext,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            ArtifactKind::Manifest => MANIFEST_FILE_NAME,
            ArtifactKind::Submission => SUBMISSION_FILE_NAME,
            ArtifactKind::UserContext => USER_CONTEXT_FILE_NAME,
        }
    }

    pub fn from_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.file_name() == name)
    }
}

/// A key that belongs to a batch member
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedKey {
    pub control_year: i32,
    pub batch_id: u64,
    pub submission_id: String,
    pub artifact: ArtifactKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchLayout {
    root: String,
}

impl BatchLayout {
    pub fn new(submissions_root: &str, application_id: &str) -> Self {
        let root = format!("{}/{}", submissions_root.trim_matches('/'), application_id);
        Self { root }
    }

    /// `{root}/{app}`, without a trailing slash
    pub fn application_prefix(&self) -> &str {
        &self.root
    }

    pub fn year_prefix(&self, control_year: i32) -> String {
        format!("{}/{}/", self.root, control_year)
    }

    pub fn batch_prefix(&self, control_year: i32, batch_id: u64) -> String {
        format!("{}/{}/{}/", self.root, control_year, batch_id)
    }

    pub fn member_prefix(&self, control_year: i32, batch_id: u64, submission_id: &str) -> String {
        format!("{}/{}/{}/{}/", self.root, control_year, batch_id, submission_id)
    }

    pub fn artifact_key(
        &self,
        control_year: i32,
        batch_id: u64,
        submission_id: &str,
        artifact: ArtifactKind,
    ) -> String {
        format!(
            "{}{}",
            self.member_prefix(control_year, batch_id, submission_id),
            artifact.file_name()
        )
    }

    pub fn high_water_key(&self, control_year: i32) -> String {
        format!("{}{}", self.year_prefix(control_year), HIGH_WATER_MARKER)
    }

    /// Parse a member artifact key. Anything else under the prefix (the
    /// high-water marker, stray files) yields `None`.
    pub fn parse(&self, key: &str) -> Option<ParsedKey> {
        let rest = key.strip_prefix(&self.root)?.strip_prefix('/')?;
        let mut segments = rest.split('/');

        let control_year = segments.next()?.parse::<i32>().ok()?;
        let batch_id = segments.next()?.parse::<u64>().ok()?;
        let submission_id = segments.next().filter(|s| !s.is_empty())?;
        let artifact = ArtifactKind::from_file_name(segments.next()?)?;
        if segments.next().is_some() {
            return None;
        }

        Some(ParsedKey {
            control_year,
            batch_id,
            submission_id: submission_id.to_string(),
            artifact,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_construction() {
        let layout = BatchLayout::new("/submissions/", "app-1");
        assert_eq!(layout.year_prefix(2025), "submissions/app-1/2025/");
        assert_eq!(
            layout.artifact_key(2025, 3, "sub-9", ArtifactKind::UserContext),
            "submissions/app-1/2025/3/sub-9/userContext.json"
        );
        assert_eq!(layout.high_water_key(2025), "submissions/app-1/2025/_latest");
    }

    #[test]
    fn test_parse_round_trips_member_keys() {
        let layout = BatchLayout::new("submissions", "app-1");
        let key = layout.artifact_key(2024, 12, "abc", ArtifactKind::Manifest);
        assert_eq!(
            layout.parse(&key),
            Some(ParsedKey {
                control_year: 2024,
                batch_id: 12,
                submission_id: "abc".to_string(),
                artifact: ArtifactKind::Manifest,
            })
        );
    }

    #[test]
    fn test_parse_ignores_non_member_keys() {
        let layout = BatchLayout::new("submissions", "app-1");
        assert!(layout.parse("submissions/app-1/2024/_latest").is_none());
        assert!(layout.parse("submissions/app-1/2024/7/abc/notes.txt").is_none());
        assert!(layout.parse("submissions/app-10/2024/7/abc/manifest.xml").is_none());
        assert!(layout.parse("submissions/app-1/2024/7/abc/manifest.xml/extra").is_none());
        assert!(layout.parse("submissions/app-1/2024/x/abc/manifest.xml").is_none());
    }
}
