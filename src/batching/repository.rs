//! # Batch Repository
//!
//! Durable, object-store-backed index of batches. Nothing about batch state is
//! cached in memory: membership, counts and ages are read back from listings
//! on every call, so the answers survive restarts.
//!
//! ## Single writer
//!
//! Exactly one process may write batches for a given application id and
//! control year. Two writers could both see the same writable batch, both
//! decide to rotate, and interleave members across a batch that one of them
//! already handed to the pipeline. Deployments must pin an application id to
//! one running instance.
//!
//! ## High-water marker
//!
//! `{yearPrefix}/_latest` records the most recently opened batch number. It is
//! written whenever a resolution opens a batch, so numbers stay monotonic after
//! cleanup empties the newest folders, and a rotation committed by one caller
//! is never detected again by the next.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::rotation::{decide_rotation, BatchStats, RotationDecision, RotationPolicy};
use crate::config::PipelineConfig;
use crate::control_year::{policy_from_config, ControlYearPolicy};
use crate::error::{PipelineError, Result};
use crate::models::{Batch, BatchMember, Submission, WritingBatch};
use crate::storage::{ArtifactKind, BatchLayout, ObjectMeta, ObjectStore, StorageError};
use crate::utils::Clock;

/// Everything listed under one control year, grouped by batch
#[derive(Debug, Default)]
struct YearListing {
    /// Every batch folder with at least one object, complete members or not
    batch_ids: BTreeSet<u64>,
    members: BTreeMap<u64, Vec<BatchMember>>,
    high_water: Option<u64>,
}

impl YearListing {
    fn most_recent(&self) -> Option<u64> {
        let listed = self.batch_ids.iter().next_back().copied();
        match (listed, self.high_water) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }

    /// Batch already holding `submission_id` as a complete member
    fn batch_holding(&self, submission_id: &str) -> Option<u64> {
        self.members.iter().find_map(|(batch_id, members)| {
            members
                .iter()
                .any(|member| member.submission_id == submission_id)
                .then_some(*batch_id)
        })
    }

    fn members_of(&self, batch_id: u64) -> &[BatchMember] {
        self.members
            .get(&batch_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

/// Fold a listing into complete members. A member counts only when all three
/// artifacts are present; its completion time is the newest of the three.
fn group_members(layout: &BatchLayout, objects: &[ObjectMeta]) -> BTreeMap<u64, Vec<BatchMember>> {
    let mut seen: BTreeMap<(u64, String), (BTreeSet<ArtifactKind>, DateTime<Utc>)> =
        BTreeMap::new();

    for meta in objects {
        let Some(parsed) = layout.parse(&meta.key) else {
            continue;
        };
        let entry = seen
            .entry((parsed.batch_id, parsed.submission_id))
            .or_insert_with(|| (BTreeSet::new(), meta.last_modified));
        entry.0.insert(parsed.artifact);
        entry.1 = entry.1.max(meta.last_modified);
    }

    let mut members: BTreeMap<u64, Vec<BatchMember>> = BTreeMap::new();
    for ((batch_id, submission_id), (artifacts, completed_at)) in seen {
        if artifacts.len() == ArtifactKind::ALL.len() {
            members.entry(batch_id).or_default().push(BatchMember {
                submission_id,
                completed_at,
            });
        }
    }
    members
}

/// Where an incoming submission should go
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlacementTarget {
    /// Already a complete member of this batch; nothing to write
    Existing(Batch),
    /// Not stored yet; write it to the writable batch
    Writable(WritingBatch),
}

#[derive(Debug)]
pub struct BatchRepository {
    store: Arc<dyn ObjectStore>,
    layout: BatchLayout,
    application_id: String,
    rotation: RotationPolicy,
    control_year: Box<dyn ControlYearPolicy>,
    clock: Arc<dyn Clock>,
}

impl BatchRepository {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        application_id: impl Into<String>,
        submissions_root: &str,
        rotation: RotationPolicy,
        control_year: Box<dyn ControlYearPolicy>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let application_id = application_id.into();
        Self {
            layout: BatchLayout::new(submissions_root, &application_id),
            store,
            application_id,
            rotation,
            control_year,
            clock,
        }
    }

    pub fn from_config(
        store: Arc<dyn ObjectStore>,
        config: &PipelineConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(
            store,
            config.application_id.clone(),
            &config.storage.submissions_root,
            RotationPolicy::from_config(&config.batching),
            policy_from_config(&config.control_year),
            clock,
        )
    }

    pub fn application_id(&self) -> &str {
        &self.application_id
    }

    pub fn layout(&self) -> &BatchLayout {
        &self.layout
    }

    pub fn rotation_policy(&self) -> &RotationPolicy {
        &self.rotation
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Control year for batches written now
    pub fn control_year(&self) -> i32 {
        self.control_year.control_year(self.clock.now())
    }

    pub fn batch(&self, control_year: i32, batch_id: u64) -> Batch {
        Batch {
            application_id: self.application_id.clone(),
            control_year,
            batch_id,
            prefix: self.layout.batch_prefix(control_year, batch_id),
        }
    }

    async fn read_high_water(&self, control_year: i32) -> Result<Option<u64>> {
        let key = self.layout.high_water_key(control_year);
        let bytes = match self.store.get(&key).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let text = String::from_utf8_lossy(&bytes);
        let value = text
            .trim()
            .parse::<u64>()
            .map_err(|e| StorageError::malformed(&key, e))?;
        Ok(Some(value))
    }

    async fn write_high_water(&self, control_year: i32, batch_id: u64) -> Result<()> {
        let key = self.layout.high_water_key(control_year);
        self.store
            .put(&key, batch_id.to_string().into_bytes())
            .await?;
        Ok(())
    }

    async fn list_year(&self, control_year: i32) -> Result<YearListing> {
        let objects = self.store.list(&self.layout.year_prefix(control_year)).await?;
        let batch_ids = objects
            .iter()
            .filter_map(|meta| self.layout.parse(&meta.key))
            .map(|parsed| parsed.batch_id)
            .collect();
        let members = group_members(&self.layout, &objects);
        let high_water = self.read_high_water(control_year).await?;

        Ok(YearListing {
            batch_ids,
            members,
            high_water,
        })
    }

    /// Decide which batch the next submission belongs in, committing any
    /// rotation that is due.
    ///
    /// The most recent batch (highest listed number or high-water marker,
    /// whichever is larger) stays writable until it reaches the size limit or
    /// its oldest member reaches the timeout; then the next number opens.
    pub async fn resolve_writing_batch(&self) -> Result<WritingBatch> {
        let now = self.clock.now();
        let control_year = self.control_year.control_year(now);
        let listing = self.list_year(control_year).await?;
        self.resolve_from_listing(&listing, control_year, now).await
    }

    /// Resolve where `submission_id` belongs. A submission that is already a
    /// complete member of any batch in the control year stays there, and no
    /// rotation is committed on its behalf.
    pub async fn resolve_placement(&self, submission_id: &str) -> Result<PlacementTarget> {
        let now = self.clock.now();
        let control_year = self.control_year.control_year(now);
        let listing = self.list_year(control_year).await?;

        if let Some(batch_id) = listing.batch_holding(submission_id) {
            return Ok(PlacementTarget::Existing(self.batch(control_year, batch_id)));
        }
        Ok(PlacementTarget::Writable(
            self.resolve_from_listing(&listing, control_year, now).await?,
        ))
    }

    async fn resolve_from_listing(
        &self,
        listing: &YearListing,
        control_year: i32,
        now: DateTime<Utc>,
    ) -> Result<WritingBatch> {
        let Some(current) = listing.most_recent() else {
            self.write_high_water(control_year, 0).await?;
            info!(
                control_year,
                batch_id = 0,
                application_id = %self.application_id,
                "📂 BATCH: Opened first batch for control year"
            );
            return Ok(WritingBatch {
                batch: self.batch(control_year, 0),
                rotated_from: None,
            });
        };

        let stats = BatchStats::from_members(listing.members_of(current));
        match decide_rotation(&stats, now, &self.rotation) {
            RotationDecision::Keep => {
                if listing.high_water != Some(current) {
                    self.write_high_water(control_year, current).await?;
                }
                debug!(
                    control_year,
                    batch_id = current,
                    member_count = stats.member_count,
                    "Writable batch unchanged"
                );
                Ok(WritingBatch {
                    batch: self.batch(control_year, current),
                    rotated_from: None,
                })
            }
            RotationDecision::Rotate(reason) => {
                let next = current + 1;
                self.write_high_water(control_year, next).await?;
                info!(
                    control_year,
                    closed_batch_id = current,
                    batch_id = next,
                    member_count = stats.member_count,
                    reason = reason.as_str(),
                    "🔄 BATCH: Rotated writable batch"
                );
                Ok(WritingBatch {
                    batch: self.batch(control_year, next),
                    rotated_from: Some(self.batch(control_year, current)),
                })
            }
        }
    }

    /// Number of the batch the next submission goes to. Commits a due
    /// rotation like [`resolve_writing_batch`](Self::resolve_writing_batch).
    pub async fn current_writing_batch(&self) -> Result<u64> {
        Ok(self.resolve_writing_batch().await?.batch_id())
    }

    /// Copy a submission's three artifacts under the batch.
    ///
    /// All sources are fetched before anything is written, and the user
    /// context goes last, so a member is either fully present or not counted.
    /// Destination keys depend only on the batch and submission id, so a retry
    /// overwrites rather than duplicates. If a write fails midway the written
    /// artifacts are removed again.
    pub async fn add_submission(&self, batch: &Batch, submission: &Submission) -> Result<()> {
        submission.validate()?;

        let (manifest, document, context) = futures::try_join!(
            self.store.get(submission.source_path(ArtifactKind::Manifest)),
            self.store.get(submission.source_path(ArtifactKind::Submission)),
            self.store.get(submission.source_path(ArtifactKind::UserContext)),
        )?;

        crate::models::UserContext::from_json(&context).map_err(|e| {
            PipelineError::Validation(format!(
                "user context for submission {} is unreadable: {e}",
                submission.submission_id
            ))
        })?;

        let mut written = Vec::with_capacity(ArtifactKind::ALL.len());
        for (artifact, bytes) in [
            (ArtifactKind::Manifest, manifest),
            (ArtifactKind::Submission, document),
            (ArtifactKind::UserContext, context),
        ] {
            let key = self.layout.artifact_key(
                batch.control_year,
                batch.batch_id,
                &submission.submission_id,
                artifact,
            );
            if let Err(e) = self.store.put(&key, bytes).await {
                self.remove_keys(&written).await;
                return Err(e.into());
            }
            written.push(key);
        }

        debug!(
            batch_id = batch.batch_id,
            control_year = batch.control_year,
            submission_id = %submission.submission_id,
            "Stored submission artifacts"
        );
        Ok(())
    }

    async fn remove_keys(&self, keys: &[String]) {
        for key in keys {
            if let Err(e) = self.store.delete(key).await {
                warn!(key = %key, error = %e, "Failed to remove partially written artifact");
            }
        }
    }

    /// Every batch in the current control year except the writable one,
    /// oldest first. Resolving the writable batch here commits a due rotation,
    /// so a batch that timed out while the process was down is included.
    pub async fn get_unprocessed_batches(&self) -> Result<Vec<Batch>> {
        let writable = self.resolve_writing_batch().await?;
        let control_year = writable.batch.control_year;
        let listing = self.list_year(control_year).await?;

        Ok(listing
            .batch_ids
            .iter()
            .filter(|&&id| id != writable.batch_id())
            .map(|&id| self.batch(control_year, id))
            .collect())
    }

    /// Complete members of a batch, ordered by submission id
    pub async fn list_members(&self, batch: &Batch) -> Result<Vec<BatchMember>> {
        let objects = self.store.list(&batch.prefix).await?;
        Ok(group_members(&self.layout, &objects)
            .remove(&batch.batch_id)
            .unwrap_or_default())
    }

    pub async fn read_artifact(
        &self,
        batch: &Batch,
        submission_id: &str,
        artifact: ArtifactKind,
    ) -> Result<Vec<u8>> {
        let key =
            self.layout
                .artifact_key(batch.control_year, batch.batch_id, submission_id, artifact);
        Ok(self.store.get(&key).await?)
    }

    /// Delete one member's artifacts. The user context goes first so a partly
    /// deleted member stops counting immediately.
    pub async fn delete_member(&self, batch: &Batch, submission_id: &str) -> Result<()> {
        for artifact in ArtifactKind::ALL.into_iter().rev() {
            let key = self.layout.artifact_key(
                batch.control_year,
                batch.batch_id,
                submission_id,
                artifact,
            );
            self.store.delete(&key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_year::FixedYearPolicy;
    use crate::storage::InMemoryObjectStore;
    use crate::utils::ManualClock;
    use chrono::{Duration, TimeZone};
    use uuid::Uuid;

    struct Fixture {
        store: Arc<InMemoryObjectStore>,
        clock: Arc<ManualClock>,
        repository: BatchRepository,
    }

    fn fixture(max: usize, timeout_minutes: i64) -> Fixture {
        let start = Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let store = Arc::new(InMemoryObjectStore::with_clock(clock.clone()));
        let repository = BatchRepository::new(
            store.clone(),
            "app",
            "submissions",
            RotationPolicy::new(max, Duration::minutes(timeout_minutes)),
            Box::new(FixedYearPolicy { year: 2024 }),
            clock.clone(),
        );
        Fixture {
            store,
            clock,
            repository,
        }
    }

    async fn staged(store: &InMemoryObjectStore, id: &str) -> Submission {
        let context = serde_json::json!({
            "submissionId": id,
            "userId": Uuid::nil(),
            "taxReturnId": Uuid::nil(),
            "taxpayerId": "t",
            "remoteAddress": "127.0.0.1",
            "signatureDate": "2025-01-31"
        });
        let base = format!("incoming/{id}");
        store.put(&format!("{base}/m.xml"), b"<m/>".to_vec()).await.unwrap();
        store.put(&format!("{base}/s.xml"), b"<s/>".to_vec()).await.unwrap();
        store
            .put(&format!("{base}/u.json"), context.to_string().into_bytes())
            .await
            .unwrap();
        Submission {
            submission_id: id.to_string(),
            tax_return_id: Uuid::nil(),
            user_id: Uuid::nil(),
            manifest_path: format!("{base}/m.xml"),
            submission_path: format!("{base}/s.xml"),
            user_context_path: format!("{base}/u.json"),
        }
    }

    #[tokio::test]
    async fn test_first_resolution_opens_batch_zero() {
        let f = fixture(2, 10);
        let writing = f.repository.resolve_writing_batch().await.unwrap();
        assert_eq!(writing.batch_id(), 0);
        assert!(!writing.rotated());
        assert_eq!(writing.batch.prefix, "submissions/app/2024/0/");
        assert!(f.store.keys().contains(&"submissions/app/2024/_latest".to_string()));
    }

    #[tokio::test]
    async fn test_add_submission_writes_three_artifacts() {
        let f = fixture(2, 10);
        let submission = staged(&f.store, "sub-1").await;
        let batch = f.repository.batch(2024, 0);

        f.repository.add_submission(&batch, &submission).await.unwrap();
        f.repository.add_submission(&batch, &submission).await.unwrap();

        let members = f.repository.list_members(&batch).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].submission_id, "sub-1");
        assert_eq!(
            f.repository
                .read_artifact(&batch, "sub-1", ArtifactKind::Manifest)
                .await
                .unwrap(),
            b"<m/>"
        );
    }

    #[tokio::test]
    async fn test_failed_write_leaves_no_partial_member() {
        let f = fixture(2, 10);
        let submission = staged(&f.store, "sub-1").await;
        let batch = f.repository.batch(2024, 0);
        f.store.fail_on(
            crate::storage::StorageOperation::Put,
            "sub-1/userContext.json",
            Some(1),
        );

        assert!(f.repository.add_submission(&batch, &submission).await.is_err());
        assert!(f.repository.list_members(&batch).await.unwrap().is_empty());
        assert!(!f
            .store
            .keys()
            .iter()
            .any(|key| key.starts_with("submissions/app/2024/0/")));
    }

    #[tokio::test]
    async fn test_missing_source_is_not_found() {
        let f = fixture(2, 10);
        let mut submission = staged(&f.store, "sub-1").await;
        submission.manifest_path = "incoming/absent.xml".to_string();
        let err = f
            .repository
            .add_submission(&f.repository.batch(2024, 0), &submission)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Storage(ref e) if e.is_not_found()));
    }

    #[tokio::test]
    async fn test_rotation_on_size_is_committed_once() {
        let f = fixture(2, 10);
        for id in ["a", "b"] {
            let batch = f.repository.resolve_writing_batch().await.unwrap().batch;
            let submission = staged(&f.store, id).await;
            f.repository.add_submission(&batch, &submission).await.unwrap();
        }

        let rotated = f.repository.resolve_writing_batch().await.unwrap();
        assert_eq!(rotated.batch_id(), 1);
        assert_eq!(rotated.rotated_from.map(|b| b.batch_id), Some(0));

        let again = f.repository.resolve_writing_batch().await.unwrap();
        assert_eq!(again.batch_id(), 1);
        assert!(!again.rotated());
    }

    #[tokio::test]
    async fn test_rotation_on_timeout() {
        let f = fixture(100, 10);
        let batch = f.repository.resolve_writing_batch().await.unwrap().batch;
        let submission = staged(&f.store, "a").await;
        f.repository.add_submission(&batch, &submission).await.unwrap();

        f.clock.advance(Duration::minutes(9));
        assert_eq!(f.repository.current_writing_batch().await.unwrap(), 0);

        f.clock.advance(Duration::minutes(1));
        assert_eq!(f.repository.current_writing_batch().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_numbers_stay_monotonic_after_cleanup() {
        let f = fixture(1, 10);
        let batch = f.repository.resolve_writing_batch().await.unwrap().batch;
        let submission = staged(&f.store, "a").await;
        f.repository.add_submission(&batch, &submission).await.unwrap();
        assert_eq!(f.repository.current_writing_batch().await.unwrap(), 1);

        f.repository.delete_member(&batch, "a").await.unwrap();
        assert!(f.repository.list_members(&batch).await.unwrap().is_empty());
        assert_eq!(f.repository.current_writing_batch().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unprocessed_excludes_writable_batch() {
        let f = fixture(1, 10);
        for id in ["a", "b", "c"] {
            let batch = f.repository.resolve_writing_batch().await.unwrap().batch;
            let submission = staged(&f.store, id).await;
            f.repository.add_submission(&batch, &submission).await.unwrap();
        }

        let unprocessed: Vec<u64> = f
            .repository
            .get_unprocessed_batches()
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.batch_id)
            .collect();
        assert_eq!(unprocessed, vec![0, 1, 2]);
        assert_eq!(f.repository.current_writing_batch().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_incomplete_member_is_not_counted() {
        let f = fixture(1, 10);
        let layout = f.repository.layout().clone();
        f.store
            .put(
                &layout.artifact_key(2024, 0, "half", ArtifactKind::Manifest),
                b"<m/>".to_vec(),
            )
            .await
            .unwrap();

        let batch = f.repository.batch(2024, 0);
        assert!(f.repository.list_members(&batch).await.unwrap().is_empty());
        assert_eq!(f.repository.current_writing_batch().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_stored_submission_is_found_in_a_closed_batch() {
        let f = fixture(1, 10);
        let submission = staged(&f.store, "dup").await;
        let PlacementTarget::Writable(writing) =
            f.repository.resolve_placement("dup").await.unwrap()
        else {
            panic!("a new submission goes to the writable batch");
        };
        f.repository
            .add_submission(&writing.batch, &submission)
            .await
            .unwrap();

        // Batch 0 is full, but the redelivered id must not open batch 1
        let target = f.repository.resolve_placement("dup").await.unwrap();
        assert_eq!(target, PlacementTarget::Existing(f.repository.batch(2024, 0)));
        assert_eq!(f.repository.read_high_water(2024).await.unwrap(), Some(0));

        f.clock.advance(Duration::minutes(1));
        let PlacementTarget::Writable(next) =
            f.repository.resolve_placement("other").await.unwrap()
        else {
            panic!("a new submission goes to the writable batch");
        };
        assert_eq!(next.batch_id(), 1);
        assert_eq!(next.rotated_from, Some(f.repository.batch(2024, 0)));
    }
}
