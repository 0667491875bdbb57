//! # Batch Assembler
//!
//! Intake-side entry point: places one completed submission into the writable
//! batch. When resolving the writable batch closes the previous one, the
//! closed batch is handed to the pipeline on the *new* channel before the
//! submission is stored, so the hand-off happens exactly once per rotation.
//!
//! Placements are serialized: resolving the writable batch and writing to it
//! happen under one lock, so concurrent intake consumers cannot overfill a
//! batch. A redelivered submission that is already a complete member of any
//! batch in the control year is left where it is.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info};

use super::repository::{BatchRepository, PlacementTarget};
use crate::error::Result;
use crate::models::{Batch, Submission};
use crate::pipeline::{Action, ActionQueue};

/// Where an accepted submission landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Placement {
    pub batch: Batch,
    /// Batch closed (and enqueued) by this call
    pub closed: Option<Batch>,
    /// The submission was already stored; nothing was written
    pub redelivered: bool,
}

#[derive(Debug, Clone)]
pub struct BatchAssembler {
    repository: Arc<BatchRepository>,
    queue: ActionQueue,
    placement_lock: Arc<Mutex<()>>,
}

impl BatchAssembler {
    pub fn new(repository: Arc<BatchRepository>, queue: ActionQueue) -> Self {
        Self {
            repository,
            queue,
            placement_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn repository(&self) -> &Arc<BatchRepository> {
        &self.repository
    }

    pub async fn accept(&self, submission: &Submission) -> Result<Placement> {
        submission.validate()?;

        let _guard = self.placement_lock.lock().await;
        let writing = match self
            .repository
            .resolve_placement(&submission.submission_id)
            .await?
        {
            PlacementTarget::Existing(batch) => {
                info!(
                    submission_id = %submission.submission_id,
                    batch_id = batch.batch_id,
                    control_year = batch.control_year,
                    "♻️ ASSEMBLER: Submission already stored, skipping redelivery"
                );
                return Ok(Placement {
                    batch,
                    closed: None,
                    redelivered: true,
                });
            }
            PlacementTarget::Writable(writing) => writing,
        };

        if let Some(closed) = &writing.rotated_from {
            self.queue.push_new(Action::CreateArchive(closed.clone()))?;
            info!(
                batch_id = closed.batch_id,
                control_year = closed.control_year,
                "📦 ASSEMBLER: Closed batch handed to pipeline"
            );
        }

        self.repository
            .add_submission(&writing.batch, submission)
            .await?;

        debug!(
            submission_id = %submission.submission_id,
            batch_id = writing.batch.batch_id,
            control_year = writing.batch.control_year,
            "Submission placed"
        );

        Ok(Placement {
            batch: writing.batch,
            closed: writing.rotated_from,
            redelivered: false,
        })
    }
}
