//! # Startup Reconciler
//!
//! Runs once, before intake is opened. Every batch in the current control year
//! other than the writable one was closed by an earlier run and not finished,
//! so each is pushed back into the pipeline on the in-progress channel, ahead
//! of anything intake will produce.

use std::sync::Arc;

use tracing::info;

use crate::batching::BatchRepository;
use crate::error::Result;
use crate::pipeline::{Action, ActionQueue};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub control_year: i32,
    /// Batch numbers re-enqueued, oldest first
    pub resumed: Vec<u64>,
}

#[derive(Debug, Clone)]
pub struct StartupReconciler {
    repository: Arc<BatchRepository>,
    queue: ActionQueue,
}

impl StartupReconciler {
    pub fn new(repository: Arc<BatchRepository>, queue: ActionQueue) -> Self {
        Self { repository, queue }
    }

    pub async fn reconcile(&self) -> Result<ReconciliationReport> {
        let control_year = self.repository.control_year();
        let batches = self.repository.get_unprocessed_batches().await?;

        let mut resumed = Vec::with_capacity(batches.len());
        for batch in batches {
            resumed.push(batch.batch_id);
            self.queue.push_in_progress(Action::CreateArchive(batch))?;
        }

        info!(
            control_year,
            resumed = resumed.len(),
            batch_ids = ?resumed,
            "🔁 RECONCILER: Incomplete batches resumed"
        );
        Ok(ReconciliationReport {
            control_year,
            resumed,
        })
    }
}
