//! Stage Handlers
//!
//! One handler per [`Stage`](super::Stage). A handler returns the follow-up
//! actions it wants enqueued; a handler that cannot proceed returns none. An
//! `Err` is logged by the processing loop and leaves the batch where it is.

pub mod bundle_archive;
pub mod cleanup;
pub mod create_archive;
pub mod submission_failure;
pub mod submit_bundle;

use std::sync::Arc;

pub use bundle_archive::BundleArchiveHandler;
pub use cleanup::CleanupHandler;
pub use create_archive::CreateArchiveHandler;
pub use submission_failure::SubmissionFailureHandler;
pub use submit_bundle::SubmitBundleHandler;

use super::{Action, FollowUp, OfflineGate, WorkerPool};
use crate::batching::BatchRepository;
use crate::config::PipelineConfig;
use crate::error::Result;
use crate::messaging::NotificationService;
use crate::transmission::TransmissionSessionClient;
use crate::utils::Clock;

#[derive(Debug, Clone)]
pub struct StageHandlers {
    pub create_archive: CreateArchiveHandler,
    pub bundle_archive: BundleArchiveHandler,
    pub submit_bundle: SubmitBundleHandler,
    pub cleanup: CleanupHandler,
    pub submission_failure: SubmissionFailureHandler,
}

impl StageHandlers {
    pub fn new(
        config: &PipelineConfig,
        repository: Arc<BatchRepository>,
        session: Arc<TransmissionSessionClient>,
        notifications: NotificationService,
        gate: OfflineGate,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            create_archive: CreateArchiveHandler::new(
                repository.clone(),
                WorkerPool::from_config(&config.worker_pool),
            ),
            bundle_archive: BundleArchiveHandler::new(clock),
            submit_bundle: SubmitBundleHandler::new(
                session,
                gate,
                notifications.clone(),
                config.transmission.max_submit_attempts,
            ),
            cleanup: CleanupHandler::new(repository, &config.cleanup),
            submission_failure: SubmissionFailureHandler::new(notifications),
        }
    }

    pub async fn dispatch(&self, action: Action) -> Result<Vec<FollowUp>> {
        match action {
            Action::CreateArchive(batch) => self.create_archive.handle(batch).await,
            Action::BundleArchive(result) => self.bundle_archive.handle(result).await,
            Action::SubmitBundle(request) => self.submit_bundle.handle(request).await,
            Action::Cleanup(request) => self.cleanup.handle(request).await,
            Action::SubmissionFailure(context) => self.submission_failure.handle(context).await,
        }
    }
}
