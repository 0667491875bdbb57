//! Parallel intake consumers sharing one pipeline.

mod common;

use std::sync::Arc;

use common::{intake_envelope, stage_submission, test_config, CONTROL_YEAR};
use submission_pipeline::config::{ConfigManager, StorageBackend};
use submission_pipeline::messaging::{InMemoryNotificationPublisher, IntakeAck, IntakeConsumer};
use submission_pipeline::orchestration::{BootstrapConfig, PipelineCollaborators, PipelineSystem};
use submission_pipeline::transmission::SimulatedAcceptanceSystem;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_parallel_consumers_never_overfill_a_batch() -> Result<(), Box<dyn std::error::Error>>
{
    let dir = tempfile::tempdir()?;
    let mut config = test_config(2, 3600);
    config.storage.backend = StorageBackend::LocalFs;
    config.storage.local_root = dir.path().to_path_buf();

    let collaborators = PipelineCollaborators::from_config(
        &config.storage,
        Arc::new(SimulatedAcceptanceSystem::new()),
        Arc::new(InMemoryNotificationPublisher::new()),
    );
    let handle = PipelineSystem::bootstrap(
        ConfigManager::from_config(config, "test")?,
        collaborators,
        BootstrapConfig::manual(),
    )
    .await?;
    let store = handle.repository().store().clone();

    let mut bodies = Vec::new();
    for index in 0..12 {
        let submission = stage_submission(store.as_ref(), &format!("c{index:02}")).await;
        bodies.push(intake_envelope(&submission));
    }

    let tasks: Vec<_> = bodies
        .into_iter()
        .map(|body| {
            let intake = handle.intake();
            tokio::spawn(async move { intake.handle_message(&body).await })
        })
        .collect();
    for task in tasks {
        assert_eq!(task.await?, IntakeAck::Ack);
    }

    let repository = handle.repository();
    let mut total = 0;
    for batch_id in 0..12 {
        let batch = repository.batch(CONTROL_YEAR, batch_id);
        let size = repository.list_members(&batch).await?.len();
        assert!(size <= 2, "batch {batch_id} holds {size} members");
        total += size;
    }
    assert_eq!(total, 12);
    Ok(())
}
