//! Batch rotation driven end to end through intake.

mod common;

use chrono::Duration;
use common::{stage_submission, test_config, TestPipeline, CONTROL_YEAR};
use submission_pipeline::constants::ActionChannel;
use submission_pipeline::messaging::IntakeAck;
use submission_pipeline::pipeline::{ActionOutcome, Stage};

#[tokio::test]
async fn test_size_and_timeout_rotation_sequence() -> Result<(), Box<dyn std::error::Error>> {
    // max 2 per batch, 10 minute timeout
    let mut pipeline = TestPipeline::start(test_config(2, 600)).await;
    let assembler = pipeline.handle.assembler().clone();

    let a = stage_submission(pipeline.store.as_ref(), "A").await;
    let placement = assembler.accept(&a).await?;
    assert_eq!(placement.batch.batch_id, 0);
    assert!(placement.closed.is_none());

    pipeline.clock.advance(Duration::minutes(1));
    let b = stage_submission(pipeline.store.as_ref(), "B").await;
    let placement = assembler.accept(&b).await?;
    assert_eq!(placement.batch.batch_id, 0);
    assert!(placement.closed.is_none());

    // Batch 0 is full
    pipeline.clock.advance(Duration::minutes(1));
    let c = stage_submission(pipeline.store.as_ref(), "C").await;
    let placement = assembler.accept(&c).await?;
    assert_eq!(placement.batch.batch_id, 1);
    assert_eq!(placement.closed.map(|batch| batch.batch_id), Some(0));
    assert_eq!(pipeline.handle.queue().depth(ActionChannel::New), 1);

    // Batch 1's only member is 18 minutes old
    pipeline.clock.advance(Duration::minutes(18));
    let d = stage_submission(pipeline.store.as_ref(), "D").await;
    let placement = assembler.accept(&d).await?;
    assert_eq!(placement.batch.batch_id, 2);
    assert_eq!(placement.closed.map(|batch| batch.batch_id), Some(1));
    assert_eq!(pipeline.handle.queue().depth(ActionChannel::New), 2);

    assert_eq!(pipeline.members(0).await, vec!["A", "B"]);
    assert_eq!(pipeline.members(1).await, vec!["C"]);
    assert_eq!(pipeline.members(2).await, vec!["D"]);

    let processed = pipeline.drain().await;
    let archived: Vec<u64> = processed
        .iter()
        .filter(|action| action.stage == Stage::CreateArchive)
        .map(|action| action.batch.1)
        .collect();
    assert_eq!(archived, vec![0, 1]);
    assert!(processed
        .iter()
        .all(|action| matches!(action.outcome, ActionOutcome::Completed { .. })));

    let mut submitted = pipeline.publisher.submitted_ids();
    submitted.sort();
    assert_eq!(submitted, vec!["A", "B", "C"]);
    assert!(pipeline.members(0).await.is_empty());
    assert!(pipeline.members(1).await.is_empty());
    assert_eq!(pipeline.members(2).await, vec!["D"]);
    Ok(())
}

#[tokio::test]
async fn test_each_closed_batch_is_enqueued_once() {
    let mut pipeline = TestPipeline::start(test_config(1, 600)).await;

    for id in ["s1", "s2", "s3", "s4"] {
        assert_eq!(pipeline.submit(id).await, IntakeAck::Ack);
    }

    // 4 members at one per batch: batches 0..=2 closed, 3 writable
    assert_eq!(pipeline.handle.queue().depth(ActionChannel::New), 3);
    let processed = pipeline.drain().await;
    let archives: Vec<_> = processed
        .iter()
        .filter(|action| action.stage == Stage::CreateArchive)
        .collect();
    assert_eq!(archives.len(), 3);
    assert!(archives
        .iter()
        .all(|action| action.channel == ActionChannel::New && action.batch.0 == CONTROL_YEAR));
    assert!(processed
        .iter()
        .filter(|action| action.stage != Stage::CreateArchive)
        .all(|action| action.channel == ActionChannel::InProgress));
    assert_eq!(pipeline.publisher.submitted_ids().len(), 3);
}

#[tokio::test]
async fn test_empty_writable_batch_never_rotates() {
    let pipeline = TestPipeline::start(test_config(2, 60)).await;
    let repository = pipeline.handle.repository().clone();

    assert_eq!(repository.current_writing_batch().await.unwrap(), 0);
    pipeline.clock.advance(Duration::hours(3));
    assert_eq!(repository.current_writing_batch().await.unwrap(), 0);
    assert_eq!(pipeline.handle.queue().depth(ActionChannel::New), 0);
}
