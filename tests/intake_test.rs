//! Intake acknowledgement decisions for the message transport.

mod common;

use common::{intake_envelope, stage_submission, test_config, TestPipeline};
use serde_json::json;
use submission_pipeline::messaging::{IntakeAck, IntakeConsumer};
use submission_pipeline::storage::StorageOperation;

#[tokio::test]
async fn test_supported_envelope_is_acked_and_stored() {
    let pipeline = TestPipeline::start(test_config(5, 600)).await;
    assert_eq!(pipeline.submit("sub-1").await, IntakeAck::Ack);
    assert_eq!(pipeline.members(0).await, vec!["sub-1"]);
}

#[tokio::test]
async fn test_redelivered_message_does_not_duplicate_member() {
    let pipeline = TestPipeline::start(test_config(5, 600)).await;
    let submission = stage_submission(pipeline.store.as_ref(), "sub-1").await;
    let body = intake_envelope(&submission);

    let intake = pipeline.handle.intake();
    assert_eq!(intake.handle_message(&body).await, IntakeAck::Ack);
    assert_eq!(intake.handle_message(&body).await, IntakeAck::Ack);
    assert_eq!(pipeline.members(0).await, vec!["sub-1"]);
}

#[tokio::test]
async fn test_unsupported_version_goes_to_log_only_handler() {
    let pipeline = TestPipeline::start(test_config(5, 600)).await;
    let submission = stage_submission(pipeline.store.as_ref(), "sub-2").await;
    let mut body: serde_json::Value = serde_json::from_slice(&intake_envelope(&submission)).unwrap();
    body["headers"]["version"] = json!("2.0");

    let ack = pipeline
        .handle
        .intake()
        .handle_message(body.to_string().as_bytes())
        .await;
    assert_eq!(ack, IntakeAck::Unsupported);
    assert!(pipeline.members(0).await.is_empty());
}

#[tokio::test]
async fn test_malformed_and_invalid_messages_are_rejected() {
    let pipeline = TestPipeline::start(test_config(5, 600)).await;
    let intake = pipeline.handle.intake();

    assert_eq!(intake.handle_message(b"not json").await, IntakeAck::Reject);
    assert_eq!(
        intake
            .handle_message(br#"{"headers":{"version":"1.0"},"payload":{"submissionId":"x"}}"#)
            .await,
        IntakeAck::Reject
    );

    let mut submission = stage_submission(pipeline.store.as_ref(), "sub-3").await;
    submission.submission_id = "a/b".to_string();
    assert_eq!(
        intake.handle_message(&intake_envelope(&submission)).await,
        IntakeAck::Reject
    );
}

#[tokio::test]
async fn test_missing_artifacts_reject_and_store_outage_retries() {
    let pipeline = TestPipeline::start(test_config(5, 600)).await;
    let intake = pipeline.handle.intake();

    let mut missing = stage_submission(pipeline.store.as_ref(), "sub-4").await;
    missing.manifest_path = "incoming/nowhere/manifest.xml".to_string();
    assert_eq!(
        intake.handle_message(&intake_envelope(&missing)).await,
        IntakeAck::Reject
    );

    let submission = stage_submission(pipeline.store.as_ref(), "sub-5").await;
    pipeline
        .store
        .fail_on(StorageOperation::Put, "/sub-5/", Some(1));
    assert_eq!(
        intake.handle_message(&intake_envelope(&submission)).await,
        IntakeAck::Retry
    );
    assert!(pipeline.members(0).await.is_empty());

    // Redelivery after the outage succeeds
    assert_eq!(
        intake.handle_message(&intake_envelope(&submission)).await,
        IntakeAck::Ack
    );
    assert_eq!(pipeline.members(0).await, vec!["sub-5"]);
}

#[tokio::test]
async fn test_redelivery_after_rotation_keeps_single_membership() {
    let mut pipeline = TestPipeline::start(test_config(1, 600)).await;
    let submission = stage_submission(pipeline.store.as_ref(), "dup").await;
    let body = intake_envelope(&submission);

    let intake = pipeline.handle.intake();
    assert_eq!(intake.handle_message(&body).await, IntakeAck::Ack);
    // Batch 0 is already full when the lost ack is redelivered
    assert_eq!(intake.handle_message(&body).await, IntakeAck::Ack);
    assert_eq!(pipeline.submit("other").await, IntakeAck::Ack);

    assert_eq!(pipeline.members(1).await, vec!["other"]);
    pipeline.drain().await;

    assert_eq!(pipeline.publisher.submitted_ids(), vec!["dup"]);
    assert!(pipeline.publisher.failed_ids().is_empty());
    assert_eq!(pipeline.system.submit_count(), 1);
    assert!(pipeline.members(0).await.is_empty());
    assert_eq!(pipeline.members(1).await, vec!["other"]);
}
