//! Shared harness for pipeline integration tests.
//!
//! Builds a pipeline on in-memory collaborators with a manual clock and a
//! manually driven processing loop, so a test can place submissions, move
//! time, and then drain the queue deterministically.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::json;
use submission_pipeline::config::{ConfigManager, PipelineConfig};
use submission_pipeline::messaging::{InMemoryNotificationPublisher, IntakeAck, IntakeConsumer};
use submission_pipeline::models::Submission;
use submission_pipeline::orchestration::{
    BootstrapConfig, PipelineCollaborators, PipelineHandle, PipelineSystem,
};
use submission_pipeline::pipeline::{ProcessedAction, ProcessingLoop};
use submission_pipeline::storage::{InMemoryObjectStore, ObjectStore};
use submission_pipeline::transmission::SimulatedAcceptanceSystem;
use submission_pipeline::utils::{Clock, ManualClock};
use tokio::sync::mpsc;
use uuid::Uuid;

pub const CONTROL_YEAR: i32 = 2024;

pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 3, 9, 0, 0).unwrap()
}

pub fn test_config(max_batch_size: usize, batch_timeout_seconds: u64) -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.application_id = "app".to_string();
    config.batching.max_batch_size = max_batch_size;
    config.batching.batch_timeout_seconds = batch_timeout_seconds;
    config.control_year.fixed = Some(CONTROL_YEAR);
    config.transmission.health_check_interval_seconds = 1;
    config.transmission.login_timeout_seconds = 1;
    config.notifications.retry_backoff_ms = 1;
    config.cleanup.retry_backoff_ms = 1;
    config.worker_pool.size = Some(4);
    config
}

/// Put a submission's three source artifacts where intake says they are
pub async fn stage_submission(store: &dyn ObjectStore, submission_id: &str) -> Submission {
    let user_id = Uuid::new_v4();
    let tax_return_id = Uuid::new_v4();
    let base = format!("incoming/{submission_id}");
    let context = json!({
        "submissionId": submission_id,
        "userId": user_id,
        "taxReturnId": tax_return_id,
        "taxpayerId": format!("tp-{submission_id}"),
        "remoteAddress": "10.0.0.7",
        "signatureDate": "2025-02-14"
    });

    store
        .put(&format!("{base}/manifest.xml"), b"<manifest/>".to_vec())
        .await
        .unwrap();
    store
        .put(&format!("{base}/submission.xml"), b"<return/>".to_vec())
        .await
        .unwrap();
    store
        .put(&format!("{base}/userContext.json"), context.to_string().into_bytes())
        .await
        .unwrap();

    Submission {
        submission_id: submission_id.to_string(),
        tax_return_id,
        user_id,
        manifest_path: format!("{base}/manifest.xml"),
        submission_path: format!("{base}/submission.xml"),
        user_context_path: format!("{base}/userContext.json"),
    }
}

pub fn intake_envelope(submission: &Submission) -> Vec<u8> {
    json!({
        "headers": { "version": "1.0" },
        "payload": {
            "userId": submission.user_id,
            "taxReturnId": submission.tax_return_id,
            "manifestPath": submission.manifest_path,
            "submissionPath": submission.submission_path,
            "userContextPath": submission.user_context_path,
            "submissionId": submission.submission_id,
        }
    })
    .to_string()
    .into_bytes()
}

pub struct TestPipeline {
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryObjectStore>,
    pub system: Arc<SimulatedAcceptanceSystem>,
    pub publisher: Arc<InMemoryNotificationPublisher>,
    pub handle: PipelineHandle,
    pub processing_loop: ProcessingLoop,
    pub processed: mpsc::UnboundedReceiver<ProcessedAction>,
}

impl TestPipeline {
    pub async fn start(config: PipelineConfig) -> Self {
        let clock = Arc::new(ManualClock::new(start_time()));
        let store = Arc::new(InMemoryObjectStore::with_clock(clock.clone()));
        Self::start_on(config, store, clock).await
    }

    /// Bootstrap against an existing store, as a restarted process would
    pub async fn start_on(
        config: PipelineConfig,
        store: Arc<InMemoryObjectStore>,
        clock: Arc<ManualClock>,
    ) -> Self {
        let system = Arc::new(SimulatedAcceptanceSystem::with_clock(clock.clone()));
        let publisher = Arc::new(InMemoryNotificationPublisher::new());
        let clock_dyn: Arc<dyn Clock> = clock.clone();
        let collaborators =
            PipelineCollaborators::new(store.clone(), system.clone(), publisher.clone())
                .with_clock(clock_dyn);

        let (tx, processed) = mpsc::unbounded_channel();
        let config_manager = ConfigManager::from_config(config, "test").unwrap();
        let mut handle = PipelineSystem::bootstrap(
            config_manager,
            collaborators,
            BootstrapConfig::manual().with_observer(tx),
        )
        .await
        .unwrap();
        let processing_loop = handle.take_processing_loop().unwrap();

        Self {
            clock,
            store,
            system,
            publisher,
            handle,
            processing_loop,
            processed,
        }
    }

    /// Stage the artifacts and deliver the intake message
    pub async fn submit(&self, submission_id: &str) -> IntakeAck {
        let submission = stage_submission(self.store.as_ref(), submission_id).await;
        self.handle
            .intake()
            .handle_message(&intake_envelope(&submission))
            .await
    }

    /// Run every queued action and return what was processed, in order
    pub async fn drain(&mut self) -> Vec<ProcessedAction> {
        self.processing_loop.drain().await;
        let mut processed = Vec::new();
        while let Ok(action) = self.processed.try_recv() {
            processed.push(action);
        }
        processed
    }

    /// Member ids currently stored under a batch
    pub async fn members(&self, batch_id: u64) -> Vec<String> {
        let repository = self.handle.repository();
        let batch = repository.batch(CONTROL_YEAR, batch_id);
        repository
            .list_members(&batch)
            .await
            .unwrap()
            .into_iter()
            .map(|member| member.submission_id)
            .collect()
    }
}
