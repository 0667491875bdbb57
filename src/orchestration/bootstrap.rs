//! # Pipeline Bootstrap
//!
//! Wires configuration and external collaborators into a running pipeline and
//! hands back a [`PipelineHandle`] for lifecycle management.
//!
//! Startup order matters:
//!
//! 1. logging, repository, queue, offline gate
//! 2. initial health probe (may start the pipeline offline)
//! 3. startup reconciliation, which re-enqueues every closed batch on the
//!    in-progress channel
//! 4. processing loop and periodic health gate
//! 5. intake is handed to the caller
//!
//! Nothing can reach the assembler before step 3 has finished, so resumed
//! batches are always ahead of work created by the new run.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::health_gate::HealthGate;
use super::reconciler::{ReconciliationReport, StartupReconciler};
use crate::batching::{BatchAssembler, BatchRepository};
use crate::config::{ConfigManager, StorageBackend, StorageConfig};
use crate::constants::ActionChannel;
use crate::error::{PipelineError, Result};
use crate::logging::init_structured_logging;
use crate::messaging::{IntakeDispatcher, NotificationPublisher, NotificationService};
use crate::pipeline::{
    action_queue, ActionQueue, LoopStats, OfflineGate, ProcessedAction, ProcessingLoop,
    StageHandlers,
};
use crate::storage::{InMemoryObjectStore, LocalFsObjectStore, ObjectStore};
use crate::transmission::{AcceptanceSystem, TransmissionSessionClient};
use crate::utils::{Clock, SystemClock};

/// External systems the pipeline talks to
#[derive(Debug, Clone)]
pub struct PipelineCollaborators {
    pub store: Arc<dyn ObjectStore>,
    pub acceptance: Arc<dyn AcceptanceSystem>,
    pub publisher: Arc<dyn NotificationPublisher>,
    pub clock: Arc<dyn Clock>,
}

impl PipelineCollaborators {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        acceptance: Arc<dyn AcceptanceSystem>,
        publisher: Arc<dyn NotificationPublisher>,
    ) -> Self {
        Self {
            store,
            acceptance,
            publisher,
            clock: Arc::new(SystemClock),
        }
    }

    /// Build the object store named by `storage.backend`
    pub fn from_config(
        storage: &StorageConfig,
        acceptance: Arc<dyn AcceptanceSystem>,
        publisher: Arc<dyn NotificationPublisher>,
    ) -> Self {
        let store: Arc<dyn ObjectStore> = match storage.backend {
            StorageBackend::Memory => Arc::new(InMemoryObjectStore::new()),
            StorageBackend::LocalFs => Arc::new(LocalFsObjectStore::new(storage.local_root.clone())),
        };
        Self::new(store, acceptance, publisher)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Bootstrap options
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    /// Spawn the processing loop (vs manual control through
    /// [`PipelineHandle::take_processing_loop`])
    pub auto_start_loop: bool,
    /// Spawn the periodic health gate
    pub start_health_gate: bool,
    /// Receives one record per processed action
    pub observer: Option<mpsc::UnboundedSender<ProcessedAction>>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            auto_start_loop: true,
            start_health_gate: true,
            observer: None,
        }
    }
}

impl BootstrapConfig {
    /// Loop and health gate left to the caller
    pub fn manual() -> Self {
        Self {
            auto_start_loop: false,
            start_health_gate: false,
            observer: None,
        }
    }

    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<ProcessedAction>) -> Self {
        self.observer = Some(observer);
        self
    }
}

/// Point-in-time status of a running pipeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineStatus {
    pub running: bool,
    pub environment: String,
    pub application_id: String,
    pub control_year: i32,
    pub offline: bool,
    pub new_depth: usize,
    pub in_progress_depth: usize,
}

/// Handle for a bootstrapped pipeline
#[derive(Debug)]
pub struct PipelineHandle {
    config_manager: Arc<ConfigManager>,
    repository: Arc<BatchRepository>,
    assembler: Arc<BatchAssembler>,
    intake: Arc<IntakeDispatcher>,
    queue: ActionQueue,
    gate: OfflineGate,
    session: Arc<TransmissionSessionClient>,
    shutdown: CancellationToken,
    reconciliation: ReconciliationReport,
    loop_task: Option<JoinHandle<LoopStats>>,
    manual_loop: Option<ProcessingLoop>,
    health_task: Option<JoinHandle<()>>,
}

impl PipelineHandle {
    pub fn config_manager(&self) -> &Arc<ConfigManager> {
        &self.config_manager
    }

    /// Intake surface; only available once reconciliation has run
    pub fn intake(&self) -> Arc<IntakeDispatcher> {
        self.intake.clone()
    }

    pub fn assembler(&self) -> &Arc<BatchAssembler> {
        &self.assembler
    }

    pub fn repository(&self) -> &Arc<BatchRepository> {
        &self.repository
    }

    pub fn queue(&self) -> &ActionQueue {
        &self.queue
    }

    pub fn gate(&self) -> &OfflineGate {
        &self.gate
    }

    pub fn reconciliation(&self) -> &ReconciliationReport {
        &self.reconciliation
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled()
    }

    /// The unspawned loop when bootstrapped with `auto_start_loop: false`
    pub fn take_processing_loop(&mut self) -> Option<ProcessingLoop> {
        self.manual_loop.take()
    }

    pub fn status(&self) -> PipelineStatus {
        PipelineStatus {
            running: self.is_running(),
            environment: self.config_manager.environment().to_string(),
            application_id: self.repository.application_id().to_string(),
            control_year: self.repository.control_year(),
            offline: self.gate.is_offline(),
            new_depth: self.queue.depth(ActionChannel::New),
            in_progress_depth: self.queue.depth(ActionChannel::InProgress),
        }
    }

    /// Signal shutdown, wait for the loop and health gate to stop, then end
    /// the transmission session. Queued actions are left for the next
    /// startup's reconciliation.
    pub async fn shutdown(mut self) -> Result<LoopStats> {
        info!("🛑 BOOTSTRAP: Shutdown requested");
        self.shutdown.cancel();

        let stats = match self.loop_task.take() {
            Some(task) => task.await.map_err(|e| {
                PipelineError::InvalidState(format!("processing loop task failed: {e}"))
            })?,
            None => self
                .manual_loop
                .take()
                .map(|processing_loop| processing_loop.stats().clone())
                .unwrap_or_default(),
        };

        if let Some(task) = self.health_task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "Health gate task ended abnormally");
            }
        }

        self.session.logout().await;
        info!(
            processed = stats.processed,
            failed = stats.failed,
            remaining_new = self.queue.depth(ActionChannel::New),
            remaining_in_progress = self.queue.depth(ActionChannel::InProgress),
            "✅ BOOTSTRAP: Pipeline stopped"
        );
        Ok(stats)
    }
}

pub struct PipelineSystem;

impl PipelineSystem {
    pub async fn bootstrap(
        config_manager: Arc<ConfigManager>,
        collaborators: PipelineCollaborators,
        options: BootstrapConfig,
    ) -> Result<PipelineHandle> {
        let config = config_manager.config();
        init_structured_logging(&config.logging, config_manager.environment());

        info!(
            environment = %config_manager.environment(),
            application_id = %config.application_id,
            store = collaborators.store.backend_name(),
            acceptance_system = collaborators.acceptance.system_name(),
            publisher = collaborators.publisher.publisher_name(),
            "🚀 BOOTSTRAP: Starting submission pipeline"
        );

        let PipelineCollaborators {
            store,
            acceptance,
            publisher,
            clock,
        } = collaborators;

        let repository = Arc::new(BatchRepository::from_config(store, config, clock.clone()));
        let (queue, receiver) = action_queue();
        let gate = OfflineGate::new();
        let shutdown = CancellationToken::new();

        let login_timeout = config.transmission.login_timeout();
        let session = Arc::new(TransmissionSessionClient::new(
            acceptance.clone(),
            login_timeout,
            clock.clone(),
        ));
        let health_gate = HealthGate::new(
            Arc::new(TransmissionSessionClient::new(acceptance, login_timeout, clock.clone())),
            gate.clone(),
            config.transmission.health_check_interval(),
        );

        if health_gate.probe().await {
            info!("✅ BOOTSTRAP: Acceptance system reachable");
        } else {
            warn!("⚠️ BOOTSTRAP: Acceptance system unreachable, starting in offline mode");
        }

        let reconciliation = StartupReconciler::new(repository.clone(), queue.clone())
            .reconcile()
            .await?;

        let notifications = NotificationService::new(publisher, &config.notifications);
        let handlers = Arc::new(StageHandlers::new(
            config,
            repository.clone(),
            session.clone(),
            notifications,
            gate.clone(),
            clock,
        ));
        let mut processing_loop = ProcessingLoop::new(
            receiver,
            queue.clone(),
            handlers,
            gate.clone(),
            shutdown.clone(),
        );
        if let Some(observer) = options.observer {
            processing_loop = processing_loop.with_observer(observer);
        }

        let (loop_task, manual_loop) = if options.auto_start_loop {
            (Some(tokio::spawn(processing_loop.run())), None)
        } else {
            info!("📋 BOOTSTRAP: Processing loop not auto-started - manual control mode");
            (None, Some(processing_loop))
        };

        let health_task = options
            .start_health_gate
            .then(|| health_gate.spawn(shutdown.clone()));

        let assembler = Arc::new(BatchAssembler::new(repository.clone(), queue.clone()));
        let intake = Arc::new(IntakeDispatcher::new(assembler.clone()));

        info!(
            control_year = reconciliation.control_year,
            resumed = reconciliation.resumed.len(),
            offline = gate.is_offline(),
            "🎉 BOOTSTRAP: Pipeline ready for intake"
        );

        Ok(PipelineHandle {
            config_manager,
            repository,
            assembler,
            intake,
            queue,
            gate,
            session,
            shutdown,
            reconciliation,
            loop_task,
            manual_loop,
            health_task,
        })
    }
}
