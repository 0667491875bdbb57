//! # Orchestration
//!
//! Process-level wiring around the pipeline: startup reconciliation, the
//! acceptance-system health gate and the bootstrap that ties them to the
//! processing loop.

pub mod bootstrap;
pub mod health_gate;
pub mod reconciler;

pub use bootstrap::{
    BootstrapConfig, PipelineCollaborators, PipelineHandle, PipelineStatus, PipelineSystem,
};
pub use health_gate::HealthGate;
pub use reconciler::{ReconciliationReport, StartupReconciler};
