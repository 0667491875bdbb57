//! # Pipeline
//!
//! Action queue, offline gate, processing loop and the stage handlers that
//! move a closed batch through archive, bundle, submit and its terminal stage.
//!
//! ```text
//! CreateArchive ─▶ BundleArchive ─▶ SubmitBundle ─┬─▶ Cleanup
//!                        │                        └─▶ SubmissionFailure ─▶ Cleanup
//!                        └──────────────────────────▶ SubmissionFailure
//! ```
//!
//! SubmissionFailure releases a pending Cleanup only after its FAILED event
//! is published.

pub mod action;
pub mod gate;
pub mod handlers;
pub mod processing_loop;
pub mod queue;
pub mod worker_pool;

pub use action::{Action, FollowUp, Stage};
pub use gate::OfflineGate;
pub use handlers::StageHandlers;
pub use processing_loop::{ActionOutcome, LoopStats, ProcessedAction, ProcessingLoop};
pub use queue::{action_queue, ActionQueue, ActionReceiver};
pub use worker_pool::WorkerPool;
