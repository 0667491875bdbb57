//! # Processing Loop
//!
//! The single consumer of the action queue. Every batch state transition runs
//! here, one at a time:
//!
//! 1. stop if shutdown was requested
//! 2. while offline, wait for the gate to clear (or for shutdown)
//! 3. take the next action, in-progress before new
//! 4. dispatch it to its stage handler and enqueue the follow-ups
//!
//! A handler error or panic is logged and the loop carries on with the next
//! action. Shutdown is only observed between actions; a handler that is
//! already running finishes first.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::action::{Action, Stage};
use super::handlers::StageHandlers;
use super::queue::{ActionQueue, ActionReceiver};
use super::OfflineGate;
use crate::constants::ActionChannel;
use crate::logging::{log_error, log_stage_operation};
use crate::models::BatchKey;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Completed { follow_ups: usize },
    Failed { error: String },
    Panicked,
    /// CreateArchive for a batch already in flight
    Dropped,
}

/// Emitted once per action taken off the queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessedAction {
    pub channel: ActionChannel,
    pub stage: Stage,
    pub batch: BatchKey,
    pub outcome: ActionOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub processed: u64,
    pub failed: u64,
    pub panicked: u64,
    pub dropped: u64,
}

#[derive(Debug)]
pub struct ProcessingLoop {
    receiver: ActionReceiver,
    queue: ActionQueue,
    handlers: Arc<StageHandlers>,
    gate: OfflineGate,
    shutdown: CancellationToken,
    /// Outstanding actions per batch; a batch is in flight while its count is non-zero
    in_flight: HashMap<BatchKey, usize>,
    observer: Option<mpsc::UnboundedSender<ProcessedAction>>,
    stats: LoopStats,
}

impl ProcessingLoop {
    pub fn new(
        receiver: ActionReceiver,
        queue: ActionQueue,
        handlers: Arc<StageHandlers>,
        gate: OfflineGate,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            receiver,
            queue,
            handlers,
            gate,
            shutdown,
            in_flight: HashMap::new(),
            observer: None,
            stats: LoopStats::default(),
        }
    }

    /// Report every processed action to `observer`
    pub fn with_observer(mut self, observer: mpsc::UnboundedSender<ProcessedAction>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn stats(&self) -> &LoopStats {
        &self.stats
    }

    pub fn in_flight_batches(&self) -> usize {
        self.in_flight.len()
    }

    pub async fn run(mut self) -> LoopStats {
        let mut offline_rx = self.gate.subscribe();
        info!("🚀 LOOP: Processing loop started");

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            if *offline_rx.borrow_and_update() {
                debug!("Processing loop paused while offline");
                tokio::select! {
                    biased;
                    _ = self.shutdown.cancelled() => break,
                    changed = offline_rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        continue;
                    }
                }
            }

            let taken = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                changed = offline_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                taken = self.receiver.take() => taken,
            };

            let Some((channel, action)) = taken else {
                info!("All action senders dropped, processing loop exiting");
                break;
            };
            self.process(channel, action).await;
        }

        info!(
            processed = self.stats.processed,
            failed = self.stats.failed,
            panicked = self.stats.panicked,
            dropped = self.stats.dropped,
            in_flight = self.in_flight.len(),
            "🛑 LOOP: Processing loop stopped"
        );
        self.stats
    }

    /// Process everything currently queued, ignoring the offline gate.
    /// Returns the number of actions taken.
    pub async fn drain(&mut self) -> usize {
        let mut taken = 0;
        while let Some((channel, action)) = self.receiver.try_take() {
            self.process(channel, action).await;
            taken += 1;
        }
        taken
    }

    async fn process(&mut self, channel: ActionChannel, action: Action) {
        let stage = action.stage();
        let batch = action.batch().key();

        if matches!(action, Action::CreateArchive(_)) {
            if self.in_flight.contains_key(&batch) {
                warn!(
                    control_year = batch.0,
                    batch_id = batch.1,
                    channel = %channel,
                    "Batch already in flight, dropping duplicate CreateArchive"
                );
                self.stats.dropped += 1;
                self.notify(channel, stage, batch, ActionOutcome::Dropped);
                return;
            }
            self.in_flight.insert(batch, 1);
        } else {
            self.in_flight.entry(batch).or_insert(1);
        }

        log_stage_operation(stage.as_str(), batch.1, channel.as_str(), "started");
        let result = AssertUnwindSafe(self.handlers.dispatch(action))
            .catch_unwind()
            .await;
        self.stats.processed += 1;

        let (outcome, follow_ups) = match result {
            Ok(Ok(follow_ups)) => (
                ActionOutcome::Completed {
                    follow_ups: follow_ups.len(),
                },
                follow_ups,
            ),
            Ok(Err(e)) => {
                self.stats.failed += 1;
                log_error(
                    "processing_loop",
                    stage.as_str(),
                    &e.to_string(),
                    Some(&format!("batch {}/{} left in place", batch.0, batch.1)),
                );
                (
                    ActionOutcome::Failed {
                        error: e.to_string(),
                    },
                    Vec::new(),
                )
            }
            Err(panic) => {
                self.stats.panicked += 1;
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "non-string panic payload".to_string());
                error!(
                    stage = %stage,
                    control_year = batch.0,
                    batch_id = batch.1,
                    panic = %message,
                    "💥 LOOP: Stage handler panicked, batch left in place"
                );
                (ActionOutcome::Panicked, Vec::new())
            }
        };

        let mut outstanding = self.in_flight.get(&batch).copied().unwrap_or(1);
        for follow_up in follow_ups {
            let target = follow_up.action.batch().key();
            match self.queue.push(follow_up.channel, follow_up.action) {
                Ok(()) if target == batch => outstanding += 1,
                Ok(()) => {}
                Err(e) => error!(error = %e, "Failed to enqueue follow-up action"),
            }
        }
        outstanding -= 1;
        if outstanding == 0 {
            self.in_flight.remove(&batch);
            debug!(control_year = batch.0, batch_id = batch.1, "Batch left the pipeline");
        } else {
            self.in_flight.insert(batch, outstanding);
        }

        log_stage_operation(stage.as_str(), batch.1, channel.as_str(), "finished");
        self.notify(channel, stage, batch, outcome);
    }

    fn notify(&self, channel: ActionChannel, stage: Stage, batch: BatchKey, outcome: ActionOutcome) {
        if let Some(observer) = &self.observer {
            let _ = observer.send(ProcessedAction {
                channel,
                stage,
                batch,
                outcome,
            });
        }
    }
}
