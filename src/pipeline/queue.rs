//! # Action Queue
//!
//! Two ordered channels of stage requests. *In-progress* carries
//! continuations of batches already moving through the pipeline and always
//! wins over *new*, which carries freshly closed batches.
//!
//! Channels are unbounded: the processing loop pushes follow-ups onto its own
//! queue, and a full bounded channel would block the only consumer.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::debug;

use super::action::Action;
use crate::constants::ActionChannel;
use crate::error::{PipelineError, Result};

#[derive(Debug, Default)]
struct QueueDepth {
    new: AtomicUsize,
    in_progress: AtomicUsize,
}

impl QueueDepth {
    fn counter(&self, channel: ActionChannel) -> &AtomicUsize {
        match channel {
            ActionChannel::New => &self.new,
            ActionChannel::InProgress => &self.in_progress,
        }
    }
}

/// Cloneable sending side, shared by intake, the reconciler and the loop
#[derive(Debug, Clone)]
pub struct ActionQueue {
    new_tx: mpsc::UnboundedSender<Action>,
    in_progress_tx: mpsc::UnboundedSender<Action>,
    depth: Arc<QueueDepth>,
}

/// Receiving side, owned by the processing loop
#[derive(Debug)]
pub struct ActionReceiver {
    new_rx: mpsc::UnboundedReceiver<Action>,
    in_progress_rx: mpsc::UnboundedReceiver<Action>,
    depth: Arc<QueueDepth>,
}

pub fn action_queue() -> (ActionQueue, ActionReceiver) {
    let (new_tx, new_rx) = mpsc::unbounded_channel();
    let (in_progress_tx, in_progress_rx) = mpsc::unbounded_channel();
    let depth = Arc::new(QueueDepth::default());

    (
        ActionQueue {
            new_tx,
            in_progress_tx,
            depth: depth.clone(),
        },
        ActionReceiver {
            new_rx,
            in_progress_rx,
            depth,
        },
    )
}

impl ActionQueue {
    pub fn push(&self, channel: ActionChannel, action: Action) -> Result<()> {
        let stage = action.stage();
        let batch_id = action.batch().batch_id;
        let sender = match channel {
            ActionChannel::New => &self.new_tx,
            ActionChannel::InProgress => &self.in_progress_tx,
        };

        self.depth.counter(channel).fetch_add(1, Ordering::SeqCst);
        if sender.send(action).is_err() {
            self.depth.counter(channel).fetch_sub(1, Ordering::SeqCst);
            return Err(PipelineError::Queue(format!(
                "{channel} channel closed, dropped {stage} for batch {batch_id}"
            )));
        }

        debug!(channel = %channel, stage = %stage, batch_id, "Enqueued action");
        Ok(())
    }

    pub fn push_new(&self, action: Action) -> Result<()> {
        self.push(ActionChannel::New, action)
    }

    pub fn push_in_progress(&self, action: Action) -> Result<()> {
        self.push(ActionChannel::InProgress, action)
    }

    /// Actions waiting on `channel`
    pub fn depth(&self, channel: ActionChannel) -> usize {
        self.depth.counter(channel).load(Ordering::SeqCst)
    }
}

impl ActionReceiver {
    fn taken(&self, channel: ActionChannel, action: Action) -> (ActionChannel, Action) {
        self.depth.counter(channel).fetch_sub(1, Ordering::SeqCst);
        (channel, action)
    }

    /// Wait for the next action, in-progress first. `None` once every sender
    /// is gone and both channels are drained. Cancel-safe.
    pub async fn take(&mut self) -> Option<(ActionChannel, Action)> {
        let (channel, action) = tokio::select! {
            biased;
            Some(action) = self.in_progress_rx.recv() => (ActionChannel::InProgress, action),
            Some(action) = self.new_rx.recv() => (ActionChannel::New, action),
            else => return None,
        };
        Some(self.taken(channel, action))
    }

    /// Non-blocking take with the same priority
    pub fn try_take(&mut self) -> Option<(ActionChannel, Action)> {
        if let Ok(action) = self.in_progress_rx.try_recv() {
            return Some(self.taken(ActionChannel::InProgress, action));
        }
        if let Ok(action) = self.new_rx.try_recv() {
            return Some(self.taken(ActionChannel::New, action));
        }
        None
    }
}
