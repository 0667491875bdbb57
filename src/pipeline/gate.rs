//! Offline-mode gate.
//!
//! While set, the processing loop takes from neither channel. Set by the
//! SubmitBundle handler on login or retryable transmission failures and by the
//! health gate's probe; cleared only by a successful probe.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct OfflineGate {
    tx: Arc<watch::Sender<bool>>,
}

impl Default for OfflineGate {
    fn default() -> Self {
        Self::new()
    }
}

impl OfflineGate {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    /// Returns `true` if this call changed the state
    pub fn set_offline(&self, reason: &str) -> bool {
        let changed = self.tx.send_if_modified(|offline| {
            let was = *offline;
            *offline = true;
            !was
        });
        if changed {
            warn!(reason, "📴 GATE: Acceptance system unavailable, entering offline mode");
        }
        changed
    }

    /// Returns `true` if this call changed the state
    pub fn set_online(&self) -> bool {
        let changed = self.tx.send_if_modified(|offline| {
            let was = *offline;
            *offline = false;
            was
        });
        if changed {
            info!("📶 GATE: Acceptance system reachable, leaving offline mode");
        }
        changed
    }

    pub fn is_offline(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transitions_report_changes_only() {
        let gate = OfflineGate::new();
        assert!(!gate.is_offline());
        assert!(gate.set_offline("login failed"));
        assert!(!gate.set_offline("login failed again"));
        assert!(gate.is_offline());
        assert!(gate.set_online());
        assert!(!gate.set_online());
    }

    #[tokio::test]
    async fn test_subscribers_observe_changes() {
        let gate = OfflineGate::new();
        let mut rx = gate.subscribe();
        gate.set_offline("probe failed");
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }
}
