//! # Health Gate
//!
//! Background login/logout probe against the acceptance system. A failed
//! probe puts the pipeline in offline mode; a successful one takes it out.
//! The probe uses its own session client so it never ends the session the
//! SubmitBundle handler is using.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::pipeline::OfflineGate;
use crate::transmission::TransmissionSessionClient;

#[derive(Debug)]
pub struct HealthGate {
    session: Arc<TransmissionSessionClient>,
    gate: OfflineGate,
    interval: Duration,
}

impl HealthGate {
    pub fn new(session: Arc<TransmissionSessionClient>, gate: OfflineGate, interval: Duration) -> Self {
        Self {
            session,
            gate,
            interval,
        }
    }

    /// One probe; returns whether the acceptance system accepted a login
    pub async fn probe(&self) -> bool {
        if self.session.login().await {
            self.session.logout().await;
            self.gate.set_online();
            debug!("Health probe succeeded");
            true
        } else {
            self.gate.set_offline("health probe login failed");
            false
        }
    }

    /// Probe every `interval` until `shutdown` fires. The first probe runs one
    /// interval from now; bootstrap runs its own initial probe.
    pub fn spawn(self, shutdown: CancellationToken) -> JoinHandle<()> {
        info!(
            interval_ms = u64::try_from(self.interval.as_millis()).unwrap_or(u64::MAX),
            "Starting acceptance-system health gate"
        );

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        self.probe().await;
                    }
                }
            }

            self.session.logout().await;
            info!("Health gate stopped");
        })
    }
}
