//! # Simulated Acceptance System
//!
//! In-process stand-in for the external acceptance system, used by tests and
//! by local runs without a real endpoint.
//!
//! ## Behavior
//!
//! - Issues a fresh token per login and tracks live sessions
//! - Receipts each bundle entry once; a resubmitted id is rejected as a duplicate
//! - Can be made unreachable, told to reject specific submission ids, or
//!   scripted to fail the next submits with given errors

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::Mutex;
use uuid::Uuid;

use super::{AcceptanceSystem, SessionToken, TransmissionError, TransmissionStatus};
use crate::models::Bundle;
use crate::utils::{Clock, SystemClock};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedRecord {
    pub receipt_id: String,
    pub bundle_id: Uuid,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct SimulatedAcceptanceSystem {
    reachable: AtomicBool,
    sessions: DashMap<String, DateTime<Utc>>,
    accepted: DashMap<String, AcceptedRecord>,
    rejections: DashMap<String, String>,
    scripted_failures: Mutex<VecDeque<TransmissionError>>,
    login_count: AtomicUsize,
    submit_count: AtomicUsize,
    clock: Arc<dyn Clock>,
}

impl Default for SimulatedAcceptanceSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedAcceptanceSystem {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            reachable: AtomicBool::new(true),
            sessions: DashMap::new(),
            accepted: DashMap::new(),
            rejections: DashMap::new(),
            scripted_failures: Mutex::new(VecDeque::new()),
            login_count: AtomicUsize::new(0),
            submit_count: AtomicUsize::new(0),
            clock,
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Reject this submission id whenever it is submitted
    pub fn reject_submission(&self, submission_id: &str, reason: &str) {
        self.rejections
            .insert(submission_id.to_string(), reason.to_string());
    }

    /// Fail the next submit call with `error`; queued failures are used in order
    pub fn fail_next_submit(&self, error: TransmissionError) {
        self.scripted_failures.lock().push_back(error);
    }

    /// Revoke every live session
    pub fn expire_sessions(&self) {
        self.sessions.clear();
    }

    pub fn login_count(&self) -> usize {
        self.login_count.load(Ordering::SeqCst)
    }

    pub fn submit_count(&self) -> usize {
        self.submit_count.load(Ordering::SeqCst)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn accepted_record(&self, submission_id: &str) -> Option<AcceptedRecord> {
        self.accepted
            .get(submission_id)
            .map(|record| record.value().clone())
    }

    fn ensure_reachable(&self) -> Result<(), TransmissionError> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransmissionError::unreachable("simulated outage"))
        }
    }
}

#[async_trait]
impl AcceptanceSystem for SimulatedAcceptanceSystem {
    async fn login(&self) -> Result<SessionToken, TransmissionError> {
        self.ensure_reachable()?;
        self.login_count.fetch_add(1, Ordering::SeqCst);

        let token = Uuid::new_v4().to_string();
        self.sessions.insert(token.clone(), self.clock.now());
        Ok(SessionToken::new(token))
    }

    async fn submit(
        &self,
        token: &SessionToken,
        bundle: &Bundle,
    ) -> Result<Vec<TransmissionStatus>, TransmissionError> {
        self.ensure_reachable()?;
        if !self.sessions.contains_key(token.as_str()) {
            return Err(TransmissionError::SessionExpired);
        }
        self.submit_count.fetch_add(1, Ordering::SeqCst);

        if let Some(error) = self.scripted_failures.lock().pop_front() {
            return Err(error);
        }

        let received_at = self.clock.now();
        let statuses = bundle
            .entries
            .iter()
            .map(|entry| {
                let submission_id = entry.submission_id.clone();
                if let Some(reason) = self.rejections.get(&submission_id) {
                    return TransmissionStatus::Rejected {
                        submission_id,
                        reason: reason.value().clone(),
                    };
                }
                if self.accepted.contains_key(&submission_id) {
                    return TransmissionStatus::Rejected {
                        submission_id,
                        reason: "duplicate submission".to_string(),
                    };
                }

                let receipt_id = format!("RCPT-{}", Uuid::new_v4().simple()).to_uppercase();
                self.accepted.insert(
                    submission_id.clone(),
                    AcceptedRecord {
                        receipt_id: receipt_id.clone(),
                        bundle_id: bundle.bundle_id,
                        received_at,
                    },
                );
                TransmissionStatus::Accepted {
                    submission_id,
                    receipt_id,
                    received_at,
                }
            })
            .collect();

        Ok(statuses)
    }

    async fn logout(&self, token: &SessionToken) -> Result<(), TransmissionError> {
        self.sessions.remove(token.as_str());
        self.ensure_reachable()
    }

    fn system_name(&self) -> &'static str {
        "simulated"
    }
}
