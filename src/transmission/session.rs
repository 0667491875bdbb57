//! # Transmission Session Client
//!
//! Holds the login state for one consumer of the acceptance system. Login and
//! logout are idempotent. Submitting requires an active session: the client
//! never logs in implicitly, so a failed login is always visible to the caller
//! before any submit is attempted.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{AcceptanceSystem, SessionToken, SubmissionFailureError, TransmissionError, TransmissionStatus};
use crate::models::{Batch, Bundle, MemberFailure, ReceiptedSubmission, SubmittedDataContainer};
use crate::utils::Clock;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    NotLoggedIn,
    LoggedIn {
        token: SessionToken,
        since: DateTime<Utc>,
    },
}

impl SessionState {
    pub fn is_logged_in(&self) -> bool {
        matches!(self, SessionState::LoggedIn { .. })
    }
}

#[derive(Debug)]
pub struct TransmissionSessionClient {
    system: Arc<dyn AcceptanceSystem>,
    state: Mutex<SessionState>,
    login_timeout: Duration,
    clock: Arc<dyn Clock>,
}

impl TransmissionSessionClient {
    pub fn new(
        system: Arc<dyn AcceptanceSystem>,
        login_timeout: Duration,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            system,
            state: Mutex::new(SessionState::NotLoggedIn),
            login_timeout,
            clock,
        }
    }

    pub async fn is_logged_in(&self) -> bool {
        self.state.lock().await.is_logged_in()
    }

    /// Log in unless already logged in. `false` means the acceptance system
    /// refused or could not be reached within the login timeout.
    pub async fn login(&self) -> bool {
        let mut state = self.state.lock().await;
        if state.is_logged_in() {
            return true;
        }

        let outcome = match tokio::time::timeout(self.login_timeout, self.system.login()).await {
            Ok(outcome) => outcome,
            Err(_) => Err(TransmissionError::timeout("login", self.login_timeout)),
        };

        match outcome {
            Ok(token) => {
                *state = SessionState::LoggedIn {
                    token,
                    since: self.clock.now(),
                };
                info!(system = self.system.system_name(), "🔐 SESSION: Logged in");
                true
            }
            Err(e) => {
                warn!(
                    system = self.system.system_name(),
                    error = %e,
                    "🔐 SESSION: Login failed"
                );
                false
            }
        }
    }

    /// Submit a bundle on the current session and split the outcome into
    /// receipted and failed members.
    ///
    /// Every bundle entry lands in exactly one half of the result; an entry
    /// the acceptance system did not report on counts as failed.
    pub async fn submit_bundles(
        &self,
        bundle: &Bundle,
        batch: &Batch,
    ) -> Result<SubmittedDataContainer, SubmissionFailureError> {
        let failure =
            |source: TransmissionError| SubmissionFailureError::new(batch.clone(), bundle.clone(), source);

        let mut state = self.state.lock().await;
        let token = match &*state {
            SessionState::LoggedIn { token, .. } => token.clone(),
            SessionState::NotLoggedIn => return Err(failure(TransmissionError::NotLoggedIn)),
        };

        let statuses = match self.system.submit(&token, bundle).await {
            Ok(statuses) => statuses,
            Err(e) => {
                if e.invalidates_session() {
                    *state = SessionState::NotLoggedIn;
                }
                return Err(failure(e));
            }
        };
        drop(state);

        let container = split_statuses(bundle, statuses);
        debug!(
            batch_id = batch.batch_id,
            bundle_id = %bundle.bundle_id,
            receipted = container.receipted.len(),
            failed = container.failed.len(),
            "Bundle submitted"
        );
        Ok(container)
    }

    /// End the session. Idempotent; the local state is cleared even when the
    /// remote logout fails.
    pub async fn logout(&self) -> bool {
        let mut state = self.state.lock().await;
        let previous = std::mem::replace(&mut *state, SessionState::NotLoggedIn);
        let SessionState::LoggedIn { token, .. } = previous else {
            return true;
        };

        match self.system.logout(&token).await {
            Ok(()) => {
                debug!(system = self.system.system_name(), "Logged out");
                true
            }
            Err(e) => {
                warn!(system = self.system.system_name(), error = %e, "Logout failed");
                false
            }
        }
    }
}

fn split_statuses(bundle: &Bundle, statuses: Vec<TransmissionStatus>) -> SubmittedDataContainer {
    let mut by_id: BTreeMap<String, TransmissionStatus> = BTreeMap::new();
    for status in statuses {
        let id = status.submission_id().to_string();
        if !bundle.metadata.contains_key(&id) {
            warn!(
                bundle_id = %bundle.bundle_id,
                submission_id = %id,
                "Ignoring status for a submission not in the bundle"
            );
            continue;
        }
        by_id.insert(id, status);
    }

    let mut container = SubmittedDataContainer::default();
    for entry in &bundle.entries {
        match by_id.remove(&entry.submission_id) {
            Some(TransmissionStatus::Accepted {
                submission_id,
                receipt_id,
                received_at,
            }) => container.receipted.push(ReceiptedSubmission {
                submission_id,
                receipt_id,
                tax_return_id: entry.context.tax_return_id,
                received_at,
            }),
            Some(TransmissionStatus::Rejected {
                submission_id,
                reason,
            }) => container.failed.push(MemberFailure::new(submission_id, reason)),
            None => container.failed.push(MemberFailure::new(
                entry.submission_id.clone(),
                "acceptance system returned no status",
            )),
        }
    }
    container
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ArchiveCreationResult, SubmissionArchive, UserContext};
    use crate::transmission::SimulatedAcceptanceSystem;
    use crate::utils::SystemClock;
    use chrono::NaiveDate;
    use uuid::Uuid;

    fn batch() -> Batch {
        Batch {
            application_id: "app".to_string(),
            control_year: 2024,
            batch_id: 0,
            prefix: "submissions/app/2024/0/".to_string(),
        }
    }

    fn bundle(ids: &[&str]) -> Bundle {
        let archives = ids
            .iter()
            .map(|id| SubmissionArchive {
                submission_id: id.to_string(),
                manifest: vec![],
                submission: vec![],
                context: UserContext {
                    submission_id: id.to_string(),
                    user_id: Uuid::new_v4(),
                    tax_return_id: Uuid::new_v4(),
                    taxpayer_id: "t".to_string(),
                    remote_address: "127.0.0.1".to_string(),
                    signature_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                },
            })
            .collect();
        Bundle::assemble(
            ArchiveCreationResult {
                batch: batch(),
                archives,
                failures: vec![],
            },
            Utc::now(),
        )
    }

    fn client(system: Arc<SimulatedAcceptanceSystem>) -> TransmissionSessionClient {
        TransmissionSessionClient::new(system, Duration::from_secs(1), Arc::new(SystemClock))
    }

    #[tokio::test]
    async fn test_submit_requires_login() {
        let system = Arc::new(SimulatedAcceptanceSystem::new());
        let client = client(system.clone());

        let err = client.submit_bundles(&bundle(&["a"]), &batch()).await.unwrap_err();
        assert_eq!(err.source, TransmissionError::NotLoggedIn);
        assert_eq!(system.submit_count(), 0);
    }

    #[tokio::test]
    async fn test_login_and_logout_are_idempotent() {
        let system = Arc::new(SimulatedAcceptanceSystem::new());
        let client = client(system.clone());

        assert!(client.login().await);
        assert!(client.login().await);
        assert_eq!(system.login_count(), 1);

        assert!(client.logout().await);
        assert!(client.logout().await);
        assert!(!client.is_logged_in().await);
        assert_eq!(system.active_sessions(), 0);
    }

    #[tokio::test]
    async fn test_login_fails_when_unreachable() {
        let system = Arc::new(SimulatedAcceptanceSystem::new());
        system.set_reachable(false);
        let client = client(system);
        assert!(!client.login().await);
        assert!(!client.is_logged_in().await);
    }

    #[tokio::test]
    async fn test_mixed_statuses_are_split() {
        let system = Arc::new(SimulatedAcceptanceSystem::new());
        system.reject_submission("b", "schema validation failed");
        let client = client(system);
        assert!(client.login().await);

        let bundle = bundle(&["a", "b", "c"]);
        let container = client.submit_bundles(&bundle, &batch()).await.unwrap();
        assert_eq!(container.receipted_ids(), vec!["a", "c"]);
        assert_eq!(container.failed.len(), 1);
        assert_eq!(container.failed[0].submission_id, "b");
        assert_eq!(
            container.receipted[0].tax_return_id,
            bundle.entries[0].context.tax_return_id
        );
    }

    #[tokio::test]
    async fn test_expired_session_is_forgotten() {
        let system = Arc::new(SimulatedAcceptanceSystem::new());
        let client = client(system.clone());
        assert!(client.login().await);
        system.expire_sessions();

        let err = client.submit_bundles(&bundle(&["a"]), &batch()).await.unwrap_err();
        assert_eq!(err.source, TransmissionError::SessionExpired);
        assert!(!client.is_logged_in().await);
    }
}
