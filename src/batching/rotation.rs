//! # Batch Rotation Rule
//!
//! Whether the writable batch closes is a pure function of what the object
//! store shows about it: how many complete members it has and when the oldest
//! of them landed. Rotation is evaluated lazily on every intake call, never on
//! a timer, so a quiet batch closes only when the next submission arrives (or
//! when startup reconciliation resolves the writable batch).

use chrono::{DateTime, Duration, Utc};

use crate::config::BatchingConfig;
use crate::models::BatchMember;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationPolicy {
    pub max_batch_size: usize,
    pub batch_timeout: Duration,
}

impl RotationPolicy {
    pub fn new(max_batch_size: usize, batch_timeout: Duration) -> Self {
        Self {
            max_batch_size,
            batch_timeout,
        }
    }

    pub fn from_config(config: &BatchingConfig) -> Self {
        let seconds = i64::try_from(config.batch_timeout_seconds).unwrap_or(i64::MAX);
        Self {
            max_batch_size: config.max_batch_size,
            batch_timeout: Duration::try_seconds(seconds).unwrap_or(Duration::MAX),
        }
    }
}

/// What the rotation rule looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchStats {
    pub member_count: usize,
    pub oldest_completed_at: Option<DateTime<Utc>>,
}

impl BatchStats {
    pub fn from_members(members: &[BatchMember]) -> Self {
        Self {
            member_count: members.len(),
            oldest_completed_at: members.iter().map(|m| m.completed_at).min(),
        }
    }

    pub fn age(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.oldest_completed_at.map(|oldest| now - oldest)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationReason {
    SizeReached,
    TimeoutElapsed,
}

impl RotationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RotationReason::SizeReached => "size_reached",
            RotationReason::TimeoutElapsed => "timeout_elapsed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationDecision {
    Keep,
    Rotate(RotationReason),
}

impl RotationDecision {
    pub fn should_rotate(&self) -> bool {
        matches!(self, RotationDecision::Rotate(_))
    }
}

/// Rotate once the batch holds `max_batch_size` members or its oldest member
/// is at least `batch_timeout` old. An empty batch never rotates.
pub fn decide_rotation(
    stats: &BatchStats,
    now: DateTime<Utc>,
    policy: &RotationPolicy,
) -> RotationDecision {
    if stats.member_count == 0 {
        return RotationDecision::Keep;
    }
    if stats.member_count >= policy.max_batch_size {
        return RotationDecision::Rotate(RotationReason::SizeReached);
    }
    match stats.age(now) {
        Some(age) if age >= policy.batch_timeout => {
            RotationDecision::Rotate(RotationReason::TimeoutElapsed)
        }
        _ => RotationDecision::Keep,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn policy() -> RotationPolicy {
        RotationPolicy::new(2, Duration::minutes(10))
    }

    fn stats(count: usize, oldest: DateTime<Utc>) -> BatchStats {
        BatchStats {
            member_count: count,
            oldest_completed_at: Some(oldest),
        }
    }

    #[test]
    fn test_empty_batch_never_rotates() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();
        assert_eq!(
            decide_rotation(&BatchStats::default(), now, &policy()),
            RotationDecision::Keep
        );
    }

    #[test]
    fn test_rotates_on_size() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();
        assert_eq!(
            decide_rotation(&stats(2, now), now, &policy()),
            RotationDecision::Rotate(RotationReason::SizeReached)
        );
        assert_eq!(
            decide_rotation(&stats(1, now), now, &policy()),
            RotationDecision::Keep
        );
    }

    #[test]
    fn test_rotates_at_timeout_boundary() {
        let oldest = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();
        let just_before = oldest + Duration::minutes(10) - Duration::seconds(1);
        let at = oldest + Duration::minutes(10);

        assert!(!decide_rotation(&stats(1, oldest), just_before, &policy()).should_rotate());
        assert_eq!(
            decide_rotation(&stats(1, oldest), at, &policy()),
            RotationDecision::Rotate(RotationReason::TimeoutElapsed)
        );
    }

    #[test]
    fn test_stats_from_members_uses_oldest_completion() {
        let t0 = Utc.with_ymd_and_hms(2025, 5, 1, 8, 0, 0).unwrap();
        let members = vec![
            BatchMember {
                submission_id: "b".to_string(),
                completed_at: t0 + Duration::minutes(3),
            },
            BatchMember {
                submission_id: "a".to_string(),
                completed_at: t0,
            },
        ];
        let stats = BatchStats::from_members(&members);
        assert_eq!(stats.member_count, 2);
        assert_eq!(stats.oldest_completed_at, Some(t0));
        assert_eq!(stats.age(t0 + Duration::minutes(5)), Some(Duration::minutes(5)));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = RotationPolicy::from_config(&BatchingConfig {
            max_batch_size: 7,
            batch_timeout_seconds: 90,
        });
        assert_eq!(policy.max_batch_size, 7);
        assert_eq!(policy.batch_timeout, Duration::seconds(90));
    }
}
