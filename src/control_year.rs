//! # Control-Year Policy
//!
//! Decides which filing year a batch is written under. The reference policy is
//! "current calendar year minus one", a known simplification until multi-year
//! filing is supported. The policy is a trait so callers can swap it without
//! touching the repository; no multi-year behavior is implied here.

use chrono::{DateTime, Datelike, Utc};
use std::fmt::Debug;

use crate::config::ControlYearConfig;

pub trait ControlYearPolicy: Send + Sync + Debug + 'static {
    fn control_year(&self, now: DateTime<Utc>) -> i32;
}

/// `now.year() - offset`; the reference policy uses an offset of 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviousYearPolicy {
    pub offset: i32,
}

impl Default for PreviousYearPolicy {
    fn default() -> Self {
        Self { offset: 1 }
    }
}

impl ControlYearPolicy for PreviousYearPolicy {
    fn control_year(&self, now: DateTime<Utc>) -> i32 {
        now.year() - self.offset
    }
}

/// Pins every batch to one control year regardless of the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedYearPolicy {
    pub year: i32,
}

impl ControlYearPolicy for FixedYearPolicy {
    fn control_year(&self, _now: DateTime<Utc>) -> i32 {
        self.year
    }
}

/// Build the policy described by configuration.
pub fn policy_from_config(config: &ControlYearConfig) -> Box<dyn ControlYearPolicy> {
    match config.fixed {
        Some(year) => Box::new(FixedYearPolicy { year }),
        None => Box::new(PreviousYearPolicy {
            offset: config.offset,
        }),
    }
}
