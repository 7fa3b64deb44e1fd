//! Due dates and late fines.
//!
//! A loan is due `grace_days` after it was borrowed. Fines accrue per whole
//! day held past that window and are only charged when the book comes back.

use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Days after borrowing during which no fine accrues
pub const GRACE_DAYS: u32 = 7;

/// Currency units charged per day past the grace period
pub const RATE_PER_DAY: u64 = 1;

/// Grace period and daily rate used by the ledger
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct FinePolicy {
    pub grace_days: u32,
    pub rate_per_day: u64,
}

impl Default for FinePolicy {
    fn default() -> Self {
        Self {
            grace_days: GRACE_DAYS,
            rate_per_day: RATE_PER_DAY,
        }
    }
}

impl FinePolicy {
    /// Due timestamp for a loan borrowed at `borrowed_at`
    ///
    /// Fails when the grace period pushes the date past what chrono can
    /// represent.
    pub fn due_at(&self, borrowed_at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        borrowed_at
            .checked_add_signed(Duration::days(i64::from(self.grace_days)))
            .ok_or_else(|| {
                Error::Config(format!(
                    "grace period of {} days is out of range",
                    self.grace_days
                ))
            })
    }

    /// Days held past the grace period, never negative
    pub fn days_late(&self, borrowed_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        (days_elapsed(borrowed_at, now) - i64::from(self.grace_days)).max(0)
    }

    /// `max(0, days_elapsed - grace_days) * rate_per_day`
    pub fn fine_for(&self, borrowed_at: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
        // days_late is clamped at zero so the cast cannot wrap
        (self.days_late(borrowed_at, now) as u64).saturating_mul(self.rate_per_day)
    }
}

/// Whole days between two timestamps, counting only complete 24-hour periods.
/// A `to` earlier than `from` counts as zero.
pub fn days_elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_days().max(0)
}
