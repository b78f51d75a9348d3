//! Repeat schedules attached to batches.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::ids::BatchId;

/// Longest accepted interval: one year.
pub const MAX_INTERVAL_SECONDS: i64 = 366 * 24 * 60 * 60;

/// A recurring trigger for a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schedule {
    pub batch_id: BatchId,
    pub interval_seconds: u64,
    pub enabled: bool,
    pub last_fired_at: Option<DateTime<Utc>>,
    pub next_fire_at: Option<DateTime<Utc>>,
    /// Ticks skipped because the previous run was still active.
    pub skipped_ticks: u64,
}

impl Schedule {
    /// Create an enabled schedule firing every `interval_seconds`.
    pub fn new(batch_id: BatchId, interval_seconds: i64) -> Result<Self, ValidationError> {
        if !(1..=MAX_INTERVAL_SECONDS).contains(&interval_seconds) {
            return Err(ValidationError::InvalidInterval(interval_seconds));
        }
        let mut schedule = Self {
            batch_id,
            interval_seconds: interval_seconds as u64,
            enabled: true,
            last_fired_at: None,
            next_fire_at: None,
            skipped_ticks: 0,
        };
        schedule.next_fire_at = schedule.next_after(Utc::now());
        Ok(schedule)
    }

    /// Interval as a chrono duration, `None` if out of chrono's range.
    pub fn interval(&self) -> Option<TimeDelta> {
        i64::try_from(self.interval_seconds)
            .ok()
            .and_then(TimeDelta::try_seconds)
    }

    fn next_after(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.interval().and_then(|d| now.checked_add_signed(d))
    }

    /// Record a fire at `now` and compute the next one.
    pub fn record_fire(&mut self, now: DateTime<Utc>, skipped: bool) {
        self.last_fired_at = Some(now);
        self.next_fire_at = self.next_after(now);
        if skipped {
            self.skipped_ticks += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_interval_rejected() {
        let err = Schedule::new(BatchId::new("b"), 0).unwrap_err();
        assert_eq!(err, ValidationError::InvalidInterval(0));
        assert!(Schedule::new(BatchId::new("b"), -5).is_err());
    }

    #[test]
    fn test_huge_interval_rejected() {
        let err = Schedule::new(BatchId::new("b"), 10_000_000_000_000).unwrap_err();
        assert_eq!(err, ValidationError::InvalidInterval(10_000_000_000_000));
        assert!(Schedule::new(BatchId::new("b"), i64::MAX).is_err());
        assert!(Schedule::new(BatchId::new("b"), MAX_INTERVAL_SECONDS + 1).is_err());
    }

    #[test]
    fn test_longest_interval_accepted() {
        let s = Schedule::new(BatchId::new("b"), MAX_INTERVAL_SECONDS).unwrap();
        assert_eq!(s.interval(), Some(TimeDelta::days(366)));
        assert!(s.next_fire_at.is_some());
    }

    #[test]
    fn test_valid_interval_stored() {
        let s = Schedule::new(BatchId::new("b"), 60).unwrap();
        assert_eq!(s.interval_seconds, 60);
        assert!(s.enabled);
        assert!(s.next_fire_at.is_some());
        assert!(s.last_fired_at.is_none());
    }

    #[test]
    fn test_record_fire() {
        let mut s = Schedule::new(BatchId::new("b"), 30).unwrap();
        let now = Utc::now();
        s.record_fire(now, true);
        assert_eq!(s.last_fired_at, Some(now));
        assert_eq!(s.next_fire_at, Some(now + TimeDelta::seconds(30)));
        assert_eq!(s.skipped_ticks, 1);
    }
}
