//! Reward token issuance for stability depositors.
//!
//! A flat per-second schedule: each elapsed second mints `rate_per_second`
//! reward tokens, which the caller feeds into the pool's `G` accumulator.
//! The schedule anchors itself on first use so no rewards accrue for time
//! before the system started ticking.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::utils::math::{safe_add, safe_mul};

/// Per-second reward issuance schedule
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuanceSchedule {
    /// Reward tokens minted per elapsed second
    rate_per_second: u64,
    /// Timestamp of the last issuance, unset until the first call
    last_issue_time: Option<u64>,
    /// Total reward tokens issued so far
    total_issued: u64,
}

impl IssuanceSchedule {
    /// Create a schedule minting `rate_per_second` tokens per second
    pub fn new(rate_per_second: u64) -> Self {
        Self {
            rate_per_second,
            last_issue_time: None,
            total_issued: 0,
        }
    }

    /// Reward tokens minted per elapsed second
    pub fn rate_per_second(&self) -> u64 {
        self.rate_per_second
    }

    /// Total reward tokens issued so far
    pub fn total_issued(&self) -> u64 {
        self.total_issued
    }

    /// Mint the rewards accrued since the last call.
    ///
    /// The first call anchors the schedule at `now` and mints nothing; a
    /// clock that has not advanced mints nothing.
    pub fn issue(&mut self, now: u64) -> Result<u64> {
        let Some(last) = self.last_issue_time else {
            self.last_issue_time = Some(now);
            return Ok(0);
        };
        if now <= last {
            return Ok(0);
        }

        let amount = safe_mul(self.rate_per_second, now - last)?;
        self.last_issue_time = Some(now);
        self.total_issued = safe_add(self.total_issued, amount)?;
        Ok(amount)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_call_anchors() {
        let mut schedule = IssuanceSchedule::new(10);
        assert_eq!(schedule.issue(1_000).unwrap(), 0);
        assert_eq!(schedule.total_issued(), 0);
    }

    #[test]
    fn test_accrues_per_second() {
        let mut schedule = IssuanceSchedule::new(10);
        schedule.issue(1_000).unwrap();
        assert_eq!(schedule.issue(1_060).unwrap(), 600);
        assert_eq!(schedule.total_issued(), 600);
    }

    #[test]
    fn test_stalled_clock_mints_nothing() {
        let mut schedule = IssuanceSchedule::new(10);
        schedule.issue(1_000).unwrap();
        assert_eq!(schedule.issue(1_000).unwrap(), 0);
        assert_eq!(schedule.issue(999).unwrap(), 0);
        assert_eq!(schedule.total_issued(), 0);
    }

    #[test]
    fn test_zero_rate() {
        let mut schedule = IssuanceSchedule::new(0);
        schedule.issue(0).unwrap();
        assert_eq!(schedule.issue(1_000_000).unwrap(), 0);
    }
}
