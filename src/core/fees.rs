//! Redemption fee state.
//!
//! The redemption fee is a decaying base rate plus a component proportional
//! to the share of total supply being redeemed:
//! - the base rate halves roughly every 12 hours of inactivity, decayed per
//!   whole minute with deterministic fixed-point exponentiation
//! - each redemption bumps the rate by `redeemed / (BETA * supply)`
//! - the applied rate is floored and capped by protocol constants
//!
//! Rate changes are previewed against current state and committed only after
//! the surrounding redemption has fully succeeded, so a rejected redemption
//! leaves the fee state untouched.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::constants::{
    BETA, MINUTE_DECAY_FACTOR, PRECISION, REDEMPTION_FEE_CEILING, REDEMPTION_FEE_FLOOR,
    SECONDS_PER_MINUTE,
};
use crate::utils::math::{dec_pow, safe_add_u128, safe_mul_div_u128};

// ═══════════════════════════════════════════════════════════════════════════════
// FEE STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Decaying base rate driving the redemption fee
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeeState {
    /// Current base rate at PRECISION, before decay since the last operation
    base_rate: u128,
    /// Timestamp of the last committed fee operation
    last_fee_operation_time: u64,
    /// Redemption fees collected so far, in collateral base units
    total_fees_collected: u64,
}

/// A previewed rate change, applied only after the redemption succeeds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RatePreview {
    /// Base rate after decay and the redemption bump
    pub new_base_rate: u128,
    /// Fee rate to apply to the drawn collateral
    pub rate: u128,
}

impl FeeState {
    /// Create a fee state with a zero base rate
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Stored base rate, before decay since the last operation
    pub fn base_rate(&self) -> u128 {
        self.base_rate
    }

    /// Redemption fees collected so far
    pub fn total_fees_collected(&self) -> u64 {
        self.total_fees_collected
    }

    /// Base rate with decay for the elapsed whole minutes applied
    pub fn decayed_base_rate(&self, now: u64) -> Result<u128> {
        let minutes = self.minutes_since_last_operation(now);
        let decay = dec_pow(MINUTE_DECAY_FACTOR, minutes);
        safe_mul_div_u128(self.base_rate, decay, PRECISION)
    }

    /// Fee rate that a redemption at `now` would pay before its own bump
    pub fn current_redemption_rate(&self, now: u64) -> Result<u128> {
        Ok(Self::redemption_rate(self.decayed_base_rate(now)?))
    }

    /// Clamp a base rate into the fee band
    pub fn redemption_rate(base_rate: u128) -> u128 {
        (REDEMPTION_FEE_FLOOR + base_rate).min(REDEMPTION_FEE_CEILING)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // RATE CHANGES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Preview the rate a redemption of `redeemed` against `total_supply`
    /// would pay, including its own bump to the base rate.
    pub fn preview_redemption_rate(
        &self,
        now: u64,
        redeemed: u64,
        total_supply: u64,
    ) -> Result<RatePreview> {
        if total_supply == 0 {
            return Err(Error::DivisionByZero {
                operation: "redeemed fraction of supply".into(),
            });
        }

        let decayed = self.decayed_base_rate(now)?;
        let redeemed_fraction =
            safe_mul_div_u128(redeemed as u128, PRECISION, total_supply as u128)?;
        let new_base_rate =
            safe_add_u128(decayed, redeemed_fraction / BETA)?.min(PRECISION);

        Ok(RatePreview {
            new_base_rate,
            rate: Self::redemption_rate(new_base_rate),
        })
    }

    /// Commit a previewed rate change after the redemption has succeeded
    pub fn commit_redemption(&mut self, now: u64, preview: RatePreview, fee_collected: u64) {
        self.base_rate = preview.new_base_rate;
        if self.minutes_since_last_operation(now) > 0 {
            self.last_fee_operation_time = now;
        }
        self.total_fees_collected = self.total_fees_collected.saturating_add(fee_collected);

        tracing::debug!(
            base_rate = %self.base_rate,
            fee_collected,
            "redemption fee committed"
        );
    }

    /// Fee on the drawn collateral at the given rate
    pub fn redemption_fee(rate: u128, collateral_drawn: u64) -> Result<u64> {
        let fee = safe_mul_div_u128(rate, collateral_drawn as u128, PRECISION)?;
        let fee = u64::try_from(fee).map_err(|_| Error::Overflow {
            operation: format!("redemption fee on {}", collateral_drawn),
        })?;
        if fee >= collateral_drawn {
            return Err(Error::FeeEatsAllCollateral);
        }
        Ok(fee)
    }

    fn minutes_since_last_operation(&self, now: u64) -> u64 {
        now.saturating_sub(self.last_fee_operation_time) / SECONDS_PER_MINUTE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // half-life of the minute decay factor
    const HALF_LIFE_MINUTES: u64 = 720;

    #[test]
    fn test_rate_starts_at_floor() {
        let fees = FeeState::new();
        assert_eq!(fees.current_redemption_rate(0).unwrap(), REDEMPTION_FEE_FLOOR);
    }

    #[test]
    fn test_redemption_bumps_base_rate() {
        let mut fees = FeeState::new();

        // redeem 5% of supply: bump = 5% / BETA = 2.5%, which keeps the
        // rate under the ceiling
        let preview = fees.preview_redemption_rate(60, 5_000, 100_000).unwrap();
        assert_eq!(preview.new_base_rate, PRECISION / 40);
        assert_eq!(preview.rate, REDEMPTION_FEE_FLOOR + PRECISION / 40);

        fees.commit_redemption(60, preview, 100);
        assert_eq!(fees.base_rate(), PRECISION / 40);
        assert_eq!(fees.total_fees_collected(), 100);
    }

    #[test]
    fn test_base_rate_decays_by_half_life() {
        let mut fees = FeeState::new();
        let preview = fees.preview_redemption_rate(0, 20_000, 100_000).unwrap();
        fees.commit_redemption(0, preview, 0);
        let initial = fees.base_rate();

        let decayed = fees
            .decayed_base_rate(HALF_LIFE_MINUTES * SECONDS_PER_MINUTE)
            .unwrap();
        let half = initial / 2;
        assert!(decayed.abs_diff(half) < initial / 1_000);
    }

    #[test]
    fn test_sub_minute_elapse_does_not_decay() {
        let mut fees = FeeState::new();
        let preview = fees.preview_redemption_rate(0, 20_000, 100_000).unwrap();
        fees.commit_redemption(0, preview, 0);

        assert_eq!(fees.decayed_base_rate(59).unwrap(), fees.base_rate());
    }

    #[test]
    fn test_rate_capped_at_ceiling() {
        let fees = FeeState::new();

        // redeeming the entire supply pushes the rate far over the cap
        let preview = fees.preview_redemption_rate(0, 100_000, 100_000).unwrap();
        assert_eq!(preview.rate, REDEMPTION_FEE_CEILING);
    }

    #[test]
    fn test_base_rate_capped_at_precision() {
        let mut fees = FeeState::new();
        for _ in 0..5 {
            let preview = fees.preview_redemption_rate(0, 100_000, 100_000).unwrap();
            fees.commit_redemption(0, preview, 0);
        }
        assert!(fees.base_rate() <= PRECISION);
    }

    #[test]
    fn test_fee_on_drawn_collateral() {
        // 1% of one whole collateral token
        let fee = FeeState::redemption_fee(PRECISION / 100, 100_000_000).unwrap();
        assert_eq!(fee, 1_000_000);
    }

    #[test]
    fn test_fee_eats_all_collateral() {
        let err = FeeState::redemption_fee(PRECISION, 100);
        assert!(matches!(err, Err(Error::FeeEatsAllCollateral)));
    }

    #[test]
    fn test_preview_does_not_mutate() {
        let fees = FeeState::new();
        fees.preview_redemption_rate(0, 50_000, 100_000).unwrap();
        assert_eq!(fees.base_rate(), 0);
        assert_eq!(fees.total_fees_collected(), 0);
    }

    #[test]
    fn test_zero_supply_rejected() {
        let fees = FeeState::new();
        let err = fees.preview_redemption_rate(0, 1, 0);
        assert!(matches!(err, Err(Error::DivisionByZero { .. })));
    }
}
