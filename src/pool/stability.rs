//! Stability pool: deposit compounding and liquidation absorption.
//!
//! Deposits absorb liquidated debt in exchange for the liquidated collateral.
//! Individual balances are never touched at liquidation time; instead the
//! pool keeps running products and sums:
//!
//! - `P` compounds every deposit lazily: a deposit made at `P0` is now worth
//!   `initial * P / P0`
//! - `S` accumulates collateral gain per unit deposited, folded by `P` at
//!   write time so reads take a single division
//! - `G` accumulates issued rewards per unit deposited, folded the same way
//!
//! When `P` would shrink below `1 / SCALE_FACTOR` of its start it is
//! re-scaled and a scale counter bumps; when the pool is fully emptied an
//! epoch counter bumps and `P` resets. Deposit snapshots record (P, S, G,
//! scale, epoch) so every depositor compounds against the history that
//! applied to them.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::liquidation::SettlementSink;
use crate::utils::constants::{COMPOUNDING_DUST_DIVISOR, PRECISION, SCALE_FACTOR};
use crate::utils::crypto::{Hash, PublicKey};
use crate::utils::math::{safe_add, safe_add_u128, safe_mul_div_u128, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// DEPOSIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Pool state captured when a deposit was made or last changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSnapshot {
    /// `P` at snapshot time
    pub p: u128,
    /// Collateral-gain sum at snapshot time, within the snapshot scale
    pub s: u128,
    /// Reward-gain sum at snapshot time, within the snapshot scale
    pub g: u128,
    /// Scale counter at snapshot time
    pub scale: u64,
    /// Epoch counter at snapshot time
    pub epoch: u64,
}

/// A single stability deposit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
    /// Deposit value when the snapshot was taken, in debt base units
    pub initial_value: u64,
    /// Pool state the deposit compounds against
    pub snapshot: DepositSnapshot,
}

/// Amounts moved by a deposit change
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DepositChange {
    /// Debt tokens actually withdrawn (zero for a provide)
    pub withdrawn: u64,
    /// Deposit value after the change
    pub new_deposit: u64,
    /// Collateral gain paid out by the change
    pub collateral_gain: u64,
    /// Reward gain paid out by the change
    pub reward_gain: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// The stability pool ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityPool {
    deposits: HashMap<PublicKey, Deposit>,
    /// Pool balance available to absorb liquidations, in debt base units
    total_deposits: u64,
    /// Collateral received from liquidations and not yet paid out
    collateral_gained: u64,
    /// Running compounding product, at PRECISION. Only ever decreases
    /// within an epoch.
    p: u128,
    current_epoch: u64,
    current_scale: u64,
    /// Collateral-gain sums per epoch and scale, folded by `P`
    s_sums: HashMap<u64, HashMap<u64, u128>>,
    /// Reward-gain sums per epoch and scale, folded by `P`
    g_sums: HashMap<u64, HashMap<u64, u128>>,
    /// Rounding remainders carried into the next offset / reward split
    last_debt_error: u128,
    last_coll_error: u128,
    last_reward_error: u128,
    /// Rewards allocated to depositors so far
    total_rewards_allocated: u64,
}

impl Default for StabilityPool {
    fn default() -> Self {
        Self::new()
    }
}

impl StabilityPool {
    /// Create an empty pool with `P` at its starting value
    pub fn new() -> Self {
        Self {
            deposits: HashMap::new(),
            total_deposits: 0,
            collateral_gained: 0,
            p: PRECISION,
            current_epoch: 0,
            current_scale: 0,
            s_sums: HashMap::new(),
            g_sums: HashMap::new(),
            last_debt_error: 0,
            last_coll_error: 0,
            last_reward_error: 0,
            total_rewards_allocated: 0,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Pool balance available to absorb liquidations
    pub fn total_deposits(&self) -> u64 {
        self.total_deposits
    }

    /// Collateral received from liquidations and not yet paid out
    pub fn collateral_gained(&self) -> u64 {
        self.collateral_gained
    }

    /// Number of open deposits
    pub fn depositor_count(&self) -> usize {
        self.deposits.len()
    }

    /// Raw deposit record for an owner
    pub fn deposit(&self, owner: &PublicKey) -> Option<&Deposit> {
        self.deposits.get(owner)
    }

    /// Current compounding product
    pub fn p(&self) -> u128 {
        self.p
    }

    /// Current epoch counter
    pub fn current_epoch(&self) -> u64 {
        self.current_epoch
    }

    /// Current scale counter
    pub fn current_scale(&self) -> u64 {
        self.current_scale
    }

    fn s_sum(&self, epoch: u64, scale: u64) -> u128 {
        self.s_sums
            .get(&epoch)
            .and_then(|scales| scales.get(&scale))
            .copied()
            .unwrap_or(0)
    }

    fn g_sum(&self, epoch: u64, scale: u64) -> u128 {
        self.g_sums
            .get(&epoch)
            .and_then(|scales| scales.get(&scale))
            .copied()
            .unwrap_or(0)
    }

    /// Deposit value after all liquidations since its snapshot.
    ///
    /// A deposit from a finished epoch is fully consumed; one from two or
    /// more scales back has compounded below representability and reads as
    /// zero, as does anything under a billionth of the initial value.
    pub fn compounded_deposit(&self, owner: &PublicKey) -> Result<u64> {
        let Some(deposit) = self.deposits.get(owner) else {
            return Ok(0);
        };
        let snap = &deposit.snapshot;

        if snap.epoch < self.current_epoch {
            return Ok(0);
        }
        let scale_diff = self.current_scale - snap.scale;
        if scale_diff >= 2 {
            return Ok(0);
        }

        let mut compounded =
            safe_mul_div_u128(deposit.initial_value as u128, self.p, snap.p)?;
        if scale_diff == 1 {
            compounded /= SCALE_FACTOR;
        }

        let compounded = u64::try_from(compounded).map_err(|_| Error::Overflow {
            operation: format!("compounded deposit {}", deposit.initial_value),
        })?;
        if compounded < deposit.initial_value / COMPOUNDING_DUST_DIVISOR {
            return Ok(0);
        }
        Ok(compounded)
    }

    /// Collateral gain accrued by the deposit since its snapshot.
    ///
    /// Sums the remainder of the snapshot scale and the whole following
    /// scale, scaled down; gains beyond one scale boundary are below
    /// representability.
    pub fn collateral_gain(&self, owner: &PublicKey) -> Result<u64> {
        let Some(deposit) = self.deposits.get(owner) else {
            return Ok(0);
        };
        let snap = &deposit.snapshot;

        let first = self.s_sum(snap.epoch, snap.scale).saturating_sub(snap.s);
        let second = self.s_sum(snap.epoch, snap.scale + 1) / SCALE_FACTOR;
        let sum = safe_add_u128(first, second)?;
        if sum == 0 {
            return Ok(0);
        }

        let gain = safe_mul_div_u128(deposit.initial_value as u128, sum, snap.p)?;
        u64::try_from(gain).map_err(|_| Error::Overflow {
            operation: format!("collateral gain {}", deposit.initial_value),
        })
    }

    /// Reward gain accrued by the deposit since its snapshot
    pub fn reward_gain(&self, owner: &PublicKey) -> Result<u64> {
        let Some(deposit) = self.deposits.get(owner) else {
            return Ok(0);
        };
        let snap = &deposit.snapshot;

        let first = self.g_sum(snap.epoch, snap.scale).saturating_sub(snap.g);
        let second = self.g_sum(snap.epoch, snap.scale + 1) / SCALE_FACTOR;
        let sum = safe_add_u128(first, second)?;
        if sum == 0 {
            return Ok(0);
        }

        let gain = safe_mul_div_u128(deposit.initial_value as u128, sum, snap.p)?;
        u64::try_from(gain).map_err(|_| Error::Overflow {
            operation: format!("reward gain {}", deposit.initial_value),
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEPOSIT CHANGES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Add to (or open) a deposit. The existing balance compounds first and
    /// accrued gains are paid out through the returned change record.
    pub fn provide(&mut self, owner: PublicKey, amount: u64) -> Result<DepositChange> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }

        let compounded = self.compounded_deposit(&owner)?;
        let collateral_gain = self.collateral_gain(&owner)?;
        let reward_gain = self.reward_gain(&owner)?;

        let new_deposit = safe_add(compounded, amount)?;
        self.total_deposits = safe_add(self.total_deposits, amount)?;
        self.collateral_gained = safe_sub(self.collateral_gained, collateral_gain)?;

        self.deposits.insert(
            owner,
            Deposit {
                initial_value: new_deposit,
                snapshot: self.snapshot(),
            },
        );

        tracing::debug!(
            owner = %owner.short(),
            amount,
            new_deposit,
            collateral_gain,
            "stability deposit provided"
        );
        Ok(DepositChange {
            withdrawn: 0,
            new_deposit,
            collateral_gain,
            reward_gain,
        })
    }

    /// Withdraw up to `amount` from the compounded deposit and pay out all
    /// accrued gains. `u64::MAX` withdraws everything; zero claims gains
    /// only. A deposit left at zero is removed.
    pub fn withdraw(&mut self, owner: &PublicKey, amount: u64) -> Result<DepositChange> {
        if !self.deposits.contains_key(owner) {
            return Err(Error::NoDeposit);
        }

        let compounded = self.compounded_deposit(owner)?;
        let collateral_gain = self.collateral_gain(owner)?;
        let reward_gain = self.reward_gain(owner)?;

        let withdrawn = amount.min(compounded);
        let new_deposit = compounded - withdrawn;

        // `absorb` floors each loss per unit, so a compounded balance can sit
        // a few units above the pool counter; the counter soaks up that slack
        // on exit instead of underflowing
        self.total_deposits = self.total_deposits.saturating_sub(withdrawn);
        self.collateral_gained = safe_sub(self.collateral_gained, collateral_gain)?;

        if new_deposit == 0 {
            self.deposits.remove(owner);
        } else {
            self.deposits.insert(
                *owner,
                Deposit {
                    initial_value: new_deposit,
                    snapshot: self.snapshot(),
                },
            );
        }

        tracing::debug!(
            owner = %owner.short(),
            withdrawn,
            new_deposit,
            collateral_gain,
            "stability deposit withdrawn"
        );
        Ok(DepositChange {
            withdrawn,
            new_deposit,
            collateral_gain,
            reward_gain,
        })
    }

    fn snapshot(&self) -> DepositSnapshot {
        DepositSnapshot {
            p: self.p,
            s: self.s_sum(self.current_epoch, self.current_scale),
            g: self.g_sum(self.current_epoch, self.current_scale),
            scale: self.current_scale,
            epoch: self.current_epoch,
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION OFFSET
    // ═══════════════════════════════════════════════════════════════════════════

    /// Absorb liquidated debt against the pool in exchange for collateral.
    ///
    /// `debt` must not exceed the pool balance; the liquidation engine clamps
    /// before calling. Rounding remainders carry into the next offset so the
    /// per-unit figures track the exact totals.
    pub fn absorb(&mut self, debt: u64, collateral: u64) -> Result<()> {
        if debt == 0 {
            return Ok(());
        }
        let total = self.total_deposits;
        if debt > total {
            return Err(Error::Internal {
                message: format!("offset {} exceeds pool balance {}", debt, total),
            });
        }

        let total_u128 = total as u128;
        let coll_numerator = safe_add_u128(
            (collateral as u128)
                .checked_mul(PRECISION)
                .ok_or_else(|| Error::Overflow {
                    operation: format!("{} * PRECISION", collateral),
                })?,
            self.last_coll_error,
        )?;
        let coll_gain_per_unit = coll_numerator / total_u128;
        let next_coll_error = coll_numerator - coll_gain_per_unit * total_u128;

        // losses round down so cumulative absorbed debt never exceeds the
        // amount offset; the remainder carries into the next offset
        let (debt_loss_per_unit, next_debt_error) = if debt == total {
            (PRECISION, 0)
        } else {
            let debt_numerator = safe_add_u128(
                (debt as u128)
                    .checked_mul(PRECISION)
                    .ok_or_else(|| Error::Overflow {
                        operation: format!("{} * PRECISION", debt),
                    })?,
                self.last_debt_error,
            )?;
            let per_unit = (debt_numerator / total_u128).min(PRECISION - 1);
            (per_unit, debt_numerator - per_unit * total_u128)
        };

        // fold the current P into S so gain reads take a single division
        let marginal_s = safe_mul_div_u128(coll_gain_per_unit, self.p, PRECISION)?;
        let next_s = safe_add_u128(
            self.s_sum(self.current_epoch, self.current_scale),
            marginal_s,
        )?;

        // settle the next P, epoch, and scale before mutating anything, so a
        // failed offset leaves the pool exactly as it was
        let product_factor = PRECISION - debt_loss_per_unit;
        let (next_p, next_epoch, next_scale) = if product_factor == 0 {
            (PRECISION, self.current_epoch + 1, 0)
        } else {
            let new_p = safe_mul_div_u128(self.p, product_factor, PRECISION)?;
            let (new_p, new_scale) = if new_p < SCALE_FACTOR {
                let lifted = safe_mul_div_u128(
                    self.p,
                    product_factor.checked_mul(SCALE_FACTOR).ok_or_else(|| {
                        Error::Overflow {
                            operation: format!("{} * SCALE_FACTOR", product_factor),
                        }
                    })?,
                    PRECISION,
                )?;
                (lifted, self.current_scale + 1)
            } else {
                (new_p, self.current_scale)
            };
            if new_p == 0 {
                return Err(Error::Internal {
                    message: "stability pool product vanished".into(),
                });
            }
            (new_p, self.current_epoch, new_scale)
        };
        let next_collateral_gained = safe_add(self.collateral_gained, collateral)?;

        self.last_coll_error = next_coll_error;
        self.last_debt_error = next_debt_error;
        self.s_sums
            .entry(self.current_epoch)
            .or_default()
            .insert(self.current_scale, next_s);
        if next_epoch > self.current_epoch {
            tracing::info!(epoch = next_epoch, "stability pool emptied, new epoch");
        } else if next_scale > self.current_scale {
            tracing::info!(scale = next_scale, p = %next_p, "stability pool scale bump");
        }
        self.p = next_p;
        self.current_epoch = next_epoch;
        self.current_scale = next_scale;
        self.total_deposits = total - debt;
        self.collateral_gained = next_collateral_gained;

        tracing::debug!(
            debt,
            collateral,
            p = %self.p,
            remaining = self.total_deposits,
            "stability pool absorbed liquidation"
        );
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REWARD ISSUANCE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Spread newly issued reward tokens across current deposits via `G`.
    /// A pool with no deposits drops the amount.
    pub fn add_reward(&mut self, amount: u64) -> Result<()> {
        if amount == 0 || self.total_deposits == 0 {
            return Ok(());
        }
        let total = self.total_deposits as u128;

        let numerator = safe_add_u128(
            (amount as u128)
                .checked_mul(PRECISION)
                .ok_or_else(|| Error::Overflow {
                    operation: format!("{} * PRECISION", amount),
                })?,
            self.last_reward_error,
        )?;
        let reward_per_unit = numerator / total;
        self.last_reward_error = numerator - reward_per_unit * total;

        let marginal_g = safe_mul_div_u128(reward_per_unit, self.p, PRECISION)?;
        let g_entry = self
            .g_sums
            .entry(self.current_epoch)
            .or_default()
            .entry(self.current_scale)
            .or_insert(0);
        *g_entry = safe_add_u128(*g_entry, marginal_g)?;

        self.total_rewards_allocated = safe_add(self.total_rewards_allocated, amount)?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OBSERVABILITY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Aggregate pool statistics
    pub fn statistics(&self) -> PoolStatistics {
        PoolStatistics {
            total_deposits: self.total_deposits,
            depositor_count: self.deposits.len() as u64,
            collateral_gained: self.collateral_gained,
            current_epoch: self.current_epoch,
            current_scale: self.current_scale,
            p: self.p,
            total_rewards_allocated: self.total_rewards_allocated,
        }
    }

    /// Deterministic digest of the pool: deposits hashed in owner order plus
    /// the compounding state.
    pub fn state_hash(&self) -> Hash {
        let mut owners: Vec<&PublicKey> = self.deposits.keys().collect();
        owners.sort();

        let mut data = Vec::new();
        for owner in owners {
            if let Some(deposit) = self.deposits.get(owner) {
                data.extend_from_slice(owner.as_bytes());
                data.extend_from_slice(&deposit.initial_value.to_be_bytes());
                data.extend_from_slice(&deposit.snapshot.p.to_be_bytes());
                data.extend_from_slice(&deposit.snapshot.s.to_be_bytes());
                data.extend_from_slice(&deposit.snapshot.g.to_be_bytes());
                data.extend_from_slice(&deposit.snapshot.scale.to_be_bytes());
                data.extend_from_slice(&deposit.snapshot.epoch.to_be_bytes());
            }
        }
        data.extend_from_slice(&self.total_deposits.to_be_bytes());
        data.extend_from_slice(&self.p.to_be_bytes());
        data.extend_from_slice(&self.current_epoch.to_be_bytes());
        data.extend_from_slice(&self.current_scale.to_be_bytes());
        data.extend_from_slice(&self.s_sum(self.current_epoch, self.current_scale).to_be_bytes());
        data.extend_from_slice(&self.g_sum(self.current_epoch, self.current_scale).to_be_bytes());
        Hash::sha256(&data)
    }
}

impl SettlementSink for StabilityPool {
    fn absorbable(&self) -> u64 {
        self.total_deposits
    }

    fn offset(&mut self, debt: u64, collateral: u64) -> Result<()> {
        self.absorb(debt, collateral)
    }
}

/// Aggregate stability pool statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatistics {
    /// Pool balance in debt base units
    pub total_deposits: u64,
    /// Number of open deposits
    pub depositor_count: u64,
    /// Collateral held for depositors
    pub collateral_gained: u64,
    /// Current epoch counter
    pub current_epoch: u64,
    /// Current scale counter
    pub current_scale: u64,
    /// Current compounding product
    pub p: u128,
    /// Rewards allocated to depositors so far
    pub total_rewards_allocated: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::{COLL_BASE_UNIT, PUBKEY_LENGTH};

    fn test_pubkey(tag: u8) -> PublicKey {
        PublicKey::new([tag; PUBKEY_LENGTH])
    }

    #[test]
    fn test_provide_and_compound_after_offset() {
        let mut pool = StabilityPool::new();
        pool.provide(test_pubkey(2), 20_000).unwrap();

        // absorb a quarter of the pool: 50.00 debt against 1 collateral token
        pool.absorb(5_000, COLL_BASE_UNIT).unwrap();

        assert_eq!(pool.p(), 3 * PRECISION / 4);
        assert_eq!(pool.compounded_deposit(&test_pubkey(2)).unwrap(), 15_000);
        assert_eq!(pool.collateral_gain(&test_pubkey(2)).unwrap(), COLL_BASE_UNIT);
        assert_eq!(pool.total_deposits(), 15_000);
    }

    #[test]
    fn test_full_drain_bumps_epoch() {
        let mut pool = StabilityPool::new();
        pool.provide(test_pubkey(2), 20_000).unwrap();
        pool.absorb(5_000, COLL_BASE_UNIT).unwrap();

        // drain the remaining 150.00
        pool.absorb(15_000, 3 * COLL_BASE_UNIT).unwrap();

        assert_eq!(pool.current_epoch(), 1);
        assert_eq!(pool.current_scale(), 0);
        assert_eq!(pool.p(), PRECISION);
        assert_eq!(pool.total_deposits(), 0);
        assert_eq!(pool.compounded_deposit(&test_pubkey(2)).unwrap(), 0);

        // gains from both offsets survive the epoch bump
        let gain = pool.collateral_gain(&test_pubkey(2)).unwrap();
        assert_eq!(gain, 4 * COLL_BASE_UNIT);
    }

    #[test]
    fn test_withdraw_sentinel_takes_everything() {
        let mut pool = StabilityPool::new();
        pool.provide(test_pubkey(2), 20_000).unwrap();
        pool.absorb(5_000, COLL_BASE_UNIT).unwrap();

        let change = pool.withdraw(&test_pubkey(2), u64::MAX).unwrap();
        assert_eq!(change.withdrawn, 15_000);
        assert_eq!(change.new_deposit, 0);
        assert_eq!(change.collateral_gain, COLL_BASE_UNIT);

        // deposit record is gone and the pool is empty
        assert!(pool.deposit(&test_pubkey(2)).is_none());
        assert_eq!(pool.total_deposits(), 0);
        assert_eq!(pool.collateral_gained(), 0);

        let err = pool.withdraw(&test_pubkey(2), 1);
        assert!(matches!(err, Err(Error::NoDeposit { .. })));
    }

    #[test]
    fn test_partial_withdraw_clamps() {
        let mut pool = StabilityPool::new();
        pool.provide(test_pubkey(2), 20_000).unwrap();
        pool.absorb(5_000, COLL_BASE_UNIT).unwrap();

        // more than the compounded balance clamps to it
        let change = pool.withdraw(&test_pubkey(2), 16_000).unwrap();
        assert_eq!(change.withdrawn, 15_000);
        assert_eq!(change.new_deposit, 0);
    }

    #[test]
    fn test_sentinel_withdraw_after_floored_losses() {
        let mut pool = StabilityPool::new();
        pool.provide(test_pubkey(2), 2_000_000_000_000_000_000).unwrap();

        // the floored loss per unit leaves the compounded balance one base
        // unit above the pool counter
        pool.absorb(10_001, 1).unwrap();
        let compounded = pool.compounded_deposit(&test_pubkey(2)).unwrap();
        assert_eq!(compounded, 1_999_999_999_999_990_000);
        assert_eq!(pool.total_deposits(), 1_999_999_999_999_989_999);

        // the sentinel still drains the whole deposit
        let change = pool.withdraw(&test_pubkey(2), u64::MAX).unwrap();
        assert_eq!(change.withdrawn, compounded);
        assert_eq!(change.new_deposit, 0);
        assert!(pool.deposit(&test_pubkey(2)).is_none());
        assert_eq!(pool.total_deposits(), 0);
    }

    #[test]
    fn test_two_depositors_split_proportionally() {
        let mut pool = StabilityPool::new();
        pool.provide(test_pubkey(2), 30_000).unwrap();
        pool.provide(test_pubkey(3), 10_000).unwrap();

        pool.absorb(20_000, 2 * COLL_BASE_UNIT).unwrap();

        // losses split 3:1
        assert_eq!(pool.compounded_deposit(&test_pubkey(2)).unwrap(), 15_000);
        assert_eq!(pool.compounded_deposit(&test_pubkey(3)).unwrap(), 5_000);

        // gains split 3:1 with at most one base unit of rounding dust
        let g2 = pool.collateral_gain(&test_pubkey(2)).unwrap();
        let g3 = pool.collateral_gain(&test_pubkey(3)).unwrap();
        assert!(g2 >= 3 * COLL_BASE_UNIT / 2 - 1);
        assert!(g3 >= COLL_BASE_UNIT / 2 - 1);
        assert!(g2 + g3 <= 2 * COLL_BASE_UNIT);
    }

    #[test]
    fn test_provide_compounds_existing_deposit() {
        let mut pool = StabilityPool::new();
        pool.provide(test_pubkey(2), 20_000).unwrap();
        pool.absorb(5_000, COLL_BASE_UNIT).unwrap();

        // topping up pays the pending gain and re-bases the deposit
        let change = pool.provide(test_pubkey(2), 5_000).unwrap();
        assert_eq!(change.new_deposit, 20_000);
        assert_eq!(change.collateral_gain, COLL_BASE_UNIT);
        assert_eq!(pool.total_deposits(), 20_000);

        // snapshot is fresh: no further gain until the next offset
        assert_eq!(pool.collateral_gain(&test_pubkey(2)).unwrap(), 0);
    }

    #[test]
    fn test_scale_bump_keeps_precision() {
        let mut pool = StabilityPool::new();
        pool.provide(test_pubkey(2), 1_000_000_000_000).unwrap();

        // burn all but one part per 1e10 of the pool without emptying it
        let total = pool.total_deposits();
        let burn = total - total / 10_000_000_000;
        pool.absorb(burn, COLL_BASE_UNIT).unwrap();

        assert_eq!(pool.current_scale(), 1);
        assert!(pool.p() >= SCALE_FACTOR);

        // a ten-billionth of the initial sits under the dust cutoff
        let compounded = pool.compounded_deposit(&test_pubkey(2)).unwrap();
        assert_eq!(compounded, 0);
    }

    #[test]
    fn test_deposit_across_scale_bump_still_gains() {
        let mut pool = StabilityPool::new();
        pool.provide(test_pubkey(2), 1_000_000_000_000).unwrap();

        let total = pool.total_deposits();
        pool.absorb(total - 50, COLL_BASE_UNIT).unwrap();
        assert_eq!(pool.current_scale(), 1);

        // gain reads across the boundary through the next-scale term
        let gain = pool.collateral_gain(&test_pubkey(2)).unwrap();
        assert!(gain > 0);
        assert!(gain <= COLL_BASE_UNIT);
    }

    #[test]
    fn test_rewards_spread_over_deposits() {
        let mut pool = StabilityPool::new();
        pool.provide(test_pubkey(2), 30_000).unwrap();
        pool.provide(test_pubkey(3), 10_000).unwrap();

        pool.add_reward(1_000).unwrap();

        let r2 = pool.reward_gain(&test_pubkey(2)).unwrap();
        let r3 = pool.reward_gain(&test_pubkey(3)).unwrap();
        assert!(r2 >= 749 && r2 <= 750);
        assert!(r3 >= 249 && r3 <= 250);

        // rewards to an empty pool are dropped
        let mut empty = StabilityPool::new();
        empty.add_reward(1_000).unwrap();
        assert_eq!(empty.statistics().total_rewards_allocated, 0);
    }

    #[test]
    fn test_offset_error_carry() {
        let mut pool = StabilityPool::new();
        // three units deposited, amounts that do not divide evenly
        pool.provide(test_pubkey(2), 300).unwrap();
        pool.absorb(100, 1_000_003).unwrap();
        pool.absorb(100, 1_000_001).unwrap();

        // carried remainders keep the total gain within one unit of exact
        let gain = pool.collateral_gain(&test_pubkey(2)).unwrap();
        assert!(gain >= 2_000_002 && gain <= 2_000_004);
    }

    #[test]
    fn test_absorb_rejects_over_balance() {
        let mut pool = StabilityPool::new();
        pool.provide(test_pubkey(2), 100).unwrap();
        let before = pool.state_hash();

        let err = pool.absorb(101, COLL_BASE_UNIT);
        assert!(matches!(err, Err(Error::Internal { .. })));

        // a failed offset leaves the pool untouched
        assert_eq!(pool.state_hash(), before);
        assert_eq!(pool.total_deposits(), 100);
    }

    #[test]
    fn test_zero_amount_provide_rejected() {
        let mut pool = StabilityPool::new();
        let err = pool.provide(test_pubkey(2), 0);
        assert!(matches!(err, Err(Error::ZeroAmount)));
    }

    #[test]
    fn test_state_hash_tracks_changes() {
        let mut pool = StabilityPool::new();
        pool.provide(test_pubkey(2), 20_000).unwrap();
        let h1 = pool.state_hash();
        pool.absorb(5_000, COLL_BASE_UNIT).unwrap();
        let h2 = pool.state_hash();
        assert_ne!(h1, h2);
    }
}
