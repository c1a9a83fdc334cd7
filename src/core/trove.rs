//! Trove registry and redistribution accounting.
//!
//! This module implements the position ledger at the heart of the protocol:
//! - Trove records (collateral, debt, stake, status) keyed by owner
//! - The flat existence array giving O(1) removal
//! - Per-stake redistribution accumulators with rounding-error carries
//! - Pending-reward derivation and idempotent application
//!
//! Liquidated debt and collateral that the stability pool cannot absorb is
//! spread across all remaining troves through the `l_collateral` / `l_debt`
//! accumulators; each trove's share is derived from its stake and reward
//! snapshot, never stored, so a redistribution is O(1) no matter how many
//! troves exist.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::utils::constants::PRECISION;
use crate::utils::crypto::{Hash, PublicKey};
use crate::utils::math::{
    calculate_collateral_ratio, calculate_nominal_ratio, median, safe_add, safe_add_u128,
    safe_mul_div, safe_mul_div_u128, safe_sub,
};

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle status of a trove
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TroveStatus {
    /// Never opened
    NonExistent,
    /// Open, carrying debt, present in the sorted index
    Active,
    /// Closed by its owner repaying in full
    ClosedByOwner,
    /// Closed by liquidation
    ClosedByLiquidation,
    /// Closed by a redemption draining its full debt
    ClosedByRedemption,
}

impl TroveStatus {
    /// Whether the trove is open
    pub fn is_active(&self) -> bool {
        matches!(self, TroveStatus::Active)
    }

    /// Whether the trove reached a terminal state
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            TroveStatus::ClosedByOwner
                | TroveStatus::ClosedByLiquidation
                | TroveStatus::ClosedByRedemption
        )
    }
}

impl Default for TroveStatus {
    fn default() -> Self {
        TroveStatus::NonExistent
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REWARD SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════════

/// Accumulator values last applied to a trove. Pending rewards are the
/// stake-weighted difference between the global accumulators and this.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSnapshot {
    /// `l_collateral` at last application
    pub collateral: u128,
    /// `l_debt` at last application
    pub debt: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE
// ═══════════════════════════════════════════════════════════════════════════════

/// A single collateralized debt position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trove {
    /// Owner's public key
    pub owner: PublicKey,
    /// Collateral in base units, excluding pending redistribution rewards
    pub collateral: u64,
    /// Debt in debt base units, excluding pending redistribution rewards
    pub debt: u64,
    /// Redistribution weight, rebased against system snapshots
    pub stake: u64,
    /// Lifecycle status
    pub status: TroveStatus,
    /// Position in the existence array, for O(1) swap-removal
    pub array_index: usize,
    /// Accumulator values last applied to this trove
    pub reward_snapshot: RewardSnapshot,
}

/// A trove's debt and collateral with pending redistribution rewards
/// folded in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntirePosition {
    /// Total debt including pending rewards
    pub debt: u64,
    /// Total collateral including pending rewards
    pub collateral: u64,
    /// Pending debt reward alone
    pub pending_debt: u64,
    /// Pending collateral reward alone
    pub pending_collateral: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TROVE MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Registry of all troves plus the redistribution state
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TroveManager {
    /// All troves ever opened, keyed by owner; closed records keep their
    /// terminal status
    troves: HashMap<PublicKey, Trove>,
    /// Existence array of active trove owners
    trove_owners: Vec<PublicKey>,
    /// Sum of all active stakes
    total_stakes: u64,
    /// Total stakes captured after the last liquidation
    total_stakes_snapshot: u64,
    /// System collateral (active + pending) captured after the last
    /// liquidation, excluding amounts sent out by it
    total_collateral_snapshot: u64,
    /// Redistributed collateral per unit staked, at PRECISION
    l_collateral: u128,
    /// Redistributed debt per unit staked, at PRECISION
    l_debt: u128,
    /// Rounding remainder carried into the next collateral redistribution
    last_coll_error: u128,
    /// Rounding remainder carried into the next debt redistribution
    last_debt_error: u128,
    /// Debt recorded on active troves
    active_debt: u64,
    /// Collateral recorded on active troves
    active_collateral: u64,
    /// Redistributed debt not yet applied to individual troves
    default_debt: u64,
    /// Redistributed collateral not yet applied to individual troves
    default_collateral: u64,
}

impl TroveManager {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Get a trove record by owner
    pub fn get(&self, owner: &PublicKey) -> Option<&Trove> {
        self.troves.get(owner)
    }

    /// Whether the owner has an active trove
    pub fn is_active(&self, owner: &PublicKey) -> bool {
        self.troves
            .get(owner)
            .map(|t| t.status.is_active())
            .unwrap_or(false)
    }

    /// Status of the owner's trove
    pub fn status(&self, owner: &PublicKey) -> TroveStatus {
        self.troves
            .get(owner)
            .map(|t| t.status)
            .unwrap_or_default()
    }

    /// Number of active troves
    pub fn active_count(&self) -> usize {
        self.trove_owners.len()
    }

    /// Active trove owners in existence-array order
    pub fn active_owners(&self) -> &[PublicKey] {
        &self.trove_owners
    }

    /// Sum of all active stakes
    pub fn total_stakes(&self) -> u64 {
        self.total_stakes
    }

    /// Redistributed collateral per unit staked, at PRECISION
    pub fn l_collateral(&self) -> u128 {
        self.l_collateral
    }

    /// Redistributed debt per unit staked, at PRECISION
    pub fn l_debt(&self) -> u128 {
        self.l_debt
    }

    /// Debt recorded on active troves, excluding pending redistributions
    pub fn active_debt(&self) -> u64 {
        self.active_debt
    }

    /// Redistributed debt not yet applied to individual troves
    pub fn default_debt(&self) -> u64 {
        self.default_debt
    }

    /// Collateral recorded on active troves
    pub fn active_collateral(&self) -> u64 {
        self.active_collateral
    }

    /// Redistributed collateral not yet applied to individual troves
    pub fn default_collateral(&self) -> u64 {
        self.default_collateral
    }

    /// Total system debt: active plus redistributed-pending
    pub fn entire_system_debt(&self) -> u64 {
        self.active_debt.saturating_add(self.default_debt)
    }

    /// Total system collateral: active plus redistributed-pending
    pub fn entire_system_collateral(&self) -> u64 {
        self.active_collateral.saturating_add(self.default_collateral)
    }

    fn active_trove(&self, owner: &PublicKey) -> Result<&Trove> {
        self.troves
            .get(owner)
            .filter(|t| t.status.is_active())
            .ok_or_else(|| Error::TroveNotFound {
                owner: owner.short(),
            })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PENDING REWARDS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Whether the trove has unapplied redistribution rewards
    pub fn has_pending_rewards(&self, owner: &PublicKey) -> bool {
        match self.troves.get(owner) {
            Some(t) if t.status.is_active() => {
                t.reward_snapshot.collateral < self.l_collateral
                    || t.reward_snapshot.debt < self.l_debt
            }
            _ => false,
        }
    }

    /// Pending collateral reward: `stake * (l_collateral - snapshot) / PRECISION`
    pub fn pending_collateral_reward(&self, owner: &PublicKey) -> Result<u64> {
        let trove = self.active_trove(owner)?;
        Self::pending_amount(trove.stake, self.l_collateral, trove.reward_snapshot.collateral)
    }

    /// Pending debt reward: `stake * (l_debt - snapshot) / PRECISION`
    pub fn pending_debt_reward(&self, owner: &PublicKey) -> Result<u64> {
        let trove = self.active_trove(owner)?;
        Self::pending_amount(trove.stake, self.l_debt, trove.reward_snapshot.debt)
    }

    fn pending_amount(stake: u64, accumulator: u128, snapshot: u128) -> Result<u64> {
        if accumulator <= snapshot || stake == 0 {
            return Ok(0);
        }
        let delta = accumulator - snapshot;
        let amount = safe_mul_div_u128(stake as u128, delta, PRECISION)?;
        u64::try_from(amount).map_err(|_| Error::Overflow {
            operation: format!("pending reward {} * {}", stake, delta),
        })
    }

    /// A trove's debt and collateral with pending rewards folded in
    pub fn entire_position(&self, owner: &PublicKey) -> Result<EntirePosition> {
        let trove = self.active_trove(owner)?;
        let pending_collateral =
            Self::pending_amount(trove.stake, self.l_collateral, trove.reward_snapshot.collateral)?;
        let pending_debt =
            Self::pending_amount(trove.stake, self.l_debt, trove.reward_snapshot.debt)?;
        Ok(EntirePosition {
            debt: safe_add(trove.debt, pending_debt)?,
            collateral: safe_add(trove.collateral, pending_collateral)?,
            pending_debt,
            pending_collateral,
        })
    }

    /// Collateralization ratio at the given price, pending rewards included
    pub fn current_icr(&self, owner: &PublicKey, price: u64) -> Result<u128> {
        let entire = self.entire_position(owner)?;
        calculate_collateral_ratio(entire.collateral, entire.debt, price)
    }

    /// Nominal (price-independent) ratio, pending rewards included
    pub fn nominal_icr(&self, owner: &PublicKey) -> Result<u128> {
        let entire = self.entire_position(owner)?;
        Ok(calculate_nominal_ratio(entire.collateral, entire.debt))
    }

    /// Fold the trove's pending redistribution rewards into its record and
    /// reset its snapshot to the current accumulators.
    ///
    /// Idempotent: a second consecutive call finds nothing pending.
    pub fn apply_pending_rewards(&mut self, owner: &PublicKey) -> Result<()> {
        let entire = self.entire_position(owner)?;

        if entire.pending_debt > 0 || entire.pending_collateral > 0 {
            // move the applied amounts from the pending buckets to active
            self.default_debt = safe_sub(self.default_debt, entire.pending_debt)?;
            self.default_collateral = safe_sub(self.default_collateral, entire.pending_collateral)?;
            self.active_debt = safe_add(self.active_debt, entire.pending_debt)?;
            self.active_collateral = safe_add(self.active_collateral, entire.pending_collateral)?;
        }

        let l_collateral = self.l_collateral;
        let l_debt = self.l_debt;
        let trove = self
            .troves
            .get_mut(owner)
            .ok_or_else(|| Error::TroveNotFound {
                owner: owner.short(),
            })?;
        trove.debt = entire.debt;
        trove.collateral = entire.collateral;
        trove.reward_snapshot = RewardSnapshot {
            collateral: l_collateral,
            debt: l_debt,
        };
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Open a new trove with the given collateral and debt.
    ///
    /// Ratio and minimum-debt checks belong to the caller; this only rejects
    /// duplicates and records the position.
    pub fn open_trove(&mut self, owner: PublicKey, collateral: u64, debt: u64) -> Result<()> {
        if self.is_active(&owner) {
            return Err(Error::TroveAlreadyActive {
                owner: owner.short(),
            });
        }
        if debt == 0 || collateral == 0 {
            return Err(Error::ZeroAmount);
        }

        let stake = self.compute_new_stake(collateral)?;
        let array_index = self.trove_owners.len();
        self.trove_owners.push(owner);

        self.troves.insert(
            owner,
            Trove {
                owner,
                collateral,
                debt,
                stake,
                status: TroveStatus::Active,
                array_index,
                reward_snapshot: RewardSnapshot {
                    collateral: self.l_collateral,
                    debt: self.l_debt,
                },
            },
        );

        self.total_stakes = safe_add(self.total_stakes, stake)?;
        self.active_debt = safe_add(self.active_debt, debt)?;
        self.active_collateral = safe_add(self.active_collateral, collateral)?;
        Ok(())
    }

    /// Replace a trove's recorded collateral and debt (borrower adjustment
    /// or partial redemption), rebasing its stake.
    ///
    /// Pending rewards must have been applied first; guard checks belong to
    /// the caller.
    pub fn set_position(&mut self, owner: &PublicKey, collateral: u64, debt: u64) -> Result<()> {
        let (old_coll, old_debt) = {
            let trove = self.active_trove(owner)?;
            (trove.collateral, trove.debt)
        };
        if debt == 0 {
            return Err(Error::ZeroAmount);
        }

        self.active_collateral = safe_sub(self.active_collateral, old_coll)?;
        self.active_collateral = safe_add(self.active_collateral, collateral)?;
        self.active_debt = safe_sub(self.active_debt, old_debt)?;
        self.active_debt = safe_add(self.active_debt, debt)?;

        let new_stake = self.compute_new_stake(collateral)?;
        let trove = self
            .troves
            .get_mut(owner)
            .ok_or_else(|| Error::TroveNotFound {
                owner: owner.short(),
            })?;
        let old_stake = trove.stake;
        trove.collateral = collateral;
        trove.debt = debt;
        trove.stake = new_stake;

        self.total_stakes = safe_sub(self.total_stakes, old_stake)?;
        self.total_stakes = safe_add(self.total_stakes, new_stake)?;
        Ok(())
    }

    /// Remove the trove's stake from the total ahead of closing it by
    /// liquidation, so the redistribution denominator excludes it.
    pub fn remove_stake(&mut self, owner: &PublicKey) -> Result<()> {
        let trove = self
            .troves
            .get_mut(owner)
            .filter(|t| t.status.is_active())
            .ok_or_else(|| Error::TroveNotFound {
                owner: owner.short(),
            })?;
        let stake = trove.stake;
        trove.stake = 0;
        self.total_stakes = safe_sub(self.total_stakes, stake)?;
        Ok(())
    }

    /// Close an active trove: zero its record, drop it from the existence
    /// array, and return the (debt, collateral) removed from the active
    /// totals.
    ///
    /// The caller decides where the removed amounts go (pool, redistribution,
    /// redeemer, surplus). For liquidation paths the stake must already have
    /// been removed via [`TroveManager::remove_stake`].
    pub fn close_trove(&mut self, owner: &PublicKey, status: TroveStatus) -> Result<(u64, u64)> {
        if !status.is_closed() {
            return Err(Error::Internal {
                message: "close_trove requires a terminal status".into(),
            });
        }
        let (debt, collateral, stake, array_index) = {
            let trove = self.active_trove(owner)?;
            (trove.debt, trove.collateral, trove.stake, trove.array_index)
        };

        // owner-close and redemption-close still carry their stake
        self.total_stakes = safe_sub(self.total_stakes, stake)?;
        self.active_debt = safe_sub(self.active_debt, debt)?;
        self.active_collateral = safe_sub(self.active_collateral, collateral)?;

        // swap-remove from the existence array, fixing the moved entry
        let last_index = self.trove_owners.len() - 1;
        self.trove_owners.swap_remove(array_index);
        if array_index != last_index {
            let moved_owner = self.trove_owners[array_index];
            if let Some(moved) = self.troves.get_mut(&moved_owner) {
                moved.array_index = array_index;
            }
        }

        let trove = self
            .troves
            .get_mut(owner)
            .ok_or_else(|| Error::TroveNotFound {
                owner: owner.short(),
            })?;
        trove.status = status;
        trove.collateral = 0;
        trove.debt = 0;
        trove.stake = 0;
        trove.array_index = 0;
        trove.reward_snapshot = RewardSnapshot::default();

        Ok((debt, collateral))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REDISTRIBUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Spread liquidated debt and collateral across all remaining troves by
    /// bumping the per-stake accumulators.
    ///
    /// The dying trove's stake must already be removed from `total_stakes`.
    /// Rounding remainders are carried into the next redistribution so the
    /// accumulated totals track the exact amounts.
    pub fn redistribute(&mut self, debt: u64, collateral: u64) -> Result<()> {
        if debt == 0 && collateral == 0 {
            return Ok(());
        }
        if self.total_stakes == 0 {
            return Err(Error::Internal {
                message: "redistribution with no remaining stakes".into(),
            });
        }
        let stakes = self.total_stakes as u128;

        let coll_numerator = safe_add_u128(
            (collateral as u128).checked_mul(PRECISION).ok_or_else(|| Error::Overflow {
                operation: format!("{} * PRECISION", collateral),
            })?,
            self.last_coll_error,
        )?;
        let debt_numerator = safe_add_u128(
            (debt as u128).checked_mul(PRECISION).ok_or_else(|| Error::Overflow {
                operation: format!("{} * PRECISION", debt),
            })?,
            self.last_debt_error,
        )?;

        let coll_per_unit = coll_numerator / stakes;
        let debt_per_unit = debt_numerator / stakes;
        self.last_coll_error = coll_numerator - coll_per_unit * stakes;
        self.last_debt_error = debt_numerator - debt_per_unit * stakes;

        self.l_collateral = safe_add_u128(self.l_collateral, coll_per_unit)?;
        self.l_debt = safe_add_u128(self.l_debt, debt_per_unit)?;

        self.default_debt = safe_add(self.default_debt, debt)?;
        self.default_collateral = safe_add(self.default_collateral, collateral)?;

        tracing::debug!(
            debt,
            collateral,
            l_debt = %self.l_debt,
            l_collateral = %self.l_collateral,
            "redistributed liquidation remainder"
        );
        Ok(())
    }

    /// Capture the post-liquidation stake and collateral snapshots that new
    /// stakes are rebased against.
    pub fn update_system_snapshots(&mut self) {
        self.total_stakes_snapshot = self.total_stakes;
        self.total_collateral_snapshot = self.entire_system_collateral();
    }

    fn compute_new_stake(&self, collateral: u64) -> Result<u64> {
        if self.total_collateral_snapshot == 0 {
            Ok(collateral)
        } else {
            safe_mul_div(
                collateral,
                self.total_stakes_snapshot,
                self.total_collateral_snapshot,
            )
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // OBSERVABILITY
    // ═══════════════════════════════════════════════════════════════════════════

    /// Aggregate statistics over active troves
    pub fn statistics(&self, price: u64) -> TroveStatistics {
        let mut ratios: Vec<u128> = Vec::with_capacity(self.trove_owners.len());
        for owner in &self.trove_owners {
            if let Ok(icr) = self.current_icr(owner, price) {
                ratios.push(icr);
            }
        }
        let median_icr = median(&mut ratios).unwrap_or(0);

        let total_debt = self.entire_system_debt();
        let total_collateral = self.entire_system_collateral();
        let tcr = calculate_collateral_ratio(total_collateral, total_debt, price).unwrap_or(0);

        TroveStatistics {
            active_troves: self.trove_owners.len() as u64,
            total_collateral,
            total_debt,
            total_stakes: self.total_stakes,
            median_icr,
            tcr,
        }
    }

    /// Deterministic digest of the registry: active troves hashed in owner
    /// order.
    pub fn state_hash(&self) -> Hash {
        let mut owners: Vec<&PublicKey> = self.trove_owners.iter().collect();
        owners.sort();

        let mut data = Vec::new();
        for owner in owners {
            if let Some(trove) = self.troves.get(owner) {
                data.extend_from_slice(owner.as_bytes());
                data.extend_from_slice(&trove.collateral.to_be_bytes());
                data.extend_from_slice(&trove.debt.to_be_bytes());
                data.extend_from_slice(&trove.stake.to_be_bytes());
            }
        }
        data.extend_from_slice(&self.l_collateral.to_be_bytes());
        data.extend_from_slice(&self.l_debt.to_be_bytes());
        data.extend_from_slice(&self.total_stakes.to_be_bytes());
        Hash::sha256(&data)
    }
}

/// Aggregate trove statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TroveStatistics {
    /// Number of active troves
    pub active_troves: u64,
    /// Entire system collateral in base units
    pub total_collateral: u64,
    /// Entire system debt in debt base units
    pub total_debt: u64,
    /// Sum of active stakes
    pub total_stakes: u64,
    /// Median ICR across active troves at the given price
    pub median_icr: u128,
    /// Total collateralization ratio at the given price
    pub tcr: u128,
}
