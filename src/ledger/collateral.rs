//! Collateral custody ledger.
//!
//! Tracks where every collateral base unit sits:
//! - `active`: backing open troves
//! - `defaulted`: redistributed by liquidations, not yet applied to troves
//! - `stability_pool`: received from offsets, owed to depositors
//! - `fee_collector`: redemption fees
//! - per-user free balances and claimable redemption surpluses
//!
//! Every movement is a checked transfer between two of these locations, so
//! the grand total only changes on external deposit or withdrawal and the
//! conservation invariant stays verifiable.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::utils::constants::COLL_BASE_UNIT;
use crate::utils::crypto::{Hash, PublicKey};
use crate::utils::math::calculate_collateral_value;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL AMOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed collateral amount in base units
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CollateralAmount(u64);

impl CollateralAmount {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Create from base units
    pub const fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    /// Create from whole collateral tokens
    pub fn from_whole(tokens: u64) -> Self {
        Self(tokens * COLL_BASE_UNIT)
    }

    /// Raw base-unit value
    pub fn base_units(&self) -> u64 {
        self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Value in debt base units at the given price
    pub fn value_at(&self, price: u64) -> u64 {
        calculate_collateral_value(self.0, price).unwrap_or(0)
    }

    /// Checked addition
    pub fn checked_add(self, other: Self) -> Option<Self> {
        self.0.checked_add(other.0).map(Self)
    }

    /// Checked subtraction
    pub fn checked_sub(self, other: Self) -> Option<Self> {
        self.0.checked_sub(other.0).map(Self)
    }

    /// Saturating subtraction
    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }
}

impl std::fmt::Display for CollateralAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:08}", self.0 / COLL_BASE_UNIT, self.0 % COLL_BASE_UNIT)
    }
}

impl From<u64> for CollateralAmount {
    fn from(units: u64) -> Self {
        Self(units)
    }
}

impl From<CollateralAmount> for u64 {
    fn from(amount: CollateralAmount) -> Self {
        amount.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL VAULT
// ═══════════════════════════════════════════════════════════════════════════════

/// Custody ledger for all collateral known to the system
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CollateralVault {
    /// Collateral backing open troves
    active: CollateralAmount,
    /// Redistributed collateral pending application to troves
    defaulted: CollateralAmount,
    /// Collateral owed to stability depositors
    stability_pool: CollateralAmount,
    /// Accumulated redemption fees
    fee_collector: CollateralAmount,
    /// Free balances users can deposit from and withdraw to
    user_balances: HashMap<PublicKey, CollateralAmount>,
    /// Claimable surpluses from redemption-closed troves
    surplus: HashMap<PublicKey, CollateralAmount>,
    /// Grand total across every location
    total: CollateralAmount,
}

impl CollateralVault {
    /// Create an empty vault
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Collateral backing open troves
    pub fn active(&self) -> CollateralAmount {
        self.active
    }

    /// Redistributed collateral pending application
    pub fn defaulted(&self) -> CollateralAmount {
        self.defaulted
    }

    /// Collateral owed to stability depositors
    pub fn stability_pool(&self) -> CollateralAmount {
        self.stability_pool
    }

    /// Accumulated redemption fees
    pub fn fee_collector(&self) -> CollateralAmount {
        self.fee_collector
    }

    /// A user's free balance
    pub fn balance_of(&self, owner: &PublicKey) -> CollateralAmount {
        self.user_balances.get(owner).copied().unwrap_or(CollateralAmount::ZERO)
    }

    /// A user's claimable redemption surplus
    pub fn surplus_of(&self, owner: &PublicKey) -> CollateralAmount {
        self.surplus.get(owner).copied().unwrap_or(CollateralAmount::ZERO)
    }

    /// Grand total across every location
    pub fn total(&self) -> CollateralAmount {
        self.total
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // EXTERNAL MOVEMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Bring external collateral into a user's free balance
    pub fn deposit(&mut self, owner: PublicKey, amount: CollateralAmount) -> Result<()> {
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }
        let balance = self.balance_of(&owner);
        let new_balance = balance.checked_add(amount).ok_or(Error::Overflow {
            operation: "deposit balance".into(),
        })?;
        self.total = self.total.checked_add(amount).ok_or(Error::Overflow {
            operation: "total collateral".into(),
        })?;
        self.user_balances.insert(owner, new_balance);
        Ok(())
    }

    /// Send collateral from a user's free balance out of the system
    pub fn withdraw(&mut self, owner: &PublicKey, amount: CollateralAmount) -> Result<()> {
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }
        let balance = self.balance_of(owner);
        if balance < amount {
            return Err(Error::InsufficientCollateral {
                required: amount.base_units(),
                available: balance.base_units(),
            });
        }
        let new_balance = balance.saturating_sub(amount);
        if new_balance.is_zero() {
            self.user_balances.remove(owner);
        } else {
            self.user_balances.insert(*owner, new_balance);
        }
        self.total = self.total.saturating_sub(amount);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL MOVEMENTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Lock a user's free collateral behind a trove
    pub fn user_to_active(&mut self, owner: &PublicKey, amount: CollateralAmount) -> Result<()> {
        let balance = self.balance_of(owner);
        if balance < amount {
            return Err(Error::InsufficientCollateral {
                required: amount.base_units(),
                available: balance.base_units(),
            });
        }
        let new_balance = balance.saturating_sub(amount);
        if new_balance.is_zero() {
            self.user_balances.remove(owner);
        } else {
            self.user_balances.insert(*owner, new_balance);
        }
        self.active = self.active.checked_add(amount).ok_or(Error::Overflow {
            operation: "active collateral".into(),
        })?;
        Ok(())
    }

    /// Release trove collateral back into a user's free balance
    pub fn active_to_user(&mut self, owner: &PublicKey, amount: CollateralAmount) -> Result<()> {
        self.take_active(amount)?;
        self.credit_user(*owner, amount)
    }

    /// Move a liquidation's offset collateral to the stability pool
    pub fn active_to_stability(&mut self, amount: CollateralAmount) -> Result<()> {
        self.take_active(amount)?;
        self.stability_pool = self.stability_pool.checked_add(amount).ok_or(Error::Overflow {
            operation: "stability pool collateral".into(),
        })?;
        Ok(())
    }

    /// Move a liquidation's redistributed collateral to the pending bucket
    pub fn active_to_defaulted(&mut self, amount: CollateralAmount) -> Result<()> {
        self.take_active(amount)?;
        self.defaulted = self.defaulted.checked_add(amount).ok_or(Error::Overflow {
            operation: "defaulted collateral".into(),
        })?;
        Ok(())
    }

    /// Apply pending redistribution collateral back to the active bucket
    pub fn defaulted_to_active(&mut self, amount: CollateralAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        if self.defaulted < amount {
            return Err(Error::InsufficientCollateral {
                required: amount.base_units(),
                available: self.defaulted.base_units(),
            });
        }
        self.defaulted = self.defaulted.saturating_sub(amount);
        self.active = self.active.checked_add(amount).ok_or(Error::Overflow {
            operation: "active collateral".into(),
        })?;
        Ok(())
    }

    /// Pay a stability depositor's collateral gain into their free balance
    pub fn stability_to_user(&mut self, owner: &PublicKey, amount: CollateralAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        if self.stability_pool < amount {
            return Err(Error::InsufficientCollateral {
                required: amount.base_units(),
                available: self.stability_pool.base_units(),
            });
        }
        self.stability_pool = self.stability_pool.saturating_sub(amount);
        self.credit_user(*owner, amount)
    }

    /// Move a redemption fee from active collateral to the fee collector
    pub fn active_to_fee(&mut self, amount: CollateralAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        self.take_active(amount)?;
        self.fee_collector = self.fee_collector.checked_add(amount).ok_or(Error::Overflow {
            operation: "fee collector collateral".into(),
        })?;
        Ok(())
    }

    /// Park a redemption-closed trove's leftover collateral as claimable
    /// surplus for its owner
    pub fn credit_surplus(&mut self, owner: PublicKey, amount: CollateralAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        self.take_active(amount)?;
        let current = self.surplus_of(&owner);
        let new_surplus = current.checked_add(amount).ok_or(Error::Overflow {
            operation: "surplus balance".into(),
        })?;
        self.surplus.insert(owner, new_surplus);
        Ok(())
    }

    /// Claim the caller's full surplus into their free balance
    pub fn claim_surplus(&mut self, owner: &PublicKey) -> Result<CollateralAmount> {
        let amount = self.surplus.remove(owner).unwrap_or(CollateralAmount::ZERO);
        if amount.is_zero() {
            return Err(Error::NoSurplusToClaim);
        }
        self.credit_user(*owner, amount)?;
        Ok(amount)
    }

    fn take_active(&mut self, amount: CollateralAmount) -> Result<()> {
        if self.active < amount {
            return Err(Error::InsufficientCollateral {
                required: amount.base_units(),
                available: self.active.base_units(),
            });
        }
        self.active = self.active.saturating_sub(amount);
        Ok(())
    }

    fn credit_user(&mut self, owner: PublicKey, amount: CollateralAmount) -> Result<()> {
        if amount.is_zero() {
            return Ok(());
        }
        let balance = self.balance_of(&owner);
        let new_balance = balance.checked_add(amount).ok_or(Error::Overflow {
            operation: "user balance".into(),
        })?;
        self.user_balances.insert(owner, new_balance);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INVARIANTS & HASHING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Verify conservation: every location sums back to the grand total
    pub fn verify_invariant(&self) -> Result<()> {
        let users: u64 = self.user_balances.values().map(|c| c.base_units()).sum();
        let surpluses: u64 = self.surplus.values().map(|c| c.base_units()).sum();
        let sum = self
            .active
            .base_units()
            .saturating_add(self.defaulted.base_units())
            .saturating_add(self.stability_pool.base_units())
            .saturating_add(self.fee_collector.base_units())
            .saturating_add(users)
            .saturating_add(surpluses);

        if sum != self.total.base_units() {
            return Err(Error::CollateralInvariantViolated {
                expected: self.total.base_units(),
                actual: sum,
            });
        }
        Ok(())
    }

    /// Deterministic digest of the custody state
    pub fn state_hash(&self) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(&self.total.base_units().to_be_bytes());
        data.extend_from_slice(&self.active.base_units().to_be_bytes());
        data.extend_from_slice(&self.defaulted.base_units().to_be_bytes());
        data.extend_from_slice(&self.stability_pool.base_units().to_be_bytes());
        data.extend_from_slice(&self.fee_collector.base_units().to_be_bytes());

        let mut sorted_users: Vec<_> = self.user_balances.iter().collect();
        sorted_users.sort_by_key(|(k, _)| k.as_bytes());
        for (owner, amount) in sorted_users {
            data.extend_from_slice(owner.as_bytes());
            data.extend_from_slice(&amount.base_units().to_be_bytes());
        }

        let mut sorted_surplus: Vec<_> = self.surplus.iter().collect();
        sorted_surplus.sort_by_key(|(k, _)| k.as_bytes());
        for (owner, amount) in sorted_surplus {
            data.extend_from_slice(owner.as_bytes());
            data.extend_from_slice(&amount.base_units().to_be_bytes());
        }
        Hash::sha256(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::PUBKEY_LENGTH;

    fn test_pubkey() -> PublicKey {
        PublicKey::new([0x02; PUBKEY_LENGTH])
    }

    fn test_pubkey_2() -> PublicKey {
        PublicKey::new([0x03; PUBKEY_LENGTH])
    }

    #[test]
    fn test_collateral_amount() {
        let amount = CollateralAmount::from_whole(1);
        assert_eq!(amount.base_units(), COLL_BASE_UNIT);
        assert_eq!(amount.to_string(), "1.00000000");

        // 1 token at $40,000.00 per whole token
        assert_eq!(amount.value_at(4_000_000), 4_000_000);
    }

    #[test]
    fn test_default_is_zero() {
        assert_eq!(CollateralAmount::default(), CollateralAmount::ZERO);

        let vault = CollateralVault::default();
        assert!(vault.total().is_zero());
        vault.verify_invariant().unwrap();
    }

    #[test]
    fn test_deposit_and_lock() {
        let mut vault = CollateralVault::new();
        vault.deposit(test_pubkey(), CollateralAmount::from_whole(2)).unwrap();
        vault.user_to_active(&test_pubkey(), CollateralAmount::from_whole(1)).unwrap();

        assert_eq!(vault.balance_of(&test_pubkey()), CollateralAmount::from_whole(1));
        assert_eq!(vault.active(), CollateralAmount::from_whole(1));
        assert_eq!(vault.total(), CollateralAmount::from_whole(2));
        vault.verify_invariant().unwrap();
    }

    #[test]
    fn test_lock_insufficient_balance() {
        let mut vault = CollateralVault::new();
        vault.deposit(test_pubkey(), CollateralAmount::from_whole(1)).unwrap();

        let err = vault.user_to_active(&test_pubkey(), CollateralAmount::from_whole(2));
        assert!(matches!(err, Err(Error::InsufficientCollateral { .. })));
    }

    #[test]
    fn test_liquidation_flow_conserves() {
        let mut vault = CollateralVault::new();
        vault.deposit(test_pubkey(), CollateralAmount::from_whole(3)).unwrap();
        vault.user_to_active(&test_pubkey(), CollateralAmount::from_whole(3)).unwrap();

        // offset part to the pool, redistribute part, pay gas comp
        vault.active_to_stability(CollateralAmount::from_whole(1)).unwrap();
        vault.active_to_defaulted(CollateralAmount::from_whole(1)).unwrap();
        vault.active_to_user(&test_pubkey_2(), CollateralAmount::from_base_units(1_500_000)).unwrap();

        vault.verify_invariant().unwrap();
        assert_eq!(vault.stability_pool(), CollateralAmount::from_whole(1));
        assert_eq!(vault.defaulted(), CollateralAmount::from_whole(1));

        // pending rewards flow back to active on application
        vault.defaulted_to_active(CollateralAmount::from_whole(1)).unwrap();
        assert_eq!(vault.defaulted(), CollateralAmount::ZERO);
        vault.verify_invariant().unwrap();
    }

    #[test]
    fn test_surplus_claim() {
        let mut vault = CollateralVault::new();
        vault.deposit(test_pubkey(), CollateralAmount::from_whole(2)).unwrap();
        vault.user_to_active(&test_pubkey(), CollateralAmount::from_whole(2)).unwrap();

        vault.credit_surplus(test_pubkey(), CollateralAmount::from_whole(1)).unwrap();
        assert_eq!(vault.surplus_of(&test_pubkey()), CollateralAmount::from_whole(1));

        let claimed = vault.claim_surplus(&test_pubkey()).unwrap();
        assert_eq!(claimed, CollateralAmount::from_whole(1));
        assert_eq!(vault.balance_of(&test_pubkey()), CollateralAmount::from_whole(1));
        assert_eq!(vault.surplus_of(&test_pubkey()), CollateralAmount::ZERO);

        let err = vault.claim_surplus(&test_pubkey());
        assert!(matches!(err, Err(Error::NoSurplusToClaim)));
        vault.verify_invariant().unwrap();
    }

    #[test]
    fn test_stability_payout() {
        let mut vault = CollateralVault::new();
        vault.deposit(test_pubkey(), CollateralAmount::from_whole(1)).unwrap();
        vault.user_to_active(&test_pubkey(), CollateralAmount::from_whole(1)).unwrap();
        vault.active_to_stability(CollateralAmount::from_whole(1)).unwrap();

        vault.stability_to_user(&test_pubkey_2(), CollateralAmount::from_whole(1)).unwrap();
        assert_eq!(vault.balance_of(&test_pubkey_2()), CollateralAmount::from_whole(1));
        assert_eq!(vault.stability_pool(), CollateralAmount::ZERO);
        vault.verify_invariant().unwrap();
    }

    #[test]
    fn test_fee_accrual() {
        let mut vault = CollateralVault::new();
        vault.deposit(test_pubkey(), CollateralAmount::from_whole(1)).unwrap();
        vault.user_to_active(&test_pubkey(), CollateralAmount::from_whole(1)).unwrap();

        vault.active_to_fee(CollateralAmount::from_base_units(500_000)).unwrap();
        assert_eq!(vault.fee_collector(), CollateralAmount::from_base_units(500_000));
        vault.verify_invariant().unwrap();
    }

    #[test]
    fn test_withdraw_round_trip() {
        let mut vault = CollateralVault::new();
        vault.deposit(test_pubkey(), CollateralAmount::from_whole(2)).unwrap();
        vault.withdraw(&test_pubkey(), CollateralAmount::from_whole(2)).unwrap();

        assert_eq!(vault.balance_of(&test_pubkey()), CollateralAmount::ZERO);
        assert_eq!(vault.total(), CollateralAmount::ZERO);
        vault.verify_invariant().unwrap();
    }

    #[test]
    fn test_state_hash_deterministic() {
        let mut vault1 = CollateralVault::new();
        let mut vault2 = CollateralVault::new();

        vault1.deposit(test_pubkey(), CollateralAmount::from_whole(1)).unwrap();
        vault1.deposit(test_pubkey_2(), CollateralAmount::from_whole(2)).unwrap();
        vault2.deposit(test_pubkey_2(), CollateralAmount::from_whole(2)).unwrap();
        vault2.deposit(test_pubkey(), CollateralAmount::from_whole(1)).unwrap();

        assert_eq!(vault1.state_hash(), vault2.state_hash());
    }
}
