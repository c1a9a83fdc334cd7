//! Debt token ledger.
//!
//! Balance and supply bookkeeping for the stablecoin the system issues:
//! - Minting against newly opened debt and burning on repayment
//! - Transfers, including the stability pool's custody account
//! - Supply invariant checking and deterministic state hashing
//!
//! The ledger is pure accounting. Which mints and burns are allowed, and
//! when, is decided by the protocol layer that calls into it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::{Error, Result};
use crate::utils::constants::{DEBT_BASE_UNIT, DEBT_DECIMALS};
use crate::utils::crypto::{Hash, PublicKey};

// ═══════════════════════════════════════════════════════════════════════════════
// DEBT AMOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// Strongly-typed debt token amount (prevents mixing with collateral units)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DebtAmount(u64);

impl DebtAmount {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Create from base units
    pub const fn from_base_units(units: u64) -> Self {
        Self(units)
    }

    /// Create from whole tokens
    pub fn from_whole(tokens: u64) -> Self {
        Self(tokens * DEBT_BASE_UNIT)
    }

    /// Raw base-unit value
    pub fn base_units(&self) -> u64 {
        self.0
    }

    /// Check if zero
    pub fn is_zero(&self) -> bool {
        self.0 == 0
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

impl std::fmt::Display for DebtAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}", self.0 / DEBT_BASE_UNIT, self.0 % DEBT_BASE_UNIT)
    }
}

impl From<u64> for DebtAmount {
    fn from(units: u64) -> Self {
        Self(units)
    }
}

impl From<DebtAmount> for u64 {
    fn from(amount: DebtAmount) -> Self {
        amount.0
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ACCOUNT
// ═══════════════════════════════════════════════════════════════════════════════

/// A balance-holding account on the debt ledger
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Account {
    /// A user keyed by public key
    User(PublicKey),
    /// The stability pool's custody account
    StabilityPool,
}

impl Account {
    /// Canonical byte encoding for hashing
    fn to_hash_bytes(self) -> Vec<u8> {
        match self {
            Account::User(key) => {
                let mut bytes = vec![0x00];
                bytes.extend_from_slice(key.as_bytes());
                bytes
            }
            Account::StabilityPool => vec![0x01],
        }
    }
}

impl std::fmt::Display for Account {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Account::User(key) => write!(f, "user:{}", key.short()),
            Account::StabilityPool => write!(f, "stability-pool"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DEBT TOKEN
// ═══════════════════════════════════════════════════════════════════════════════

/// The debt token ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebtToken {
    /// Token name
    pub name: String,
    /// Token symbol
    pub symbol: String,
    /// Decimal places
    pub decimals: u8,
    /// Total supply in base units
    total_supply: DebtAmount,
    /// Balances by account
    balances: HashMap<Account, DebtAmount>,
}

impl Default for DebtToken {
    fn default() -> Self {
        Self::new()
    }
}

impl DebtToken {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self {
            name: "troveUSD".to_string(),
            symbol: "tUSD".to_string(),
            decimals: DEBT_DECIMALS,
            total_supply: DebtAmount::ZERO,
            balances: HashMap::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SUPPLY MANAGEMENT
    // ═══════════════════════════════════════════════════════════════════════════

    /// Total supply in base units
    pub fn total_supply(&self) -> DebtAmount {
        self.total_supply
    }

    /// Balance of an account
    pub fn balance_of(&self, account: &Account) -> DebtAmount {
        self.balances.get(account).copied().unwrap_or(DebtAmount::ZERO)
    }

    /// Mint new tokens against newly opened debt
    pub fn mint(&mut self, to: Account, amount: DebtAmount) -> Result<()> {
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }

        let new_supply = self.total_supply.checked_add(amount).ok_or(Error::Overflow {
            operation: "mint total supply".into(),
        })?;
        let new_balance = self.balance_of(&to).checked_add(amount).ok_or(Error::Overflow {
            operation: "mint balance".into(),
        })?;

        self.balances.insert(to, new_balance);
        self.total_supply = new_supply;
        Ok(())
    }

    /// Burn tokens on debt repayment, redemption, or pool offset
    pub fn burn(&mut self, from: Account, amount: DebtAmount) -> Result<()> {
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }

        let current = self.balance_of(&from);
        if current < amount {
            return Err(Error::AmountExceedsCallerBalance {
                requested: amount.base_units(),
                available: current.base_units(),
            });
        }

        let new_balance = current.saturating_sub(amount);
        if new_balance.is_zero() {
            self.balances.remove(&from);
        } else {
            self.balances.insert(from, new_balance);
        }
        self.total_supply = self.total_supply.saturating_sub(amount);
        Ok(())
    }

    /// Transfer tokens between accounts
    pub fn transfer(&mut self, from: Account, to: Account, amount: DebtAmount) -> Result<()> {
        if amount.is_zero() {
            return Err(Error::ZeroAmount);
        }
        if from == to {
            return Ok(());
        }

        let from_balance = self.balance_of(&from);
        if from_balance < amount {
            return Err(Error::AmountExceedsCallerBalance {
                requested: amount.base_units(),
                available: from_balance.base_units(),
            });
        }

        let new_from = from_balance.saturating_sub(amount);
        if new_from.is_zero() {
            self.balances.remove(&from);
        } else {
            self.balances.insert(from, new_from);
        }

        let new_to = self.balance_of(&to).checked_add(amount).ok_or(Error::Overflow {
            operation: "transfer balance".into(),
        })?;
        self.balances.insert(to, new_to);
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Number of accounts with a non-zero balance
    pub fn holder_count(&self) -> usize {
        self.balances.len()
    }

    /// Verify the supply invariant: total supply equals the sum of balances
    pub fn verify_supply_invariant(&self) -> Result<()> {
        let sum: u64 = self.balances.values().map(|b| b.base_units()).sum();
        if sum != self.total_supply.base_units() {
            return Err(Error::SupplyInvariantViolated {
                expected: self.total_supply.base_units(),
                actual: sum,
            });
        }
        Ok(())
    }

    /// Deterministic digest of supply and balances
    pub fn state_hash(&self) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(&self.total_supply.base_units().to_be_bytes());

        let mut sorted_balances: Vec<_> = self.balances.iter().collect();
        sorted_balances.sort_by_key(|(account, _)| **account);

        for (account, balance) in sorted_balances {
            data.extend_from_slice(&account.to_hash_bytes());
            data.extend_from_slice(&balance.base_units().to_be_bytes());
        }
        Hash::sha256(&data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::PUBKEY_LENGTH;

    fn test_account() -> Account {
        Account::User(PublicKey::new([0x02; PUBKEY_LENGTH]))
    }

    fn test_account_2() -> Account {
        Account::User(PublicKey::new([0x03; PUBKEY_LENGTH]))
    }

    #[test]
    fn test_debt_amount() {
        let amount = DebtAmount::from_whole(100);
        assert_eq!(amount.base_units(), 10_000);
        assert_eq!(amount.to_string(), "100.00");
        assert_eq!(DebtAmount::from_base_units(6_105).to_string(), "61.05");
    }

    #[test]
    fn test_mint_and_burn() {
        let mut token = DebtToken::new();
        token.mint(test_account(), DebtAmount::from_whole(1_000)).unwrap();
        assert_eq!(token.balance_of(&test_account()), DebtAmount::from_whole(1_000));
        assert_eq!(token.total_supply(), DebtAmount::from_whole(1_000));

        token.burn(test_account(), DebtAmount::from_whole(400)).unwrap();
        assert_eq!(token.balance_of(&test_account()), DebtAmount::from_whole(600));
        assert_eq!(token.total_supply(), DebtAmount::from_whole(600));
    }

    #[test]
    fn test_burn_insufficient_balance() {
        let mut token = DebtToken::new();
        token.mint(test_account(), DebtAmount::from_whole(100)).unwrap();

        let err = token.burn(test_account(), DebtAmount::from_whole(200));
        assert!(matches!(
            err,
            Err(Error::AmountExceedsCallerBalance {
                requested: 20_000,
                available: 10_000
            })
        ));
    }

    #[test]
    fn test_transfer_to_pool_account() {
        let mut token = DebtToken::new();
        token.mint(test_account(), DebtAmount::from_whole(1_000)).unwrap();
        token
            .transfer(test_account(), Account::StabilityPool, DebtAmount::from_whole(300))
            .unwrap();

        assert_eq!(token.balance_of(&test_account()), DebtAmount::from_whole(700));
        assert_eq!(
            token.balance_of(&Account::StabilityPool),
            DebtAmount::from_whole(300)
        );
        assert_eq!(token.total_supply(), DebtAmount::from_whole(1_000));
    }

    #[test]
    fn test_supply_invariant() {
        let mut token = DebtToken::new();
        token.mint(test_account(), DebtAmount::from_whole(1_000)).unwrap();
        token.mint(test_account_2(), DebtAmount::from_whole(500)).unwrap();
        token
            .transfer(test_account(), test_account_2(), DebtAmount::from_whole(200))
            .unwrap();
        token.burn(test_account_2(), DebtAmount::from_whole(100)).unwrap();

        token.verify_supply_invariant().unwrap();
        assert_eq!(token.holder_count(), 2);
    }

    #[test]
    fn test_zero_amount_rejected() {
        let mut token = DebtToken::new();
        assert!(matches!(
            token.mint(test_account(), DebtAmount::ZERO),
            Err(Error::ZeroAmount)
        ));
    }

    #[test]
    fn test_state_hash_deterministic() {
        let mut token1 = DebtToken::new();
        let mut token2 = DebtToken::new();

        // insertion order does not matter
        token1.mint(test_account(), DebtAmount::from_whole(100)).unwrap();
        token1.mint(test_account_2(), DebtAmount::from_whole(200)).unwrap();
        token2.mint(test_account_2(), DebtAmount::from_whole(200)).unwrap();
        token2.mint(test_account(), DebtAmount::from_whole(100)).unwrap();

        assert_eq!(token1.state_hash(), token2.state_hash());
    }
}
