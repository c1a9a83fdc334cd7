//! Protocol facade.
//!
//! [`ProtocolCore`] owns every component and is the single entry point for
//! state changes: borrower operations, stability deposits, liquidations,
//! redemptions, and the price/time inputs that drive them. Each operation
//! validates and plans against one consistent snapshot, applies its
//! mutations, stamps events under a single sequence number, and, when the
//! system ratio can have moved, refreshes the recovery-mode flag.
//!
//! Collateral custody and token balances live in the vault and token
//! ledgers; the engines mutate only the trove registry, the ordered index,
//! the fee state, and the pool. After every engine call the facade mirrors
//! the outcome into custody: redistribution collateral folded in by
//! `apply_pending_rewards` moves from the defaulted to the active bucket,
//! seized collateral moves to the pool, the caller, or the fee collector,
//! and absorbed debt is burned from the pool's token account.
//! [`ProtocolCore::verify_invariants`] cross-checks the mirror.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::core::config::ProtocolParams;
use crate::core::fees::FeeState;
use crate::core::trove::{Trove, TroveManager, TroveStatistics, TroveStatus};
use crate::error::{Error, Result};
use crate::index::sorted::SortedTroves;
use crate::ledger::collateral::{CollateralAmount, CollateralVault};
use crate::ledger::token::{Account, DebtAmount, DebtToken};
use crate::liquidation::engine::{
    LiquidationEngine, LiquidationOutcome, LiquidationStatistics, LiquidationTotals,
};
use crate::liquidation::recovery::{self, RecoveryStatus};
use crate::pool::issuance::IssuanceSchedule;
use crate::pool::stability::{DepositChange, PoolStatistics, StabilityPool};
use crate::protocol::events::{
    CollateralMovedEvent, EventLog, PriceUpdatedEvent, ProtocolEvent, RecoveryModeEvent,
    RedemptionEvent, StabilityDepositEvent, StabilityWithdrawEvent, SurplusClaimedEvent,
    TroveAdjustedEvent, TroveClosedEvent, TroveLiquidatedEvent, TroveOpenedEvent,
};
use crate::redemption::engine::{
    RedemptionEngine, RedemptionHints, RedemptionOutcome, RedemptionStatistics,
};
use crate::utils::crypto::{Hash, PublicKey};
use crate::utils::math::{calculate_collateral_ratio, calculate_nominal_ratio, safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION HINTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Caller-supplied neighbor hints for ordered-index searches, fetched
/// off-path. Wrong hints cost walk steps, never correctness.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct PositionHints {
    /// Expected neighbor on the higher-NICR side
    pub prev: Option<PublicKey>,
    /// Expected neighbor on the lower-NICR side
    pub next: Option<PublicKey>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL CORE
// ═══════════════════════════════════════════════════════════════════════════════

/// The assembled protocol: all component state plus the ambient price,
/// timestamp, and sequence counter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolCore {
    params: ProtocolParams,
    troves: TroveManager,
    index: SortedTroves,
    pool: StabilityPool,
    issuance: IssuanceSchedule,
    token: DebtToken,
    vault: CollateralVault,
    fees: FeeState,
    liquidations: LiquidationEngine,
    redemptions: RedemptionEngine,
    events: EventLog,
    /// Secondary rewards realized by depositors, credited out-of-band
    reward_balances: HashMap<PublicKey, u64>,
    /// Debt base units per whole collateral token; zero until first set
    price: u64,
    timestamp: u64,
    /// Monotonic operation counter; all events of one operation share it
    sequence: u64,
    /// Mirrors the live TCR check; maintained for transition events only
    recovery_mode: bool,
}

impl ProtocolCore {
    // ═══════════════════════════════════════════════════════════════════════════
    // CONSTRUCTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Create a protocol instance from validated parameters
    pub fn new(params: ProtocolParams) -> Result<Self> {
        params.validate()?;
        let index = SortedTroves::new(params.hint_walk_budget);
        let issuance = IssuanceSchedule::new(params.issuance_rate_per_second);
        Ok(Self {
            troves: TroveManager::new(),
            index,
            pool: StabilityPool::new(),
            issuance,
            token: DebtToken::new(),
            vault: CollateralVault::new(),
            fees: FeeState::new(),
            liquidations: LiquidationEngine::new(),
            redemptions: RedemptionEngine::new(),
            events: EventLog::new(),
            reward_balances: HashMap::new(),
            price: 0,
            timestamp: 0,
            sequence: 0,
            recovery_mode: false,
            params,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TIME & PRICE INPUTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Advance the protocol clock. Time never moves backwards.
    pub fn set_timestamp(&mut self, now: u64) -> Result<()> {
        if now < self.timestamp {
            return Err(Error::InvalidParameter {
                name: "timestamp".into(),
                reason: format!("{} is before the current time {}", now, self.timestamp),
            });
        }
        self.timestamp = now;
        Ok(())
    }

    /// Set the collateral price in debt base units per whole collateral
    /// token, re-evaluating recovery mode at the new level.
    pub fn set_price(&mut self, price: u64) -> Result<()> {
        if price == 0 {
            return Err(Error::InvalidParameter {
                name: "price".into(),
                reason: "must be non-zero".into(),
            });
        }
        let previous_price = self.price;
        self.price = price;

        let sequence = self.next_sequence();
        self.events.push(ProtocolEvent::PriceUpdated(PriceUpdatedEvent {
            price,
            previous_price,
            sequence,
            timestamp: self.timestamp,
        }));
        self.refresh_recovery_mode(sequence)?;
        tracing::debug!(price, previous_price, "price updated");
        Ok(())
    }

    fn current_price(&self) -> Result<u64> {
        if self.price == 0 {
            return Err(Error::InvalidParameter {
                name: "price".into(),
                reason: "no collateral price has been set".into(),
            });
        }
        Ok(self.price)
    }

    fn next_sequence(&mut self) -> u64 {
        self.sequence += 1;
        self.sequence
    }

    /// Re-evaluate the recovery-mode flag against the live TCR, emitting a
    /// transition event when it flips. Liquidation and borrower predicates
    /// always recompute the live value; the flag exists for the events.
    fn refresh_recovery_mode(&mut self, sequence: u64) -> Result<()> {
        let tcr = recovery::system_tcr(&self.troves, self.price)?;
        let live = recovery::is_recovery_mode(tcr, &self.params);
        if live == self.recovery_mode {
            return Ok(());
        }
        self.recovery_mode = live;

        let event = RecoveryModeEvent {
            tcr,
            sequence,
            timestamp: self.timestamp,
        };
        if live {
            tracing::warn!(tcr = %tcr, "recovery mode entered");
            self.events.push(ProtocolEvent::RecoveryModeEntered(event));
        } else {
            tracing::info!(tcr = %tcr, "recovery mode exited");
            self.events.push(ProtocolEvent::RecoveryModeExited(event));
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // COLLATERAL FUNDING
    // ═══════════════════════════════════════════════════════════════════════════

    /// Move external collateral into the owner's free vault balance
    pub fn deposit_collateral(&mut self, owner: PublicKey, amount: u64) -> Result<()> {
        self.vault
            .deposit(owner, CollateralAmount::from_base_units(amount))?;

        let sequence = self.next_sequence();
        self.events
            .push(ProtocolEvent::CollateralDeposited(CollateralMovedEvent {
                owner,
                amount: CollateralAmount::from_base_units(amount),
                new_balance: self.vault.balance_of(&owner),
                sequence,
                timestamp: self.timestamp,
            }));
        Ok(())
    }

    /// Move collateral from the owner's free vault balance back out
    pub fn withdraw_collateral(&mut self, owner: &PublicKey, amount: u64) -> Result<()> {
        self.vault
            .withdraw(owner, CollateralAmount::from_base_units(amount))?;

        let sequence = self.next_sequence();
        self.events
            .push(ProtocolEvent::CollateralWithdrawn(CollateralMovedEvent {
                owner: *owner,
                amount: CollateralAmount::from_base_units(amount),
                new_balance: self.vault.balance_of(owner),
                sequence,
                timestamp: self.timestamp,
            }));
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // BORROWER OPERATIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Open a trove: lock collateral from the owner's free balance and mint
    /// the requested debt. The ICR floor is the MCR, or the CCR while the
    /// system is in recovery mode. Returns the opening ICR.
    pub fn open_trove(
        &mut self,
        owner: PublicKey,
        collateral: u64,
        debt: u64,
        hints: &PositionHints,
    ) -> Result<u128> {
        let price = self.current_price()?;
        if collateral == 0 || debt == 0 {
            return Err(Error::ZeroAmount);
        }
        if self.troves.is_active(&owner) {
            return Err(Error::TroveAlreadyActive {
                owner: owner.short(),
            });
        }
        if debt < self.params.min_net_debt {
            return Err(Error::DebtBelowMinimum {
                minimum: self.params.min_net_debt,
                actual: debt,
            });
        }

        let icr = calculate_collateral_ratio(collateral, debt, price)?;
        let tcr = recovery::system_tcr(&self.troves, price)?;
        let required = if recovery::is_recovery_mode(tcr, &self.params) {
            self.params.critical_collateral_ratio
        } else {
            self.params.min_collateral_ratio
        };
        if icr < required {
            return Err(Error::IcrTooLow { icr, required });
        }

        let available = self.vault.balance_of(&owner).base_units();
        if available < collateral {
            return Err(Error::InsufficientCollateral {
                required: collateral,
                available,
            });
        }

        // probe the insert position while nothing has been touched, then
        // insert with the exact neighbors
        let nicr = calculate_nominal_ratio(collateral, debt);
        let (prev, next) = self.index.find_insert_position(nicr, hints.prev, hints.next)?;

        self.vault
            .user_to_active(&owner, CollateralAmount::from_base_units(collateral))?;
        self.troves.open_trove(owner, collateral, debt)?;
        self.token
            .mint(Account::User(owner), DebtAmount::from_base_units(debt))?;
        self.index.insert(owner, nicr, prev, next)?;

        let sequence = self.next_sequence();
        self.events.push(ProtocolEvent::TroveOpened(TroveOpenedEvent {
            owner,
            collateral: CollateralAmount::from_base_units(collateral),
            debt: DebtAmount::from_base_units(debt),
            icr,
            sequence,
            timestamp: self.timestamp,
        }));
        self.refresh_recovery_mode(sequence)?;
        tracing::info!(
            owner = %owner.short(),
            collateral,
            debt,
            icr = %icr,
            "trove opened"
        );
        Ok(icr)
    }

    /// Adjust a trove's collateral and debt by signed deltas, applying
    /// pending redistribution rewards first and re-threading the index. In
    /// recovery mode the ICR floor rises to the CCR and adjustments that
    /// reduce the ratio are rejected. Returns the resulting ICR.
    pub fn adjust_trove(
        &mut self,
        owner: &PublicKey,
        collateral_delta: i64,
        debt_delta: i64,
        hints: &PositionHints,
    ) -> Result<u128> {
        let price = self.current_price()?;
        if collateral_delta == 0 && debt_delta == 0 {
            return Err(Error::ZeroAmount);
        }

        let entire = self.troves.entire_position(owner)?;
        let new_collateral = if collateral_delta >= 0 {
            safe_add(entire.collateral, collateral_delta as u64)?
        } else {
            let withdrawal = collateral_delta.unsigned_abs();
            if withdrawal > entire.collateral {
                return Err(Error::InsufficientCollateral {
                    required: withdrawal,
                    available: entire.collateral,
                });
            }
            entire.collateral - withdrawal
        };
        let new_debt = if debt_delta >= 0 {
            safe_add(entire.debt, debt_delta as u64)?
        } else {
            safe_sub(entire.debt, debt_delta.unsigned_abs())?
        };
        if new_debt < self.params.min_net_debt {
            return Err(Error::DebtBelowMinimum {
                minimum: self.params.min_net_debt,
                actual: new_debt,
            });
        }

        let new_icr = calculate_collateral_ratio(new_collateral, new_debt, price)?;
        let tcr = recovery::system_tcr(&self.troves, price)?;
        let in_recovery = recovery::is_recovery_mode(tcr, &self.params);
        let required = if in_recovery {
            self.params.critical_collateral_ratio
        } else {
            self.params.min_collateral_ratio
        };
        if new_icr < required {
            return Err(Error::IcrTooLow {
                icr: new_icr,
                required,
            });
        }
        if in_recovery {
            let old_icr = self.troves.current_icr(owner, price)?;
            if new_icr < old_icr {
                return Err(Error::ForbiddenInRecoveryMode {
                    operation: "adjustment reducing the collateral ratio".into(),
                });
            }
        }

        if debt_delta < 0 {
            let repayment = debt_delta.unsigned_abs();
            let available = self.token.balance_of(&Account::User(*owner)).base_units();
            if available < repayment {
                return Err(Error::AmountExceedsCallerBalance {
                    requested: repayment,
                    available,
                });
            }
        }
        if collateral_delta > 0 {
            let addition = collateral_delta as u64;
            let available = self.vault.balance_of(owner).base_units();
            if available < addition {
                return Err(Error::InsufficientCollateral {
                    required: addition,
                    available,
                });
            }
        }

        // the re-insert runs first: it restores the index on a stale hint,
        // leaving the whole operation without effect
        let new_nicr = calculate_nominal_ratio(new_collateral, new_debt);
        self.index
            .re_insert(owner, new_nicr, hints.prev, hints.next)?;
        self.vault
            .defaulted_to_active(CollateralAmount::from_base_units(entire.pending_collateral))?;
        self.troves.apply_pending_rewards(owner)?;
        self.troves.set_position(owner, new_collateral, new_debt)?;

        if collateral_delta > 0 {
            self.vault
                .user_to_active(owner, CollateralAmount::from_base_units(collateral_delta as u64))?;
        } else if collateral_delta < 0 {
            self.vault.active_to_user(
                owner,
                CollateralAmount::from_base_units(collateral_delta.unsigned_abs()),
            )?;
        }
        if debt_delta > 0 {
            self.token.mint(
                Account::User(*owner),
                DebtAmount::from_base_units(debt_delta as u64),
            )?;
        } else if debt_delta < 0 {
            self.token.burn(
                Account::User(*owner),
                DebtAmount::from_base_units(debt_delta.unsigned_abs()),
            )?;
        }

        let sequence = self.next_sequence();
        self.events
            .push(ProtocolEvent::TroveAdjusted(TroveAdjustedEvent {
                owner: *owner,
                collateral_delta,
                debt_delta,
                new_collateral: CollateralAmount::from_base_units(new_collateral),
                new_debt: DebtAmount::from_base_units(new_debt),
                new_icr,
                sequence,
                timestamp: self.timestamp,
            }));
        self.refresh_recovery_mode(sequence)?;
        tracing::info!(
            owner = %owner.short(),
            collateral_delta,
            debt_delta,
            new_icr = %new_icr,
            "trove adjusted"
        );
        Ok(new_icr)
    }

    /// Close a trove: burn its entire debt from the owner's balance and
    /// release the collateral to the owner's free balance. Not permitted in
    /// recovery mode. Returns the collateral released.
    pub fn close_trove(&mut self, owner: &PublicKey) -> Result<u64> {
        let price = self.current_price()?;
        let entire = self.troves.entire_position(owner)?;

        let tcr = recovery::system_tcr(&self.troves, price)?;
        if recovery::is_recovery_mode(tcr, &self.params) {
            return Err(Error::ForbiddenInRecoveryMode {
                operation: "close_trove".into(),
            });
        }
        let available = self.token.balance_of(&Account::User(*owner)).base_units();
        if available < entire.debt {
            return Err(Error::AmountExceedsCallerBalance {
                requested: entire.debt,
                available,
            });
        }

        self.vault
            .defaulted_to_active(CollateralAmount::from_base_units(entire.pending_collateral))?;
        self.troves.apply_pending_rewards(owner)?;
        self.token.burn(
            Account::User(*owner),
            DebtAmount::from_base_units(entire.debt),
        )?;
        let (debt_repaid, collateral_returned) =
            self.troves.close_trove(owner, TroveStatus::ClosedByOwner)?;
        self.index.remove(owner)?;
        self.vault.active_to_user(
            owner,
            CollateralAmount::from_base_units(collateral_returned),
        )?;

        let sequence = self.next_sequence();
        self.events.push(ProtocolEvent::TroveClosed(TroveClosedEvent {
            owner: *owner,
            collateral_returned: CollateralAmount::from_base_units(collateral_returned),
            debt_repaid: DebtAmount::from_base_units(debt_repaid),
            sequence,
            timestamp: self.timestamp,
        }));
        self.refresh_recovery_mode(sequence)?;
        tracing::info!(
            owner = %owner.short(),
            collateral_returned,
            debt_repaid,
            "trove closed"
        );
        Ok(collateral_returned)
    }

    /// Pay out the owner's claimable redemption surplus to their free
    /// balance. Returns the amount claimed.
    pub fn claim_surplus(&mut self, owner: &PublicKey) -> Result<u64> {
        let amount = self.vault.claim_surplus(owner)?;

        let sequence = self.next_sequence();
        self.events
            .push(ProtocolEvent::SurplusClaimed(SurplusClaimedEvent {
                owner: *owner,
                amount,
                sequence,
                timestamp: self.timestamp,
            }));
        tracing::info!(owner = %owner.short(), amount = amount.base_units(), "surplus claimed");
        Ok(amount.base_units())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STABILITY POOL
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deposit debt tokens into the stability pool, realizing any pending
    /// collateral and reward gains on the existing deposit first.
    pub fn provide_stability(&mut self, depositor: PublicKey, amount: u64) -> Result<DepositChange> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let available = self.token.balance_of(&Account::User(depositor)).base_units();
        if available < amount {
            return Err(Error::AmountExceedsCallerBalance {
                requested: amount,
                available,
            });
        }

        self.accrue_pool_rewards()?;
        let change = self.pool.provide(depositor, amount)?;
        self.token.transfer(
            Account::User(depositor),
            Account::StabilityPool,
            DebtAmount::from_base_units(amount),
        )?;
        self.settle_depositor_gains(&depositor, &change)?;

        let sequence = self.next_sequence();
        self.events
            .push(ProtocolEvent::StabilityDeposit(StabilityDepositEvent {
                depositor,
                amount: DebtAmount::from_base_units(amount),
                new_deposit: DebtAmount::from_base_units(change.new_deposit),
                collateral_gain: CollateralAmount::from_base_units(change.collateral_gain),
                reward_gain: change.reward_gain,
                sequence,
                timestamp: self.timestamp,
            }));
        Ok(change)
    }

    /// Withdraw up to `amount` from the depositor's compounded deposit,
    /// realizing pending gains. Over-asking clamps to the full balance.
    pub fn withdraw_stability(&mut self, depositor: &PublicKey, amount: u64) -> Result<DepositChange> {
        if self.pool.deposit(depositor).is_none() {
            return Err(Error::NoDeposit);
        }

        self.accrue_pool_rewards()?;
        let change = self.pool.withdraw(depositor, amount)?;
        if change.withdrawn > 0 {
            // floored offset losses can leave the compounded figure a few
            // base units above the pool account; pay out what it holds
            let payable = change
                .withdrawn
                .min(self.token.balance_of(&Account::StabilityPool).base_units());
            if payable > 0 {
                self.token.transfer(
                    Account::StabilityPool,
                    Account::User(*depositor),
                    DebtAmount::from_base_units(payable),
                )?;
            }
        }
        self.settle_depositor_gains(depositor, &change)?;

        let sequence = self.next_sequence();
        self.events
            .push(ProtocolEvent::StabilityWithdraw(StabilityWithdrawEvent {
                depositor: *depositor,
                withdrawn: DebtAmount::from_base_units(change.withdrawn),
                remaining: DebtAmount::from_base_units(change.new_deposit),
                collateral_gain: CollateralAmount::from_base_units(change.collateral_gain),
                reward_gain: change.reward_gain,
                sequence,
                timestamp: self.timestamp,
            }));
        Ok(change)
    }

    /// Issue scheduled rewards up to the protocol clock into the pool. While
    /// the pool is empty the minted amount is dropped, not banked.
    fn accrue_pool_rewards(&mut self) -> Result<()> {
        let minted = self.issuance.issue(self.timestamp)?;
        self.pool.add_reward(minted)
    }

    /// Mirror realized gains: collateral leaves the pool bucket for the
    /// depositor's free balance, secondary rewards are credited out-of-band.
    fn settle_depositor_gains(&mut self, depositor: &PublicKey, change: &DepositChange) -> Result<()> {
        self.vault.stability_to_user(
            depositor,
            CollateralAmount::from_base_units(change.collateral_gain),
        )?;
        if change.reward_gain > 0 {
            let credited = self.reward_balances.entry(*depositor).or_default();
            *credited = credited.saturating_add(change.reward_gain);
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate one undercollateralized trove, settling custody and paying
    /// the caller's gas compensation.
    pub fn liquidate(
        &mut self,
        liquidator: &PublicKey,
        owner: &PublicKey,
    ) -> Result<LiquidationOutcome> {
        let price = self.current_price()?;
        let outcome = self.liquidations.liquidate(
            &mut self.troves,
            &mut self.index,
            &mut self.pool,
            &self.params,
            owner,
            price,
        )?;
        self.settle_liquidation(liquidator, &outcome)?;

        let sequence = self.next_sequence();
        self.push_liquidation_event(liquidator, &outcome, sequence);
        self.refresh_recovery_mode(sequence)?;
        Ok(outcome)
    }

    /// Liquidate up to `max_troves` of the weakest troves (0 = unbounded),
    /// walking from the bottom of the index.
    pub fn liquidate_sequence(
        &mut self,
        liquidator: &PublicKey,
        max_troves: usize,
    ) -> Result<LiquidationTotals> {
        let price = self.current_price()?;
        let totals = self.liquidations.liquidate_sequence(
            &mut self.troves,
            &mut self.index,
            &mut self.pool,
            &self.params,
            price,
            max_troves,
        )?;
        self.settle_liquidation_totals(liquidator, &totals)?;
        Ok(totals)
    }

    /// Liquidate exactly the given troves, skipping entries that are not
    /// liquidatable.
    pub fn liquidate_batch(
        &mut self,
        liquidator: &PublicKey,
        owners: &[PublicKey],
    ) -> Result<LiquidationTotals> {
        let price = self.current_price()?;
        let totals = self.liquidations.liquidate_batch(
            &mut self.troves,
            &mut self.index,
            &mut self.pool,
            &self.params,
            owners,
            price,
        )?;
        self.settle_liquidation_totals(liquidator, &totals)?;
        Ok(totals)
    }

    fn settle_liquidation_totals(
        &mut self,
        liquidator: &PublicKey,
        totals: &LiquidationTotals,
    ) -> Result<()> {
        let sequence = self.next_sequence();
        for outcome in &totals.outcomes {
            self.settle_liquidation(liquidator, outcome)?;
            self.push_liquidation_event(liquidator, outcome, sequence);
        }
        self.refresh_recovery_mode(sequence)
    }

    /// Mirror one liquidation outcome into custody: pending redistribution
    /// collateral re-enters the active bucket before the seized collateral
    /// is split between caller, pool, and the defaulted bucket; absorbed
    /// debt burns from the pool's token account.
    fn settle_liquidation(
        &mut self,
        liquidator: &PublicKey,
        outcome: &LiquidationOutcome,
    ) -> Result<()> {
        self.vault
            .defaulted_to_active(CollateralAmount::from_base_units(outcome.pending_collateral))?;
        self.vault.active_to_user(
            liquidator,
            CollateralAmount::from_base_units(outcome.gas_compensation),
        )?;
        self.vault
            .active_to_stability(CollateralAmount::from_base_units(outcome.collateral_to_sink))?;
        self.vault.active_to_defaulted(CollateralAmount::from_base_units(
            outcome.collateral_redistributed,
        ))?;
        if outcome.debt_absorbed > 0 {
            self.token.burn(
                Account::StabilityPool,
                DebtAmount::from_base_units(outcome.debt_absorbed),
            )?;
        }
        Ok(())
    }

    fn push_liquidation_event(
        &mut self,
        liquidator: &PublicKey,
        outcome: &LiquidationOutcome,
        sequence: u64,
    ) {
        self.events
            .push(ProtocolEvent::TroveLiquidated(TroveLiquidatedEvent {
                owner: outcome.owner,
                liquidator: *liquidator,
                debt_liquidated: DebtAmount::from_base_units(outcome.debt_liquidated),
                collateral_liquidated: CollateralAmount::from_base_units(
                    outcome.collateral_liquidated,
                ),
                debt_absorbed: DebtAmount::from_base_units(outcome.debt_absorbed),
                debt_redistributed: DebtAmount::from_base_units(outcome.debt_redistributed),
                gas_compensation: CollateralAmount::from_base_units(outcome.gas_compensation),
                icr: outcome.icr,
                price: self.price,
                in_recovery_mode: outcome.in_recovery_mode,
                sequence,
                timestamp: self.timestamp,
            }));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REDEMPTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Redeem debt tokens against the weakest troves at face value. The
    /// caller's tokens burn; net collateral lands in their free balance,
    /// the fee in the collector bucket, and fully redeemed troves leave
    /// their excess collateral claimable by their owners.
    pub fn redeem(
        &mut self,
        redeemer: &PublicKey,
        amount: u64,
        max_fee_rate: u128,
        hints: &RedemptionHints,
        max_iterations: usize,
    ) -> Result<RedemptionOutcome> {
        let price = self.current_price()?;
        let balance = self.token.balance_of(&Account::User(*redeemer)).base_units();
        let supply = self.token.total_supply().base_units();
        let outcome = self.redemptions.redeem(
            &mut self.troves,
            &mut self.index,
            &mut self.fees,
            &self.params,
            amount,
            max_fee_rate,
            hints,
            max_iterations,
            balance,
            supply,
            price,
            self.timestamp,
        )?;

        self.token.burn(
            Account::User(*redeemer),
            DebtAmount::from_base_units(outcome.debt_redeemed),
        )?;
        for closed in &outcome.closed {
            self.vault
                .defaulted_to_active(CollateralAmount::from_base_units(closed.pending_collateral))?;
            self.vault
                .credit_surplus(closed.owner, CollateralAmount::from_base_units(closed.surplus))?;
        }
        if let Some(partial) = &outcome.partial {
            self.vault
                .defaulted_to_active(CollateralAmount::from_base_units(partial.pending_collateral))?;
        }
        self.vault.active_to_user(
            redeemer,
            CollateralAmount::from_base_units(outcome.collateral_to_redeemer),
        )?;
        self.vault
            .active_to_fee(CollateralAmount::from_base_units(outcome.fee))?;

        let sequence = self.next_sequence();
        self.events.push(ProtocolEvent::Redemption(RedemptionEvent {
            redeemer: *redeemer,
            debt_redeemed: DebtAmount::from_base_units(outcome.debt_redeemed),
            collateral_drawn: CollateralAmount::from_base_units(outcome.collateral_drawn),
            fee: CollateralAmount::from_base_units(outcome.fee),
            troves_closed: outcome.closed.len() as u32,
            partially_redeemed: outcome.partial.is_some(),
            price,
            sequence,
            timestamp: self.timestamp,
        }));
        self.refresh_recovery_mode(sequence)?;
        Ok(outcome)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Current collateral price; zero until first set
    pub fn price(&self) -> u64 {
        self.price
    }

    /// Current protocol clock
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Sequence number of the last completed operation
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Whether the system is in recovery mode
    pub fn is_recovery_mode(&self) -> bool {
        self.recovery_mode
    }

    /// Operational parameters
    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    /// Total collateralization ratio at the current price
    pub fn tcr(&self) -> Result<u128> {
        recovery::system_tcr(&self.troves, self.price)
    }

    /// A trove's ICR at the current price, pending rewards included
    pub fn current_icr(&self, owner: &PublicKey) -> Result<u128> {
        self.troves.current_icr(owner, self.price)
    }

    /// Recovery posture: TCR, mode flag, and the number of at-risk troves
    pub fn recovery_status(&self) -> Result<RecoveryStatus> {
        recovery::recovery_status(&self.troves, &self.params, self.price)
    }

    /// A trove record, regardless of status
    pub fn trove(&self, owner: &PublicKey) -> Option<&Trove> {
        self.troves.get(owner)
    }

    /// Debt tokens in circulation, base units
    pub fn total_supply(&self) -> u64 {
        self.token.total_supply().base_units()
    }

    /// Active plus redistributed debt, base units
    pub fn entire_system_debt(&self) -> u64 {
        self.troves.entire_system_debt()
    }

    /// Active plus redistributed collateral, base units
    pub fn entire_system_collateral(&self) -> u64 {
        self.troves.entire_system_collateral()
    }

    /// An account's debt-token balance, base units
    pub fn debt_balance_of(&self, owner: &PublicKey) -> u64 {
        self.token.balance_of(&Account::User(*owner)).base_units()
    }

    /// An owner's free collateral balance, base units
    pub fn collateral_balance_of(&self, owner: &PublicKey) -> u64 {
        self.vault.balance_of(owner).base_units()
    }

    /// An owner's claimable redemption surplus, base units
    pub fn surplus_of(&self, owner: &PublicKey) -> u64 {
        self.vault.surplus_of(owner).base_units()
    }

    /// Secondary rewards realized by the depositor so far
    pub fn reward_balance_of(&self, owner: &PublicKey) -> u64 {
        self.reward_balances.get(owner).copied().unwrap_or(0)
    }

    /// A depositor's pool balance after all absorbed liquidations
    pub fn compounded_deposit(&self, depositor: &PublicKey) -> Result<u64> {
        self.pool.compounded_deposit(depositor)
    }

    /// A depositor's unrealized collateral gain
    pub fn collateral_gain(&self, depositor: &PublicKey) -> Result<u64> {
        self.pool.collateral_gain(depositor)
    }

    /// Trove registry, read-only
    pub fn troves(&self) -> &TroveManager {
        &self.troves
    }

    /// Ordered index, read-only; use it to fetch insert hints off-path
    pub fn index(&self) -> &SortedTroves {
        &self.index
    }

    /// Stability pool, read-only
    pub fn pool(&self) -> &StabilityPool {
        &self.pool
    }

    /// Collateral custodian, read-only
    pub fn vault(&self) -> &CollateralVault {
        &self.vault
    }

    /// Debt-token ledger, read-only
    pub fn token(&self) -> &DebtToken {
        &self.token
    }

    /// Redemption fee state, read-only
    pub fn fees(&self) -> &FeeState {
        &self.fees
    }

    /// Event log, read-only
    pub fn events(&self) -> &EventLog {
        &self.events
    }

    /// Take all buffered events, leaving the log empty
    pub fn drain_events(&mut self) -> Vec<ProtocolEvent> {
        self.events.drain()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTEGRITY & SNAPSHOTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Cross-ledger accounting checks: every custody bucket mirrors its
    /// registry counterpart and the token supply equals the system debt.
    pub fn verify_invariants(&self) -> Result<()> {
        self.token.verify_supply_invariant()?;
        self.vault.verify_invariant()?;

        let vault_active = self.vault.active().base_units();
        let ledger_active = self.troves.active_collateral();
        if vault_active != ledger_active {
            return Err(Error::CollateralInvariantViolated {
                expected: ledger_active,
                actual: vault_active,
            });
        }
        let vault_defaulted = self.vault.defaulted().base_units();
        let ledger_defaulted = self.troves.default_collateral();
        if vault_defaulted != ledger_defaulted {
            return Err(Error::CollateralInvariantViolated {
                expected: ledger_defaulted,
                actual: vault_defaulted,
            });
        }
        let vault_pool = self.vault.stability_pool().base_units();
        let pool_collateral = self.pool.collateral_gained();
        if vault_pool != pool_collateral {
            return Err(Error::CollateralInvariantViolated {
                expected: pool_collateral,
                actual: vault_pool,
            });
        }

        let pool_tokens = self.token.balance_of(&Account::StabilityPool).base_units();
        if pool_tokens != self.pool.total_deposits() {
            return Err(Error::SupplyInvariantViolated {
                expected: self.pool.total_deposits(),
                actual: pool_tokens,
            });
        }
        let supply = self.token.total_supply().base_units();
        let system_debt = self.troves.entire_system_debt();
        if supply != system_debt {
            return Err(Error::SupplyInvariantViolated {
                expected: system_debt,
                actual: supply,
            });
        }
        Ok(())
    }

    /// Deterministic digest over all component state
    pub fn state_digest(&self) -> Hash {
        let mut data = Vec::new();
        data.extend_from_slice(self.troves.state_hash().as_bytes());
        data.extend_from_slice(self.pool.state_hash().as_bytes());
        data.extend_from_slice(self.token.state_hash().as_bytes());
        data.extend_from_slice(self.vault.state_hash().as_bytes());
        data.extend_from_slice(&self.sequence.to_be_bytes());
        data.extend_from_slice(&self.price.to_be_bytes());
        data.extend_from_slice(&self.timestamp.to_be_bytes());
        Hash::blake3(&data)
    }

    /// Serialize the full protocol state
    pub fn snapshot(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::SerializationFailed {
            reason: e.to_string(),
        })
    }

    /// Rebuild a protocol instance from a snapshot
    pub fn restore(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::DeserializationFailed {
            reason: e.to_string(),
        })
    }

    /// Aggregate statistics across all components
    pub fn statistics(&self) -> ProtocolStatistics {
        ProtocolStatistics {
            troves: self.troves.statistics(self.price),
            pool: self.pool.statistics(),
            liquidations: self.liquidations.statistics(),
            redemptions: self.redemptions.statistics(),
            total_supply: self.token.total_supply().base_units(),
            base_rate: self.fees.base_rate(),
            recovery_mode: self.recovery_mode,
            price: self.price,
            sequence: self.sequence,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATISTICS
// ═══════════════════════════════════════════════════════════════════════════════

/// Protocol-wide statistics snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolStatistics {
    /// Registry statistics at the current price
    pub troves: TroveStatistics,
    /// Stability pool statistics
    pub pool: PoolStatistics,
    /// Liquidation engine lifetime counters
    pub liquidations: LiquidationStatistics,
    /// Redemption engine lifetime counters
    pub redemptions: RedemptionStatistics,
    /// Debt tokens in circulation, base units
    pub total_supply: u64,
    /// Redemption base rate at PRECISION
    pub base_rate: u128,
    /// Whether the system is in recovery mode
    pub recovery_mode: bool,
    /// Current collateral price
    pub price: u64,
    /// Sequence number of the last operation
    pub sequence: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TESTS
// ═══════════════════════════════════════════════════════════════════════════════
