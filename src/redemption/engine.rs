//! Redemption engine.
//!
//! Redemption exchanges debt tokens for collateral at face value, walking the
//! ordered index from its weakest end:
//! - troves below the minimum ratio are passed over; they belong to the
//!   liquidation path
//! - every redeemed trove but the last is fully drained and closed, leftover
//!   collateral going to a claimable surplus for its owner
//! - the final trove may be partially redeemed, re-threaded at its new sort
//!   key using caller-supplied hints; a stale hint drops the partial step
//!   instead of failing the call
//!
//! The walk runs read-only into a plan first. Fees and all error conditions
//! are resolved against the plan, then the plan is applied, so a rejected
//! redemption leaves every component untouched.

use serde::{Deserialize, Serialize};

use crate::core::config::ProtocolParams;
use crate::core::fees::FeeState;
use crate::core::trove::{TroveManager, TroveStatus};
use crate::error::{Error, Result};
use crate::index::sorted::SortedTroves;
use crate::liquidation::recovery;
use crate::utils::crypto::PublicKey;
use crate::utils::math::{calculate_collateral_for_debt, calculate_nominal_ratio, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// HINTS AND OUTCOMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Caller-supplied positioning for a redemption, fetched off-path
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedemptionHints {
    /// Expected first trove to redeem against: the weakest one at or above
    /// the minimum ratio
    pub first: Option<PublicKey>,
    /// Neighbors for re-threading the partially redeemed trove
    pub partial_prev: Option<PublicKey>,
    pub partial_next: Option<PublicKey>,
    /// Expected sort key of the partially redeemed trove after the partial
    /// step; a mismatch against the live value drops the partial step
    pub partial_nicr: u128,
}

/// A trove fully drained and closed by a redemption
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedeemedTrove {
    pub owner: PublicKey,
    /// Debt cancelled against the trove
    pub debt_cancelled: u64,
    /// Collateral drawn at the redemption price
    pub collateral_drawn: u64,
    /// Leftover collateral credited to the owner as claimable surplus
    pub surplus: u64,
    /// Redistribution collateral folded in when pending rewards were applied
    pub pending_collateral: u64,
}

/// The final trove of a redemption, partially redeemed and re-threaded
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialRedemption {
    pub owner: PublicKey,
    pub debt_cancelled: u64,
    pub collateral_drawn: u64,
    pub new_debt: u64,
    pub new_collateral: u64,
    /// Redistribution collateral folded in when pending rewards were applied
    pub pending_collateral: u64,
}

/// Result of a redemption call
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionOutcome {
    /// Debt cancelled in total; burned from the redeemer by the caller
    pub debt_redeemed: u64,
    /// Collateral drawn at face value for the cancelled debt
    pub collateral_drawn: u64,
    /// Fee on the drawn collateral, kept by the protocol
    pub fee: u64,
    /// Collateral owed to the redeemer after the fee
    pub collateral_to_redeemer: u64,
    /// Fee rate applied, at PRECISION
    pub rate: u128,
    /// Troves closed by this redemption, weakest first
    pub closed: Vec<RedeemedTrove>,
    /// Partial final step, if one was applied
    pub partial: Option<PartialRedemption>,
}

// planned partial step, pending the stale-hint check at apply time
struct PlannedPartial {
    owner: PublicKey,
    debt_cancelled: u64,
    collateral_drawn: u64,
    new_debt: u64,
    new_collateral: u64,
    new_nicr: u128,
    pending_collateral: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// REDEMPTION ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine for redeeming debt tokens against the weakest troves
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RedemptionEngine {
    /// Redemptions performed over the engine's lifetime
    total_redemptions: u64,
    /// Debt cancelled across all redemptions
    total_debt_redeemed: u64,
    /// Collateral drawn across all redemptions
    total_collateral_drawn: u64,
    /// Fees collected across all redemptions
    total_fees_paid: u64,
}

impl RedemptionEngine {
    /// Create a new redemption engine
    pub fn new() -> Self {
        Self::default()
    }

    /// Redeem `amount` of debt tokens for collateral at the current price.
    ///
    /// `max_iterations` bounds the troves visited; zero means no limit. The
    /// caller settles custody afterwards from the returned outcome: burning
    /// the redeemed debt, paying the redeemer, crediting surpluses and the
    /// fee.
    #[allow(clippy::too_many_arguments)]
    pub fn redeem(
        &mut self,
        troves: &mut TroveManager,
        index: &mut SortedTroves,
        fees: &mut FeeState,
        params: &ProtocolParams,
        amount: u64,
        max_fee_rate: u128,
        hints: &RedemptionHints,
        max_iterations: usize,
        redeemer_balance: u64,
        total_supply: u64,
        price: u64,
        now: u64,
    ) -> Result<RedemptionOutcome> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        let tcr = recovery::system_tcr(troves, price)?;
        if tcr < params.min_collateral_ratio {
            return Err(Error::TcrBelowMcr {
                tcr,
                mcr: params.min_collateral_ratio,
            });
        }
        if redeemer_balance < amount {
            return Err(Error::AmountExceedsCallerBalance {
                requested: amount,
                available: redeemer_balance,
            });
        }

        // ─── plan: walk the index read-only ───────────────────────────────

        let mut closes: Vec<RedeemedTrove> = Vec::new();
        let mut partial: Option<PlannedPartial> = None;
        let mut remaining = amount;
        let mut visited = 0usize;
        let mut cursor = self.starting_trove(troves, index, hints, params, price)?;

        while let Some(owner) = cursor {
            if remaining == 0 {
                break;
            }
            if max_iterations != 0 && visited >= max_iterations {
                break;
            }
            visited += 1;
            let above = index.prev(&owner);

            // liquidation candidates are not redemption candidates
            if troves.current_icr(&owner, price)? < params.min_collateral_ratio {
                cursor = above;
                continue;
            }

            let entire = troves.entire_position(&owner)?;
            if remaining >= entire.debt {
                let drawn = calculate_collateral_for_debt(entire.debt, price)?;
                let surplus = safe_sub(entire.collateral, drawn)?;
                closes.push(RedeemedTrove {
                    owner,
                    debt_cancelled: entire.debt,
                    collateral_drawn: drawn,
                    surplus,
                    pending_collateral: entire.pending_collateral,
                });
                remaining -= entire.debt;
            } else {
                let new_debt = entire.debt - remaining;
                if new_debt < params.min_net_debt {
                    // a partial here would leave a sub-minimum trove
                    cursor = above;
                    continue;
                }
                let drawn = calculate_collateral_for_debt(remaining, price)?;
                let new_collateral = safe_sub(entire.collateral, drawn)?;
                let new_nicr = calculate_nominal_ratio(new_collateral, new_debt);
                if new_nicr != hints.partial_nicr {
                    // stale hint: stop one trove early instead of failing
                    tracing::debug!(
                        owner = %owner.short(),
                        expected = %hints.partial_nicr,
                        actual = %new_nicr,
                        "partial redemption hint is stale, stopping early"
                    );
                    break;
                }
                partial = Some(PlannedPartial {
                    owner,
                    debt_cancelled: remaining,
                    collateral_drawn: drawn,
                    new_debt,
                    new_collateral,
                    new_nicr,
                    pending_collateral: entire.pending_collateral,
                });
                break;
            }
            cursor = above;
        }

        // ─── resolve fees and errors against the plan ─────────────────────

        let planned_debt: u64 = closes.iter().map(|c| c.debt_cancelled).sum::<u64>()
            + partial.as_ref().map(|p| p.debt_cancelled).unwrap_or(0);
        let planned_drawn: u64 = closes.iter().map(|c| c.collateral_drawn).sum::<u64>()
            + partial.as_ref().map(|p| p.collateral_drawn).unwrap_or(0);
        if planned_debt == 0 {
            return Err(Error::UnableToRedeem);
        }

        let preview = fees.preview_redemption_rate(now, planned_debt, total_supply)?;
        if preview.rate > max_fee_rate {
            return Err(Error::FeeExceedsMax {
                rate: preview.rate,
                max: max_fee_rate,
            });
        }
        if FeeState::redemption_fee(preview.rate, planned_drawn)? >= planned_drawn {
            return Err(Error::FeeEatsAllCollateral);
        }

        // ─── apply ────────────────────────────────────────────────────────

        for close in &closes {
            troves.apply_pending_rewards(&close.owner)?;
            troves.close_trove(&close.owner, TroveStatus::ClosedByRedemption)?;
            index.remove(&close.owner)?;
        }

        let mut applied_partial: Option<PartialRedemption> = None;
        if let Some(plan) = partial {
            match index.re_insert(
                &plan.owner,
                plan.new_nicr,
                hints.partial_prev,
                hints.partial_next,
            ) {
                Ok(()) => {
                    troves.apply_pending_rewards(&plan.owner)?;
                    troves.set_position(&plan.owner, plan.new_collateral, plan.new_debt)?;
                    applied_partial = Some(PartialRedemption {
                        owner: plan.owner,
                        debt_cancelled: plan.debt_cancelled,
                        collateral_drawn: plan.collateral_drawn,
                        new_debt: plan.new_debt,
                        new_collateral: plan.new_collateral,
                        pending_collateral: plan.pending_collateral,
                    });
                }
                Err(Error::HintsTooStale { .. }) => {
                    // the index restored itself and the trove was never touched
                    tracing::debug!(
                        owner = %plan.owner.short(),
                        "partial re-thread exceeded the walk budget, dropping the partial step"
                    );
                }
                Err(e) => return Err(e),
            }
        }

        let debt_redeemed: u64 = closes.iter().map(|c| c.debt_cancelled).sum::<u64>()
            + applied_partial.as_ref().map(|p| p.debt_cancelled).unwrap_or(0);
        let collateral_drawn: u64 = closes.iter().map(|c| c.collateral_drawn).sum::<u64>()
            + applied_partial
                .as_ref()
                .map(|p| p.collateral_drawn)
                .unwrap_or(0);
        if debt_redeemed == 0 {
            // only-partial plan whose re-thread was dropped; nothing moved
            return Err(Error::UnableToRedeem);
        }

        let preview = fees.preview_redemption_rate(now, debt_redeemed, total_supply)?;
        let fee = FeeState::redemption_fee(preview.rate, collateral_drawn)?;
        let collateral_to_redeemer = collateral_drawn - fee;
        fees.commit_redemption(now, preview, fee);

        self.total_redemptions += 1;
        self.total_debt_redeemed = self.total_debt_redeemed.saturating_add(debt_redeemed);
        self.total_collateral_drawn = self
            .total_collateral_drawn
            .saturating_add(collateral_drawn);
        self.total_fees_paid = self.total_fees_paid.saturating_add(fee);

        tracing::info!(
            debt_redeemed,
            collateral_drawn,
            fee,
            troves_closed = closes.len(),
            partially_redeemed = applied_partial.is_some(),
            rate = %preview.rate,
            "redemption complete"
        );

        Ok(RedemptionOutcome {
            debt_redeemed,
            collateral_drawn,
            fee,
            collateral_to_redeemer,
            rate: preview.rate,
            closed: closes,
            partial: applied_partial,
        })
    }

    /// Locate the weakest trove at or above the minimum ratio: through the
    /// caller's hint when it checks out, by walking up from the tail when it
    /// does not.
    fn starting_trove(
        &self,
        troves: &TroveManager,
        index: &SortedTroves,
        hints: &RedemptionHints,
        params: &ProtocolParams,
        price: u64,
    ) -> Result<Option<PublicKey>> {
        if let Some(first) = hints.first {
            if index.contains(&first)
                && troves.current_icr(&first, price)? >= params.min_collateral_ratio
            {
                match index.next(&first) {
                    None => return Ok(Some(first)),
                    Some(below) => {
                        if troves.current_icr(&below, price)? < params.min_collateral_ratio {
                            return Ok(Some(first));
                        }
                    }
                }
            }
        }

        let mut cursor = index.last();
        while let Some(owner) = cursor {
            if troves.current_icr(&owner, price)? >= params.min_collateral_ratio {
                break;
            }
            cursor = index.prev(&owner);
        }
        Ok(cursor)
    }

    /// Get statistics
    pub fn statistics(&self) -> RedemptionStatistics {
        RedemptionStatistics {
            total_redemptions: self.total_redemptions,
            total_debt_redeemed: self.total_debt_redeemed,
            total_collateral_drawn: self.total_collateral_drawn,
            total_fees_paid: self.total_fees_paid,
        }
    }
}

/// Redemption statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedemptionStatistics {
    pub total_redemptions: u64,
    pub total_debt_redeemed: u64,
    pub total_collateral_drawn: u64,
    pub total_fees_paid: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::{
        COLL_BASE_UNIT, PRECISION, PUBKEY_LENGTH, REDEMPTION_FEE_CEILING,
    };

    fn pk(byte: u8) -> PublicKey {
        PublicKey::new([byte; PUBKEY_LENGTH])
    }

    fn open(troves: &mut TroveManager, index: &mut SortedTroves, byte: u8, coll: u64, debt: u64) {
        let owner = pk(byte);
        troves.open_trove(owner, coll, debt).unwrap();
        index
            .insert(owner, calculate_nominal_ratio(coll, debt), None, None)
            .unwrap();
    }

    // three troves at 400.00: ICRs 200%, 400%, 2000%
    fn standard_setup() -> (TroveManager, SortedTroves) {
        let mut troves = TroveManager::new();
        let mut index = SortedTroves::default();
        open(&mut troves, &mut index, 0x02, COLL_BASE_UNIT, 20_000);
        open(&mut troves, &mut index, 0x03, 2 * COLL_BASE_UNIT, 20_000);
        open(&mut troves, &mut index, 0x04, 10 * COLL_BASE_UNIT, 20_000);
        (troves, index)
    }

    #[test]
    fn test_full_close_with_surplus() {
        let mut engine = RedemptionEngine::new();
        let (mut troves, mut index) = standard_setup();
        let mut fees = FeeState::new();
        let params = ProtocolParams::default();

        let outcome = engine
            .redeem(
                &mut troves,
                &mut index,
                &mut fees,
                &params,
                20_000,
                REDEMPTION_FEE_CEILING,
                &RedemptionHints::default(),
                0,
                30_000,
                60_000,
                40_000,
                0,
            )
            .unwrap();

        // the weakest trove is drained exactly; 50.00 worth of collateral
        // at 400.00 is half a token, the rest is surplus
        assert_eq!(outcome.debt_redeemed, 20_000);
        assert_eq!(outcome.collateral_drawn, 50_000_000);
        assert_eq!(outcome.closed.len(), 1);
        assert_eq!(outcome.closed[0].owner, pk(0x02));
        assert_eq!(outcome.closed[0].surplus, 50_000_000);
        assert!(outcome.partial.is_none());

        // a third of supply redeemed pushes the rate to the ceiling
        assert_eq!(outcome.rate, REDEMPTION_FEE_CEILING);
        assert_eq!(outcome.fee, 2_500_000);
        assert_eq!(outcome.collateral_to_redeemer, 47_500_000);

        assert_eq!(troves.status(&pk(0x02)), TroveStatus::ClosedByRedemption);
        assert!(!index.contains(&pk(0x02)));
        assert_eq!(fees.base_rate(), 166_666_666_666_666_666);
    }

    #[test]
    fn test_walk_closes_then_partially_redeems() {
        let mut engine = RedemptionEngine::new();
        let (mut troves, mut index) = standard_setup();
        let mut fees = FeeState::new();
        let params = ProtocolParams::default();

        // 250.00 redeemed: close the weakest, take 50.00 from the second
        let hints = RedemptionHints {
            partial_nicr: calculate_nominal_ratio(187_500_000, 15_000),
            ..Default::default()
        };
        let outcome = engine
            .redeem(
                &mut troves,
                &mut index,
                &mut fees,
                &params,
                25_000,
                REDEMPTION_FEE_CEILING,
                &hints,
                0,
                30_000,
                60_000,
                40_000,
                0,
            )
            .unwrap();

        assert_eq!(outcome.debt_redeemed, 25_000);
        assert_eq!(outcome.collateral_drawn, 62_500_000);
        assert_eq!(outcome.closed.len(), 1);
        let partial = outcome.partial.unwrap();
        assert_eq!(partial.owner, pk(0x03));
        assert_eq!(partial.new_debt, 15_000);
        assert_eq!(partial.new_collateral, 187_500_000);

        let reduced = troves.entire_position(&pk(0x03)).unwrap();
        assert_eq!(reduced.debt, 15_000);
        assert_eq!(reduced.collateral, 187_500_000);
        assert_eq!(
            index.nicr_of(&pk(0x03)),
            Some(calculate_nominal_ratio(187_500_000, 15_000))
        );
        // still the weakest remaining trove
        assert_eq!(index.last(), Some(pk(0x03)));
        assert!(index.is_well_ordered());
    }

    #[test]
    fn test_stale_partial_hint_stops_early() {
        let mut engine = RedemptionEngine::new();
        let (mut troves, mut index) = standard_setup();
        let mut fees = FeeState::new();
        let params = ProtocolParams::default();

        let hints = RedemptionHints {
            partial_nicr: 999,
            ..Default::default()
        };
        let outcome = engine
            .redeem(
                &mut troves,
                &mut index,
                &mut fees,
                &params,
                25_000,
                REDEMPTION_FEE_CEILING,
                &hints,
                0,
                30_000,
                60_000,
                40_000,
                0,
            )
            .unwrap();

        // only the full close happened
        assert_eq!(outcome.debt_redeemed, 20_000);
        assert!(outcome.partial.is_none());
        let untouched = troves.entire_position(&pk(0x03)).unwrap();
        assert_eq!(untouched.debt, 20_000);
    }

    #[test]
    fn test_sub_minimum_partial_skips_the_trove() {
        let mut engine = RedemptionEngine::new();
        let mut troves = TroveManager::new();
        let mut index = SortedTroves::default();
        let mut fees = FeeState::new();
        let params = ProtocolParams::default();

        open(&mut troves, &mut index, 0x02, COLL_BASE_UNIT, 20_000);
        open(&mut troves, &mut index, 0x03, 3 * COLL_BASE_UNIT, 30_000);
        open(&mut troves, &mut index, 0x04, 10 * COLL_BASE_UNIT, 20_000);

        // 150.00 against the weakest would leave 50.00 of debt, under the
        // minimum; it is skipped and the second trove takes the partial
        let hints = RedemptionHints {
            partial_nicr: calculate_nominal_ratio(262_500_000, 15_000),
            ..Default::default()
        };
        let outcome = engine
            .redeem(
                &mut troves,
                &mut index,
                &mut fees,
                &params,
                15_000,
                REDEMPTION_FEE_CEILING,
                &hints,
                0,
                30_000,
                70_000,
                40_000,
                0,
            )
            .unwrap();

        assert_eq!(outcome.debt_redeemed, 15_000);
        assert!(outcome.closed.is_empty());
        assert_eq!(outcome.partial.unwrap().owner, pk(0x03));

        // the skipped trove is untouched and still the weakest
        let skipped = troves.entire_position(&pk(0x02)).unwrap();
        assert_eq!(skipped.debt, 20_000);
        assert_eq!(index.last(), Some(pk(0x02)));
        assert!(index.is_well_ordered());
    }

    #[test]
    fn test_troves_below_minimum_ratio_passed_over() {
        let mut engine = RedemptionEngine::new();
        let mut troves = TroveManager::new();
        let mut index = SortedTroves::default();
        let mut fees = FeeState::new();
        let params = ProtocolParams::default();

        // at 200.00: ICRs 100%, 200%, 1000%
        open(&mut troves, &mut index, 0x02, COLL_BASE_UNIT, 20_000);
        open(&mut troves, &mut index, 0x03, 2 * COLL_BASE_UNIT, 20_000);
        open(&mut troves, &mut index, 0x04, 10 * COLL_BASE_UNIT, 20_000);

        let outcome = engine
            .redeem(
                &mut troves,
                &mut index,
                &mut fees,
                &params,
                20_000,
                REDEMPTION_FEE_CEILING,
                &RedemptionHints::default(),
                0,
                30_000,
                60_000,
                20_000,
                0,
            )
            .unwrap();

        // the undercollateralized trove stays for the liquidation path
        assert_eq!(outcome.closed.len(), 1);
        assert_eq!(outcome.closed[0].owner, pk(0x03));
        assert_eq!(outcome.collateral_drawn, 100_000_000);
        assert_eq!(outcome.closed[0].surplus, 100_000_000);
        assert!(troves.is_active(&pk(0x02)));
    }

    #[test]
    fn test_redemption_blocked_when_system_undercollateralized() {
        let mut engine = RedemptionEngine::new();
        let mut troves = TroveManager::new();
        let mut index = SortedTroves::default();
        let mut fees = FeeState::new();
        let params = ProtocolParams::default();

        // at 200.00 the system sits at TCR ~95%
        open(&mut troves, &mut index, 0x02, COLL_BASE_UNIT, 20_000);
        open(&mut troves, &mut index, 0x03, COLL_BASE_UNIT, 22_000);

        let result = engine.redeem(
            &mut troves,
            &mut index,
            &mut fees,
            &params,
            10_000,
            REDEMPTION_FEE_CEILING,
            &RedemptionHints::default(),
            0,
            30_000,
            42_000,
            20_000,
            0,
        );
        assert!(matches!(result, Err(Error::TcrBelowMcr { .. })));
        assert!(troves.is_active(&pk(0x02)));
    }

    #[test]
    fn test_rejections_leave_state_untouched() {
        let mut engine = RedemptionEngine::new();
        let (mut troves, mut index) = standard_setup();
        let mut fees = FeeState::new();
        let params = ProtocolParams::default();

        let zero = engine.redeem(
            &mut troves,
            &mut index,
            &mut fees,
            &params,
            0,
            REDEMPTION_FEE_CEILING,
            &RedemptionHints::default(),
            0,
            30_000,
            60_000,
            40_000,
            0,
        );
        assert!(matches!(zero, Err(Error::ZeroAmount)));

        let broke = engine.redeem(
            &mut troves,
            &mut index,
            &mut fees,
            &params,
            20_000,
            REDEMPTION_FEE_CEILING,
            &RedemptionHints::default(),
            0,
            5_000,
            60_000,
            40_000,
            0,
        );
        assert!(matches!(broke, Err(Error::AmountExceedsCallerBalance { .. })));

        // a 0.1% cap is under the fee floor
        let capped = engine.redeem(
            &mut troves,
            &mut index,
            &mut fees,
            &params,
            20_000,
            PRECISION / 1_000,
            &RedemptionHints::default(),
            0,
            30_000,
            60_000,
            40_000,
            0,
        );
        assert!(matches!(capped, Err(Error::FeeExceedsMax { .. })));

        assert!(troves.is_active(&pk(0x02)));
        assert_eq!(fees.base_rate(), 0);
        assert_eq!(engine.statistics().total_redemptions, 0);
    }

    #[test]
    fn test_max_iterations_bounds_the_walk() {
        let mut engine = RedemptionEngine::new();
        let (mut troves, mut index) = standard_setup();
        let mut fees = FeeState::new();
        let params = ProtocolParams::default();

        let outcome = engine
            .redeem(
                &mut troves,
                &mut index,
                &mut fees,
                &params,
                40_000,
                REDEMPTION_FEE_CEILING,
                &RedemptionHints::default(),
                1,
                60_000,
                60_000,
                40_000,
                0,
            )
            .unwrap();

        // one visit, one close; the request is left partly unfilled
        assert_eq!(outcome.debt_redeemed, 20_000);
        assert_eq!(outcome.closed.len(), 1);
        assert!(troves.is_active(&pk(0x03)));
    }

    #[test]
    fn test_first_hint_fast_path() {
        let mut engine = RedemptionEngine::new();
        let mut troves = TroveManager::new();
        let mut index = SortedTroves::default();
        let mut fees = FeeState::new();
        let params = ProtocolParams::default();

        // at 200.00 the tail trove is below the minimum ratio
        open(&mut troves, &mut index, 0x02, COLL_BASE_UNIT, 20_000);
        open(&mut troves, &mut index, 0x03, 2 * COLL_BASE_UNIT, 20_000);
        open(&mut troves, &mut index, 0x04, 10 * COLL_BASE_UNIT, 20_000);

        let hints = RedemptionHints {
            first: Some(pk(0x03)),
            ..Default::default()
        };
        let outcome = engine
            .redeem(
                &mut troves,
                &mut index,
                &mut fees,
                &params,
                20_000,
                REDEMPTION_FEE_CEILING,
                &hints,
                0,
                30_000,
                60_000,
                20_000,
                0,
            )
            .unwrap();
        assert_eq!(outcome.closed[0].owner, pk(0x03));

        // a wrong first hint falls back to the tail walk
        let mut engine = RedemptionEngine::new();
        let mut troves2 = TroveManager::new();
        let mut index2 = SortedTroves::default();
        open(&mut troves2, &mut index2, 0x02, COLL_BASE_UNIT, 20_000);
        open(&mut troves2, &mut index2, 0x03, 2 * COLL_BASE_UNIT, 20_000);
        open(&mut troves2, &mut index2, 0x04, 10 * COLL_BASE_UNIT, 20_000);
        let bad_hints = RedemptionHints {
            first: Some(pk(0x04)),
            ..Default::default()
        };
        let outcome = engine
            .redeem(
                &mut troves2,
                &mut index2,
                &mut FeeState::new(),
                &params,
                20_000,
                REDEMPTION_FEE_CEILING,
                &bad_hints,
                0,
                30_000,
                60_000,
                20_000,
                0,
            )
            .unwrap();
        assert_eq!(outcome.closed[0].owner, pk(0x03));
    }

    #[test]
    fn test_unable_to_redeem_when_everything_skipped() {
        let mut engine = RedemptionEngine::new();
        let (mut troves, mut index) = standard_setup();
        let mut fees = FeeState::new();
        let params = ProtocolParams::default();

        // every trove holds 200.00 of debt; 150.00 cannot close any of them
        // and a partial would leave all of them under the minimum
        let result = engine.redeem(
            &mut troves,
            &mut index,
            &mut fees,
            &params,
            15_000,
            REDEMPTION_FEE_CEILING,
            &RedemptionHints::default(),
            0,
            30_000,
            60_000,
            40_000,
            0,
        );
        assert!(matches!(result, Err(Error::UnableToRedeem)));
        assert_eq!(fees.base_rate(), 0);
        assert_eq!(index.len(), 3);
    }
}
