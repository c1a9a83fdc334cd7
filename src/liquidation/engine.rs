//! Liquidation engine.
//!
//! Closes undercollateralized troves in three movements:
//! - a gas compensation carve-out from the collateral, paid to the caller
//! - cancellation of as much debt as the settlement sink can absorb, with
//!   the matching share of collateral
//! - redistribution of the rest across all remaining troves by stake
//!
//! Each liquidation updates the ordered index and the global accumulators
//! before the next candidate is examined, so sequences always act on live
//! state.

use serde::{Deserialize, Serialize};

use crate::core::config::ProtocolParams;
use crate::core::trove::{TroveManager, TroveStatus};
use crate::error::{Error, Result};
use crate::index::sorted::SortedTroves;
use crate::liquidation::recovery;
use crate::utils::crypto::PublicKey;
use crate::utils::math::safe_mul_div;

// ═══════════════════════════════════════════════════════════════════════════════
// SETTLEMENT SINK
// ═══════════════════════════════════════════════════════════════════════════════

/// Absorbs liquidated debt in exchange for seized collateral.
///
/// The stability pool is the production implementation; the seam exists so
/// the engine can be exercised against a bare test sink.
pub trait SettlementSink {
    /// Debt the sink can absorb right now, in debt base units
    fn absorbable(&self) -> u64;

    /// Cancel `debt` against the sink and credit it with `collateral`.
    /// Never called with more debt than [`SettlementSink::absorbable`]
    /// reported.
    fn offset(&mut self, debt: u64, collateral: u64) -> Result<()>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// OUTCOMES
// ═══════════════════════════════════════════════════════════════════════════════

/// Record of a single liquidation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationOutcome {
    /// Owner of the liquidated trove
    pub owner: PublicKey,
    /// Entire debt removed, pending redistribution rewards included
    pub debt_liquidated: u64,
    /// Entire collateral removed, pending redistribution rewards included
    pub collateral_liquidated: u64,
    /// Redistribution collateral folded in when pending rewards were applied
    pub pending_collateral: u64,
    /// Debt cancelled against the settlement sink
    pub debt_absorbed: u64,
    /// Collateral paid to the settlement sink
    pub collateral_to_sink: u64,
    /// Debt spread across the remaining troves
    pub debt_redistributed: u64,
    /// Collateral spread across the remaining troves
    pub collateral_redistributed: u64,
    /// Collateral carved out for the caller
    pub gas_compensation: u64,
    /// ICR at the time of liquidation, at PRECISION
    pub icr: u128,
    /// Whether the system was in recovery mode
    pub in_recovery_mode: bool,
}

/// Aggregate of a liquidation sequence or batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidationTotals {
    pub debt_liquidated: u64,
    pub collateral_liquidated: u64,
    pub pending_collateral: u64,
    pub debt_absorbed: u64,
    pub collateral_to_sink: u64,
    pub debt_redistributed: u64,
    pub collateral_redistributed: u64,
    pub gas_compensation: u64,
    /// Per-trove outcomes in execution order
    pub outcomes: Vec<LiquidationOutcome>,
}

impl LiquidationTotals {
    pub fn new() -> Self {
        Self::default()
    }

    fn add(&mut self, outcome: LiquidationOutcome) {
        self.debt_liquidated = self.debt_liquidated.saturating_add(outcome.debt_liquidated);
        self.collateral_liquidated = self
            .collateral_liquidated
            .saturating_add(outcome.collateral_liquidated);
        self.pending_collateral = self
            .pending_collateral
            .saturating_add(outcome.pending_collateral);
        self.debt_absorbed = self.debt_absorbed.saturating_add(outcome.debt_absorbed);
        self.collateral_to_sink = self
            .collateral_to_sink
            .saturating_add(outcome.collateral_to_sink);
        self.debt_redistributed = self
            .debt_redistributed
            .saturating_add(outcome.debt_redistributed);
        self.collateral_redistributed = self
            .collateral_redistributed
            .saturating_add(outcome.collateral_redistributed);
        self.gas_compensation = self
            .gas_compensation
            .saturating_add(outcome.gas_compensation);
        self.outcomes.push(outcome);
    }

    /// Number of troves liquidated
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// Whether nothing was liquidated
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION ENGINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine for liquidating undercollateralized troves
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiquidationEngine {
    /// Troves liquidated over the engine's lifetime
    total_liquidations: u64,
    /// Debt removed from liquidated troves
    total_debt_liquidated: u64,
    /// Collateral removed from liquidated troves
    total_collateral_seized: u64,
    /// Liquidations fully absorbed by the sink
    fully_absorbed_count: u64,
    /// Liquidations that redistributed at least some debt
    redistributed_count: u64,
}

impl LiquidationEngine {
    /// Create a new liquidation engine
    pub fn new() -> Self {
        Self::default()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SINGLE LIQUIDATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate one trove.
    ///
    /// Fails with [`Error::NotLiquidatable`] if the trove does not exist, is
    /// already closed, is healthy for the current mode, or leaves debt that
    /// no remaining trove could absorb. All checks run before any state is
    /// touched.
    pub fn liquidate<S: SettlementSink>(
        &mut self,
        troves: &mut TroveManager,
        index: &mut SortedTroves,
        sink: &mut S,
        params: &ProtocolParams,
        owner: &PublicKey,
        price: u64,
    ) -> Result<LiquidationOutcome> {
        if !troves.is_active(owner) {
            return Err(Error::NotLiquidatable {
                reason: format!("trove {} does not exist or is closed", owner.short()),
            });
        }

        let tcr = recovery::system_tcr(troves, price)?;
        let in_recovery_mode = recovery::is_recovery_mode(tcr, params);
        let icr = troves.current_icr(owner, price)?;

        if !recovery::is_liquidatable(icr, tcr, in_recovery_mode, params) {
            let reason = if in_recovery_mode {
                format!("ICR {} exceeds the live TCR {}", icr, tcr)
            } else {
                format!("ICR {} meets the minimum ratio", icr)
            };
            return Err(Error::NotLiquidatable { reason });
        }

        // plan the split before touching anything
        let entire = troves.entire_position(owner)?;
        let gas_compensation = (entire.collateral / params.gas_compensation_divisor)
            .min(params.gas_compensation_cap);
        let collateral_to_liquidate = entire.collateral - gas_compensation;

        let debt_absorbed = entire.debt.min(sink.absorbable());
        let collateral_to_sink = if debt_absorbed == entire.debt {
            collateral_to_liquidate
        } else {
            safe_mul_div(collateral_to_liquidate, debt_absorbed, entire.debt)?
        };
        let debt_redistributed = entire.debt - debt_absorbed;
        let collateral_redistributed = collateral_to_liquidate - collateral_to_sink;

        if debt_redistributed > 0 {
            let stake = troves.get(owner).map(|t| t.stake).unwrap_or(0);
            if troves.total_stakes() == stake {
                return Err(Error::NotLiquidatable {
                    reason: "no remaining troves to absorb the redistribution".into(),
                });
            }
        }

        troves.apply_pending_rewards(owner)?;
        troves.remove_stake(owner)?;
        troves.close_trove(owner, TroveStatus::ClosedByLiquidation)?;
        index.remove(owner)?;

        if debt_absorbed > 0 {
            sink.offset(debt_absorbed, collateral_to_sink)?;
        }
        if debt_redistributed > 0 {
            troves.redistribute(debt_redistributed, collateral_redistributed)?;
        }
        troves.update_system_snapshots();

        self.total_liquidations += 1;
        self.total_debt_liquidated = self.total_debt_liquidated.saturating_add(entire.debt);
        self.total_collateral_seized = self
            .total_collateral_seized
            .saturating_add(entire.collateral);
        if debt_redistributed > 0 {
            self.redistributed_count += 1;
        } else {
            self.fully_absorbed_count += 1;
        }

        tracing::info!(
            owner = %owner.short(),
            debt = entire.debt,
            collateral = entire.collateral,
            debt_absorbed,
            debt_redistributed,
            icr = %icr,
            in_recovery_mode,
            "trove liquidated"
        );

        Ok(LiquidationOutcome {
            owner: *owner,
            debt_liquidated: entire.debt,
            collateral_liquidated: entire.collateral,
            pending_collateral: entire.pending_collateral,
            debt_absorbed,
            collateral_to_sink,
            debt_redistributed,
            collateral_redistributed,
            gas_compensation,
            icr,
            in_recovery_mode,
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SEQUENCES AND BATCHES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate up to `max_troves` of the weakest troves, walking the index
    /// from the tail. Zero means no limit.
    ///
    /// Non-liquidatable troves along the walk are skipped, not failed on;
    /// recovery-mode immunity is re-evaluated after every liquidation as the
    /// TCR moves.
    pub fn liquidate_sequence<S: SettlementSink>(
        &mut self,
        troves: &mut TroveManager,
        index: &mut SortedTroves,
        sink: &mut S,
        params: &ProtocolParams,
        price: u64,
        max_troves: usize,
    ) -> Result<LiquidationTotals> {
        let mut totals = LiquidationTotals::new();
        let mut cursor = index.last();
        let mut visited = 0usize;

        while let Some(owner) = cursor {
            if max_troves != 0 && visited >= max_troves {
                break;
            }
            visited += 1;

            // the walk continues from the neighbor captured before removal
            let next = index.prev(&owner);
            match self.liquidate(troves, index, sink, params, &owner, price) {
                Ok(outcome) => totals.add(outcome),
                Err(Error::NotLiquidatable { .. }) => {}
                Err(e) => return Err(e),
            }
            cursor = next;
        }

        if totals.is_empty() {
            return Err(Error::NothingToLiquidate);
        }

        tracing::info!(
            liquidated = totals.len(),
            visited,
            debt_liquidated = totals.debt_liquidated,
            "liquidation sequence complete"
        );
        Ok(totals)
    }

    /// Liquidate exactly the given troves, skipping entries that are not
    /// currently liquidatable.
    pub fn liquidate_batch<S: SettlementSink>(
        &mut self,
        troves: &mut TroveManager,
        index: &mut SortedTroves,
        sink: &mut S,
        params: &ProtocolParams,
        owners: &[PublicKey],
        price: u64,
    ) -> Result<LiquidationTotals> {
        if owners.is_empty() {
            return Err(Error::EmptyBatch);
        }

        let mut totals = LiquidationTotals::new();
        for owner in owners {
            match self.liquidate(troves, index, sink, params, owner, price) {
                Ok(outcome) => totals.add(outcome),
                Err(Error::NotLiquidatable { reason }) => {
                    tracing::warn!(owner = %owner.short(), %reason, "skipping batch entry");
                }
                Err(e) => return Err(e),
            }
        }

        if totals.is_empty() {
            return Err(Error::NothingToLiquidate);
        }
        Ok(totals)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Troves liquidated over the engine's lifetime
    pub fn total_liquidations(&self) -> u64 {
        self.total_liquidations
    }

    /// Get statistics
    pub fn statistics(&self) -> LiquidationStatistics {
        LiquidationStatistics {
            total_liquidations: self.total_liquidations,
            total_debt_liquidated: self.total_debt_liquidated,
            total_collateral_seized: self.total_collateral_seized,
            fully_absorbed_count: self.fully_absorbed_count,
            redistributed_count: self.redistributed_count,
        }
    }
}

/// Liquidation statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiquidationStatistics {
    pub total_liquidations: u64,
    pub total_debt_liquidated: u64,
    pub total_collateral_seized: u64,
    pub fully_absorbed_count: u64,
    pub redistributed_count: u64,
}
