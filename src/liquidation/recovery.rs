//! Recovery mode.
//!
//! When the total collateralization ratio (TCR) falls below the critical
//! threshold (CCR), the system is in recovery mode:
//!
//! 1. **Liquidation eligibility widens**: troves are judged against the live
//!    TCR instead of the minimum ratio, and troves whose ICR exceeds the live
//!    TCR are immune since closing them would not improve solvency
//! 2. **Opening restricted**: new troves must open at or above the CCR
//! 3. **Adjustments restricted**: changes that worsen a trove's ratio and
//!    trove closes are blocked
//!
//! Recovery mode is never cached. Every check recomputes the TCR from live
//! totals, so a liquidation sequence observes the ratio improving as it runs.

use serde::{Deserialize, Serialize};

use crate::core::config::ProtocolParams;
use crate::core::trove::TroveManager;
use crate::error::Result;
use crate::utils::math::calculate_collateral_ratio;

// ═══════════════════════════════════════════════════════════════════════════════
// SYSTEM RATIOS
// ═══════════════════════════════════════════════════════════════════════════════

/// Total collateralization ratio over active plus redistributed amounts.
///
/// A debt-free system is infinitely collateralized.
pub fn system_tcr(troves: &TroveManager, price: u64) -> Result<u128> {
    calculate_collateral_ratio(
        troves.entire_system_collateral(),
        troves.entire_system_debt(),
        price,
    )
}

/// Whether a TCR puts the system in recovery mode
pub fn is_recovery_mode(tcr: u128, params: &ProtocolParams) -> bool {
    tcr < params.critical_collateral_ratio
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION ELIGIBILITY
// ═══════════════════════════════════════════════════════════════════════════════

/// Whether a trove at `icr` can be liquidated right now.
///
/// Normal mode: eligible below the minimum collateral ratio. Recovery mode:
/// eligible at or below the live TCR, immune above it.
pub fn is_liquidatable(icr: u128, tcr: u128, recovery: bool, params: &ProtocolParams) -> bool {
    if recovery {
        icr <= tcr
    } else {
        icr < params.min_collateral_ratio
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// System health snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryStatus {
    /// Whether recovery mode is active
    pub is_active: bool,
    /// Current TCR at PRECISION
    pub tcr: u128,
    /// TCR below which recovery mode activates
    pub critical_threshold: u128,
    /// Total system collateral, redistributed amounts included
    pub total_collateral: u64,
    /// Total system debt, redistributed amounts included
    pub total_debt: u64,
    /// Active troves with ICR below the critical threshold
    pub troves_below_critical: u64,
    /// Debt held by troves below the critical threshold
    pub debt_below_critical: u64,
}

/// Compute the current system health snapshot.
///
/// Walks every active trove, so this is a reporting call, not an operation
/// on the hot path.
pub fn recovery_status(
    troves: &TroveManager,
    params: &ProtocolParams,
    price: u64,
) -> Result<RecoveryStatus> {
    let tcr = system_tcr(troves, price)?;

    let mut troves_below = 0u64;
    let mut debt_below = 0u64;
    for owner in troves.active_owners() {
        let icr = troves.current_icr(owner, price)?;
        if icr < params.critical_collateral_ratio {
            let position = troves.entire_position(owner)?;
            troves_below += 1;
            debt_below = debt_below.saturating_add(position.debt);
        }
    }

    Ok(RecoveryStatus {
        is_active: is_recovery_mode(tcr, params),
        tcr,
        critical_threshold: params.critical_collateral_ratio,
        total_collateral: troves.entire_system_collateral(),
        total_debt: troves.entire_system_debt(),
        troves_below_critical: troves_below,
        debt_below_critical: debt_below,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::{
        COLL_BASE_UNIT, CRITICAL_COLLATERAL_RATIO, MIN_COLLATERAL_RATIO, PRECISION, PUBKEY_LENGTH,
    };
    use crate::utils::crypto::PublicKey;

    fn pk(byte: u8) -> PublicKey {
        PublicKey::new([byte; PUBKEY_LENGTH])
    }

    #[test]
    fn test_system_tcr() {
        let mut troves = TroveManager::new();
        troves.open_trove(pk(0x02), COLL_BASE_UNIT, 20_000).unwrap();
        troves.open_trove(pk(0x03), COLL_BASE_UNIT, 30_000).unwrap();

        // 2 tokens worth 50_000 at 250.00 each, against 50_000 debt
        let tcr = system_tcr(&troves, 25_000).unwrap();
        assert_eq!(tcr, PRECISION);
    }

    #[test]
    fn test_empty_system_is_never_in_recovery() {
        let troves = TroveManager::new();
        let params = ProtocolParams::default();

        let tcr = system_tcr(&troves, 25_000).unwrap();
        assert_eq!(tcr, u128::MAX);
        assert!(!is_recovery_mode(tcr, &params));
    }

    #[test]
    fn test_recovery_threshold_is_strict() {
        let params = ProtocolParams::default();
        assert!(is_recovery_mode(CRITICAL_COLLATERAL_RATIO - 1, &params));
        assert!(!is_recovery_mode(CRITICAL_COLLATERAL_RATIO, &params));
    }

    #[test]
    fn test_liquidatable_normal_mode() {
        let params = ProtocolParams::default();
        let tcr = 2 * PRECISION;

        assert!(is_liquidatable(MIN_COLLATERAL_RATIO - 1, tcr, false, &params));
        assert!(!is_liquidatable(MIN_COLLATERAL_RATIO, tcr, false, &params));
    }

    #[test]
    fn test_liquidatable_recovery_mode_widens_to_tcr() {
        let params = ProtocolParams::default();
        let tcr = 13 * PRECISION / 10;

        // above MCR but at or below the live TCR
        assert!(is_liquidatable(12 * PRECISION / 10, tcr, true, &params));
        assert!(is_liquidatable(tcr, tcr, true, &params));
        // above the live TCR is immune even in recovery mode
        assert!(!is_liquidatable(tcr + 1, tcr, true, &params));
    }

    #[test]
    fn test_recovery_status_counts_at_risk_troves() {
        let mut troves = TroveManager::new();
        let params = ProtocolParams::default();

        // at 250.00: ICRs of 125% and 500%
        troves.open_trove(pk(0x02), COLL_BASE_UNIT, 20_000).unwrap();
        troves.open_trove(pk(0x03), 2 * COLL_BASE_UNIT, 10_000).unwrap();

        let status = recovery_status(&troves, &params, 25_000).unwrap();
        assert_eq!(status.troves_below_critical, 1);
        assert_eq!(status.debt_below_critical, 20_000);
        assert_eq!(status.total_debt, 30_000);
        // 3 tokens at 250.00 against 300.00 debt
        assert_eq!(status.tcr, 5 * PRECISION / 2);
        assert!(!status.is_active);
    }
}
