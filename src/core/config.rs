//! Protocol parameters.
//!
//! All operational knobs live in one struct with defaults taken from the
//! protocol constants. Ratios are fixed-point at PRECISION, debt amounts are
//! in debt base units, collateral amounts in collateral base units.
//!
//! The fee band and decay factor for redemptions are protocol constants and
//! are not parameterized here.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::constants::*;

// ═══════════════════════════════════════════════════════════════════════════════
// PROTOCOL PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Operational parameters, set at construction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolParams {
    /// Protocol version
    pub version: String,

    /// Minimum collateralization ratio at PRECISION.
    /// Below this, troves can be liquidated.
    pub min_collateral_ratio: u128,

    /// Critical collateralization ratio at PRECISION.
    /// When system TCR falls below this, recovery mode activates.
    pub critical_collateral_ratio: u128,

    /// Minimum debt per trove in debt base units
    pub min_net_debt: u64,

    /// Divisor for the liquidation gas compensation carved from collateral
    pub gas_compensation_divisor: u64,

    /// Upper bound on gas compensation, in collateral base units
    pub gas_compensation_cap: u64,

    /// Maximum list positions an index search may walk from its hints
    pub hint_walk_budget: usize,

    /// Reward units accrued to stability depositors per second
    pub issuance_rate_per_second: u64,
}

impl Default for ProtocolParams {
    fn default() -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            min_collateral_ratio: MIN_COLLATERAL_RATIO,
            critical_collateral_ratio: CRITICAL_COLLATERAL_RATIO,
            min_net_debt: MIN_NET_DEBT,
            gas_compensation_divisor: GAS_COMP_DIVISOR,
            gas_compensation_cap: GAS_COMP_CAP,
            hint_walk_budget: DEFAULT_HINT_WALK_BUDGET,
            issuance_rate_per_second: DEFAULT_ISSUANCE_RATE_PER_SECOND,
        }
    }
}

impl ProtocolParams {
    /// Create with custom MCR (for testing)
    pub fn with_mcr(mut self, mcr: u128) -> Self {
        self.min_collateral_ratio = mcr;
        self
    }

    /// Create with custom CCR (for testing)
    pub fn with_ccr(mut self, ccr: u128) -> Self {
        self.critical_collateral_ratio = ccr;
        self
    }

    /// Create with custom minimum trove debt
    pub fn with_min_net_debt(mut self, min_net_debt: u64) -> Self {
        self.min_net_debt = min_net_debt;
        self
    }

    /// Create with custom hint walk budget
    pub fn with_hint_walk_budget(mut self, budget: usize) -> Self {
        self.hint_walk_budget = budget;
        self
    }

    /// Create with custom reward issuance rate
    pub fn with_issuance_rate(mut self, rate_per_second: u64) -> Self {
        self.issuance_rate_per_second = rate_per_second;
        self
    }

    /// Validate parameters are consistent
    pub fn validate(&self) -> Result<()> {
        if self.min_collateral_ratio <= PRECISION {
            return Err(Error::InvalidParameter {
                name: "min_collateral_ratio".into(),
                reason: "must exceed 100%".into(),
            });
        }
        if self.critical_collateral_ratio <= self.min_collateral_ratio {
            return Err(Error::InvalidParameter {
                name: "critical_collateral_ratio".into(),
                reason: "must exceed the minimum collateral ratio".into(),
            });
        }
        if self.min_net_debt == 0 {
            return Err(Error::InvalidParameter {
                name: "min_net_debt".into(),
                reason: "must be non-zero".into(),
            });
        }
        if self.gas_compensation_divisor == 0 {
            return Err(Error::InvalidParameter {
                name: "gas_compensation_divisor".into(),
                reason: "must be non-zero".into(),
            });
        }
        if self.hint_walk_budget == 0 {
            return Err(Error::InvalidParameter {
                name: "hint_walk_budget".into(),
                reason: "must allow at least one step".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_validate() {
        let params = ProtocolParams::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.min_collateral_ratio, MIN_COLLATERAL_RATIO);
        assert_eq!(params.critical_collateral_ratio, CRITICAL_COLLATERAL_RATIO);
    }

    #[test]
    fn test_mcr_must_exceed_one() {
        let params = ProtocolParams::default().with_mcr(PRECISION);
        assert!(matches!(
            params.validate(),
            Err(Error::InvalidParameter { name, .. }) if name == "min_collateral_ratio"
        ));
    }

    #[test]
    fn test_ccr_must_exceed_mcr() {
        let params = ProtocolParams::default()
            .with_mcr(3 * PRECISION / 2)
            .with_ccr(11 * PRECISION / 10);
        assert!(matches!(
            params.validate(),
            Err(Error::InvalidParameter { name, .. }) if name == "critical_collateral_ratio"
        ));
    }

    #[test]
    fn test_zero_min_net_debt_rejected() {
        let params = ProtocolParams::default().with_min_net_debt(0);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_zero_walk_budget_rejected() {
        let params = ProtocolParams::default().with_hint_walk_budget(0);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_builders() {
        let params = ProtocolParams::default()
            .with_min_net_debt(50_000)
            .with_issuance_rate(7)
            .with_hint_walk_budget(16);
        assert_eq!(params.min_net_debt, 50_000);
        assert_eq!(params.issuance_rate_per_second, 7);
        assert_eq!(params.hint_walk_budget, 16);
    }
}
