//! Error types for the trove ledger.
//!
//! Every fallible operation in the crate returns [`Result`]. Variants carry
//! the values that made the operation fail so callers can correct inputs and
//! retry; [`Error::code`] gives each variant a stable numeric identifier for
//! logs and external reporting.

use thiserror::Error;

/// Result type alias for ledger operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type covering all ledger operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════════
    // TROVE ERRORS (1xxx)
    // ═══════════════════════════════════════════════════════════════════════
    /// No active trove exists for the owner.
    #[error("trove not found for owner {owner}")]
    TroveNotFound {
        /// Short hex form of the owner key.
        owner: String,
    },

    /// The owner already has an active trove.
    #[error("trove already active for owner {owner}")]
    TroveAlreadyActive {
        /// Short hex form of the owner key.
        owner: String,
    },

    /// A trove operation would leave its debt under the protocol minimum.
    #[error("debt {actual} below minimum net debt {minimum}")]
    DebtBelowMinimum {
        /// Minimum net debt in debt base units.
        minimum: u64,
        /// Resulting debt in debt base units.
        actual: u64,
    },

    /// A trove operation would leave its ICR under the applicable floor.
    #[error("collateralization ratio {icr} below required {required}")]
    IcrTooLow {
        /// Resulting ICR at PRECISION.
        icr: u128,
        /// Required floor at PRECISION (MCR, or CCR in recovery mode).
        required: u128,
    },

    /// The operation is not permitted while the system is in recovery mode.
    #[error("operation not permitted in recovery mode: {operation}")]
    ForbiddenInRecoveryMode {
        /// Name of the rejected operation.
        operation: String,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // LIQUIDATION ERRORS (2xxx)
    // ═══════════════════════════════════════════════════════════════════════
    /// The targeted position cannot be liquidated.
    #[error("position is not liquidatable: {reason}")]
    NotLiquidatable {
        /// Why the position is safe (missing, closed, or above threshold).
        reason: String,
    },

    /// A sequence or batch call produced zero liquidations.
    #[error("no position in the call was liquidatable")]
    NothingToLiquidate,

    /// An empty owner list was supplied to a batch liquidation.
    #[error("liquidation batch is empty")]
    EmptyBatch,

    // ═══════════════════════════════════════════════════════════════════════
    // REDEMPTION ERRORS (3xxx)
    // ═══════════════════════════════════════════════════════════════════════
    /// Redemptions are disallowed while the system itself is undercollateralized.
    #[error("total collateralization {tcr} below minimum {mcr}")]
    TcrBelowMcr {
        /// Current TCR at PRECISION.
        tcr: u128,
        /// Minimum collateralization ratio at PRECISION.
        mcr: u128,
    },

    /// The computed redemption fee rate exceeds the caller's stated maximum.
    #[error("redemption fee rate {rate} exceeds caller maximum {max}")]
    FeeExceedsMax {
        /// Computed fee rate at PRECISION.
        rate: u128,
        /// Caller-supplied ceiling at PRECISION.
        max: u128,
    },

    /// The redemption fee would consume all collateral drawn.
    #[error("redemption fee consumes the entire collateral drawn")]
    FeeEatsAllCollateral,

    /// The redemption walk could not cancel any debt.
    #[error("unable to redeem any amount")]
    UnableToRedeem,

    // ═══════════════════════════════════════════════════════════════════════
    // STABILITY POOL ERRORS (4xxx)
    // ═══════════════════════════════════════════════════════════════════════
    /// The depositor has no recorded deposit.
    #[error("depositor has no stability deposit")]
    NoDeposit,

    // ═══════════════════════════════════════════════════════════════════════
    // ORDERED INDEX ERRORS (5xxx)
    // ═══════════════════════════════════════════════════════════════════════
    /// The hint walk exhausted its step budget without converging.
    #[error("insert hints too stale: walk exceeded {budget} steps")]
    HintsTooStale {
        /// Step budget that was exhausted.
        budget: usize,
    },

    /// The owner is not present in the index.
    #[error("owner {owner} not present in the sorted index")]
    NotInIndex {
        /// Short hex form of the owner key.
        owner: String,
    },

    /// The owner is already present in the index.
    #[error("owner {owner} already present in the sorted index")]
    AlreadyInIndex {
        /// Short hex form of the owner key.
        owner: String,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // LEDGER ERRORS (6xxx)
    // ═══════════════════════════════════════════════════════════════════════
    /// The caller's debt-token balance does not cover the requested amount.
    #[error("amount {requested} exceeds caller balance {available}")]
    AmountExceedsCallerBalance {
        /// Requested amount in debt base units.
        requested: u64,
        /// Caller's balance in debt base units.
        available: u64,
    },

    /// A collateral bucket does not hold the required amount.
    #[error("insufficient collateral: required {required}, available {available}")]
    InsufficientCollateral {
        /// Required amount in collateral base units.
        required: u64,
        /// Available amount in collateral base units.
        available: u64,
    },

    /// The owner has no claimable collateral surplus.
    #[error("no collateral surplus to claim")]
    NoSurplusToClaim,

    /// Recorded balances no longer sum to the recorded total supply.
    #[error("token supply invariant violated: expected {expected}, actual {actual}")]
    SupplyInvariantViolated {
        /// Recorded total supply.
        expected: u64,
        /// Sum of all balances.
        actual: u64,
    },

    /// Collateral custody buckets no longer sum to the recorded total.
    #[error("collateral invariant violated: expected {expected}, actual {actual}")]
    CollateralInvariantViolated {
        /// Recorded custody total.
        expected: u64,
        /// Sum of all buckets and user balances.
        actual: u64,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // VALIDATION & MATH ERRORS (7xxx)
    // ═══════════════════════════════════════════════════════════════════════
    /// A zero amount was supplied where a positive amount is required.
    #[error("amount must be greater than zero")]
    ZeroAmount,

    /// A configuration or call parameter is out of range.
    #[error("invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Checked arithmetic overflowed.
    #[error("arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed.
        operation: String,
    },

    /// Checked arithmetic underflowed.
    #[error("arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed.
        operation: String,
    },

    /// Division by zero.
    #[error("division by zero in {operation}")]
    DivisionByZero {
        /// Operation attempting the division.
        operation: String,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // SERIALIZATION ERRORS (8xxx)
    // ═══════════════════════════════════════════════════════════════════════
    /// State could not be serialized.
    #[error("serialization failed: {reason}")]
    SerializationFailed {
        /// Underlying encoder error.
        reason: String,
    },

    /// State could not be deserialized.
    #[error("deserialization failed: {reason}")]
    DeserializationFailed {
        /// Underlying decoder error.
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // INTERNAL ERRORS (9xxx)
    // ═══════════════════════════════════════════════════════════════════════
    /// An internal consistency check failed.
    #[error("internal error: {message}")]
    Internal {
        /// Description of the broken assumption.
        message: String,
    },
}

impl Error {
    /// Stable numeric code for the error variant.
    pub fn code(&self) -> u32 {
        match self {
            Error::TroveNotFound { .. } => 1001,
            Error::TroveAlreadyActive { .. } => 1002,
            Error::DebtBelowMinimum { .. } => 1003,
            Error::IcrTooLow { .. } => 1004,
            Error::ForbiddenInRecoveryMode { .. } => 1005,

            Error::NotLiquidatable { .. } => 2001,
            Error::NothingToLiquidate => 2002,
            Error::EmptyBatch => 2003,

            Error::TcrBelowMcr { .. } => 3001,
            Error::FeeExceedsMax { .. } => 3002,
            Error::FeeEatsAllCollateral => 3003,
            Error::UnableToRedeem => 3004,

            Error::NoDeposit => 4001,

            Error::HintsTooStale { .. } => 5001,
            Error::NotInIndex { .. } => 5002,
            Error::AlreadyInIndex { .. } => 5003,

            Error::AmountExceedsCallerBalance { .. } => 6001,
            Error::InsufficientCollateral { .. } => 6002,
            Error::NoSurplusToClaim => 6003,
            Error::SupplyInvariantViolated { .. } => 6004,
            Error::CollateralInvariantViolated { .. } => 6005,

            Error::ZeroAmount => 7001,
            Error::InvalidParameter { .. } => 7002,
            Error::Overflow { .. } => 7003,
            Error::Underflow { .. } => 7004,
            Error::DivisionByZero { .. } => 7005,

            Error::SerializationFailed { .. } => 8001,
            Error::DeserializationFailed { .. } => 8002,

            Error::Internal { .. } => 9001,
        }
    }

    /// Whether the caller can expect the operation to succeed after
    /// correcting inputs (fresh hints, smaller amount, higher fee cap).
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::TroveNotFound { .. }
                | Error::TroveAlreadyActive { .. }
                | Error::DebtBelowMinimum { .. }
                | Error::IcrTooLow { .. }
                | Error::NotLiquidatable { .. }
                | Error::NothingToLiquidate
                | Error::EmptyBatch
                | Error::FeeExceedsMax { .. }
                | Error::UnableToRedeem
                | Error::NoDeposit
                | Error::HintsTooStale { .. }
                | Error::AmountExceedsCallerBalance { .. }
                | Error::NoSurplusToClaim
                | Error::ZeroAmount
                | Error::InvalidParameter { .. }
        )
    }

    /// Whether the error indicates a broken accounting invariant rather than
    /// a rejected request.
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::SupplyInvariantViolated { .. }
                | Error::CollateralInvariantViolated { .. }
                | Error::Internal { .. }
        )
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::SerializationFailed {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<Error> {
        vec![
            Error::TroveNotFound {
                owner: "02ab..".into(),
            },
            Error::TroveAlreadyActive {
                owner: "02ab..".into(),
            },
            Error::DebtBelowMinimum {
                minimum: 10_000,
                actual: 5_000,
            },
            Error::IcrTooLow {
                icr: 1,
                required: 2,
            },
            Error::ForbiddenInRecoveryMode {
                operation: "close_trove".into(),
            },
            Error::NotLiquidatable {
                reason: "above threshold".into(),
            },
            Error::NothingToLiquidate,
            Error::EmptyBatch,
            Error::TcrBelowMcr { tcr: 1, mcr: 2 },
            Error::FeeExceedsMax { rate: 2, max: 1 },
            Error::FeeEatsAllCollateral,
            Error::UnableToRedeem,
            Error::NoDeposit,
            Error::HintsTooStale { budget: 128 },
            Error::NotInIndex {
                owner: "02ab..".into(),
            },
            Error::AlreadyInIndex {
                owner: "02ab..".into(),
            },
            Error::AmountExceedsCallerBalance {
                requested: 2,
                available: 1,
            },
            Error::InsufficientCollateral {
                required: 2,
                available: 1,
            },
            Error::NoSurplusToClaim,
            Error::SupplyInvariantViolated {
                expected: 1,
                actual: 2,
            },
            Error::CollateralInvariantViolated {
                expected: 1,
                actual: 2,
            },
            Error::ZeroAmount,
            Error::InvalidParameter {
                name: "mcr".into(),
                reason: "below 100%".into(),
            },
            Error::Overflow {
                operation: "test".into(),
            },
            Error::Underflow {
                operation: "test".into(),
            },
            Error::DivisionByZero {
                operation: "test".into(),
            },
            Error::SerializationFailed {
                reason: "test".into(),
            },
            Error::DeserializationFailed {
                reason: "test".into(),
            },
            Error::Internal {
                message: "test".into(),
            },
        ]
    }

    #[test]
    fn test_error_codes_unique() {
        let mut codes: Vec<u32> = all_variants().iter().map(|e| e.code()).collect();
        let len = codes.len();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), len, "duplicate error codes");
    }

    #[test]
    fn test_error_display() {
        let err = Error::DebtBelowMinimum {
            minimum: 10_000,
            actual: 5_000,
        };
        assert_eq!(err.to_string(), "debt 5000 below minimum net debt 10000");

        let err = Error::HintsTooStale { budget: 64 };
        assert!(err.to_string().contains("64 steps"));
    }

    #[test]
    fn test_critical_not_recoverable() {
        for err in all_variants() {
            if err.is_critical() {
                assert!(
                    !err.is_recoverable(),
                    "{} is both critical and recoverable",
                    err
                );
            }
        }
    }

    #[test]
    fn test_solvency_guards_recoverable() {
        assert!(Error::FeeExceedsMax { rate: 2, max: 1 }.is_recoverable());
        assert!(Error::HintsTooStale { budget: 1 }.is_recoverable());
        assert!(!Error::TcrBelowMcr { tcr: 1, mcr: 2 }.is_recoverable());
    }
}
