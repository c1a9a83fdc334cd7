//! Protocol constants.
//!
//! Genesis defaults for ratio thresholds, fee bounds, and the fixed-point
//! bases used across the ledger. Values that operators may tune at
//! construction time are mirrored in [`crate::core::config::ProtocolParams`];
//! the constants here seed its `Default`.

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED-POINT BASES
// ═══════════════════════════════════════════════════════════════════════════════

/// Scale shared by all ratios (ICR, NICR, TCR) and pool accumulators (P, S, G).
pub const PRECISION: u128 = 1_000_000_000_000_000_000;

/// Stability-pool rescale threshold and multiplier: when `P` would drop below
/// this value it is multiplied by it and the scale counter is bumped.
pub const SCALE_FACTOR: u128 = 1_000_000_000;

/// Base units per whole collateral token (8 decimals).
pub const COLL_BASE_UNIT: u64 = 100_000_000;

/// Base units per whole debt token (2 decimals).
pub const DEBT_BASE_UNIT: u64 = 100;

/// Decimal places of the debt token.
pub const DEBT_DECIMALS: u8 = 2;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERALIZATION THRESHOLDS
// ═══════════════════════════════════════════════════════════════════════════════

/// Minimum individual collateralization ratio (110%). Positions below it are
/// liquidatable.
pub const MIN_COLLATERAL_RATIO: u128 = 1_100_000_000_000_000_000;

/// Critical system-wide ratio (150%). TCR below it puts the system in
/// Recovery Mode.
pub const CRITICAL_COLLATERAL_RATIO: u128 = 1_500_000_000_000_000_000;

/// Smallest debt a position may carry, in debt base units ($100.00).
pub const MIN_NET_DEBT: u64 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Gas compensation divisor: the caller of a liquidation receives
/// `collateral / GAS_COMP_DIVISOR` (0.5%) off the top.
pub const GAS_COMP_DIVISOR: u64 = 200;

/// Absolute ceiling on the gas-compensation carve-out, in collateral base
/// units (5 whole collateral tokens).
pub const GAS_COMP_CAP: u64 = 5 * COLL_BASE_UNIT;

// ═══════════════════════════════════════════════════════════════════════════════
// REDEMPTION FEES
// ═══════════════════════════════════════════════════════════════════════════════

/// Redemption fee floor: 0.5% at PRECISION.
pub const REDEMPTION_FEE_FLOOR: u128 = PRECISION / 200;

/// Redemption fee ceiling: 5% at PRECISION.
pub const REDEMPTION_FEE_CEILING: u128 = PRECISION / 20;

/// Per-minute decay factor of the redemption base rate, at PRECISION.
/// Corresponds to a 12-hour half-life.
pub const MINUTE_DECAY_FACTOR: u128 = 999_037_758_833_783_000;

/// Divisor of the redeemed-fraction term added to the base rate after each
/// redemption: `redeemed * PRECISION / (BETA * total_supply)`.
pub const BETA: u128 = 2;

/// Seconds per base-rate decay period.
pub const SECONDS_PER_MINUTE: u64 = 60;

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Compounded deposits below `initial / COMPOUNDING_DUST_DIVISOR` are treated
/// as fully absorbed.
pub const COMPOUNDING_DUST_DIVISOR: u64 = 1_000_000_000;

/// Reward units accrued to stability depositors per second by default.
pub const DEFAULT_ISSUANCE_RATE_PER_SECOND: u64 = 100;

// ═══════════════════════════════════════════════════════════════════════════════
// ORDERED INDEX
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum steps a hint walk may take before the operation fails closed.
pub const DEFAULT_HINT_WALK_BUDGET: usize = 128;

// ═══════════════════════════════════════════════════════════════════════════════
// EVENTS & IDENTITY
// ═══════════════════════════════════════════════════════════════════════════════

/// Maximum number of events retained in the in-memory log.
pub const MAX_EVENT_LOG_SIZE: usize = 1000;

/// Length of a compressed secp256k1 public key in bytes.
pub const PUBKEY_LENGTH: usize = 33;

/// Length of a hash digest in bytes.
pub const HASH_LENGTH: usize = 32;
