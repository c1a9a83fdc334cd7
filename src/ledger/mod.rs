//! Custody ledgers.
//!
//! This module tracks where value sits:
//! - The collateral vault with its free, active, defaulted, pool, fee, and
//!   surplus buckets
//! - The debt-token ledger with balances and total supply

pub mod collateral;
pub mod token;

pub use collateral::*;
pub use token::*;
