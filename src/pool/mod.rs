//! Stability pool and reward issuance.
//!
//! This module holds the liquidation backstop:
//! - The product/sum pool tracking compounded deposits, collateral gains,
//!   and secondary reward gains through liquidation losses
//! - The linear issuance schedule feeding rewards into the pool

pub mod issuance;
pub mod stability;

pub use issuance::*;
pub use stability::*;
