//! Debt token redemption.
//!
//! Holders exchange debt tokens for collateral at face value against the
//! weakest troves in the system:
//! - the walk starts at the caller's hint, or at the tail of the ordered
//!   index when the hint does not check out
//! - redeemed troves close with their leftover collateral held as claimable
//!   surplus; the last trove may shrink in place and re-thread at its new
//!   sort position
//! - the fee on drawn collateral grows with redemption volume and decays
//!   with time, discouraging redemption runs

pub mod engine;

pub use engine::*;
