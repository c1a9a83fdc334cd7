//! Liquidation module.
//!
//! This module closes undercollateralized troves:
//! - Liquidation engine with pool settlement and stake-weighted redistribution
//! - Settlement sink seam between the engine and the stability pool
//! - Recovery mode detection and the widened liquidation threshold

pub mod engine;
pub mod recovery;

pub use engine::*;
pub use recovery::*;
