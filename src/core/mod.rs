//! Core protocol building blocks.
//!
//! This module contains the fundamental pieces:
//! - Protocol parameters with validation
//! - The trove registry with stakes and redistribution accounting
//! - The redemption fee state with its decaying base rate

pub mod config;
pub mod fees;
pub mod trove;

pub use config::*;
pub use fees::*;
pub use trove::*;
