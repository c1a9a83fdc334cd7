//! Shared utilities.
//!
//! This module contains helpers used across the protocol:
//! - Cryptographic primitives
//! - Checked fixed-point arithmetic
//! - Constants

pub mod constants;
pub mod crypto;
pub mod math;

pub use constants::*;
pub use crypto::*;
pub use math::*;
