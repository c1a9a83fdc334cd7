//! # trovecore
//!
//! A collateralized-debt-position ledger: borrowers lock collateral in
//! troves and mint a debt token against it, with solvency enforced by
//! hint-guided liquidations, stake-weighted redistribution, a stability
//! pool, and face-value redemptions.
//!
//! ## Architecture
//!
//! The protocol consists of several core modules:
//!
//! - **Core**: Parameters, the trove registry, and the fee state
//! - **Index**: The ordered trove list keyed by nominal collateral ratio
//! - **Ledger**: Collateral custody buckets and the debt-token ledger
//! - **Liquidation**: The liquidation engine and recovery-mode rules
//! - **Pool**: The stability pool and its reward issuance schedule
//! - **Redemption**: Face-value redemption against the weakest troves
//! - **Protocol**: The facade assembling everything plus typed events
//!
//! ## Example
//!
//! ```rust,ignore
//! use trovecore::prelude::*;
//!
//! let mut core = ProtocolCore::new(ProtocolParams::default())?;
//! core.set_timestamp(now)?;
//! core.set_price(price)?;
//!
//! // Lock collateral and mint debt against it
//! core.deposit_collateral(owner, collateral)?;
//! let icr = core.open_trove(owner, collateral, debt, &PositionHints::default())?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod core;
pub mod error;
pub mod index;
pub mod ledger;
pub mod liquidation;
pub mod pool;
pub mod protocol;
pub mod redemption;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        config::ProtocolParams,
        fees::FeeState,
        trove::{Trove, TroveManager, TroveStatus},
    };
    pub use crate::error::{Error, Result};
    pub use crate::index::sorted::SortedTroves;
    pub use crate::ledger::{
        collateral::{CollateralAmount, CollateralVault},
        token::{Account, DebtAmount, DebtToken},
    };
    pub use crate::liquidation::engine::{LiquidationEngine, LiquidationOutcome};
    pub use crate::pool::stability::StabilityPool;
    pub use crate::protocol::core::{PositionHints, ProtocolCore};
    pub use crate::redemption::engine::{RedemptionHints, RedemptionOutcome};
    pub use crate::utils::crypto::{Hash, PublicKey};
}

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "trovecore";
