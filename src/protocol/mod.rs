//! Protocol assembly and orchestration.
//!
//! This module ties the components together:
//! - The [`ProtocolCore`] facade owning all state and exposing every
//!   operation
//! - Typed events with a bounded in-memory log

pub mod core;
pub mod events;

pub use self::core::*;
pub use events::*;
