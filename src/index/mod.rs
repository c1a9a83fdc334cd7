//! Ordered trove index.
//!
//! A doubly linked list of active troves sorted by nominal collateral
//! ratio, descending. Callers position inserts with off-path hints; a
//! bounded walk corrects stale ones.

pub mod sorted;

pub use sorted::*;
