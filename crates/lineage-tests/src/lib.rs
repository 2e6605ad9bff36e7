//! Cross-crate test suite for the Lineage royalty protocol.
//!
//! The integration tests under `tests/` drive a full [`RoyaltyModule`]
//! through realistic flows and check the protocol-wide properties:
//! conservation of revenue, no double payment, snapshot monotonicity,
//! royalty stack bounds, path multiplicativity and even-split fairness.
//!
//! [`RoyaltyModule`]: lineage_module::RoyaltyModule

pub mod helpers;
