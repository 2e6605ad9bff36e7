//! # lineage-module — Composition root of the Lineage royalty protocol.
//!
//! [`RoyaltyModule`] owns the royalty graph, both royalty policies, every
//! node's vault, every group's reward pool and the external revenue ledger.
//! It checks authorization, registration and dispute state, drives the
//! policies, and executes the payouts vaults and pools return.
//!
//! [`SharedRoyaltyModule`] wraps a module in a reentrancy-guarded handle.

pub mod config;
pub mod error;
pub mod module;
pub mod shared;

pub use config::RoyaltyConfig;
pub use error::ModuleError;
pub use module::{Collaborators, RoyaltyModule};
pub use shared::SharedRoyaltyModule;
