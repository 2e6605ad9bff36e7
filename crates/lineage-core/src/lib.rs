//! # lineage-core
//! Foundation types, constants and collaborator traits for the Lineage
//! royalty protocol.

pub mod collaborators;
pub mod constants;
pub mod error;
pub mod ledger;
pub mod math;
pub mod traits;
pub mod types;
