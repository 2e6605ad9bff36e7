//! # lineage-policy — Royalty policies.
//!
//! Two ways a child node can owe royalties to its ancestry:
//! - [`AncestorStackPolicy`] (additive): the child's royalty stack is the sum
//!   of every edge in its ancestor closure. The stack is reserved inside the
//!   child's vault and each ancestor collects its contribution later.
//! - [`PathDecayPolicy`] (multiplicative): a child links to exactly one
//!   parent, and each upstream ancestor is settled at link time with the
//!   compounded percentage along the single path.

pub mod lap;
pub mod lrp;

pub use lap::{AncestorStackPolicy, RoyaltyData, StackLimits, StackLink};
pub use lrp::{PathDecayPolicy, PathLink, Settlement};
