//! # lineage-graph — Graph royalty oracle.
//!
//! Stores the parent edges of the derivative graph and answers ancestry
//! queries over them. All traversals are breadth-first with a visited set
//! local to the call, so each ancestor and each edge is processed once no
//! matter how many paths reach it:
//! - **Royalty stack**: additive sum of every edge in the ancestor closure.
//! - **Path royalty**: multiplicative product along the path recorded by the
//!   traversal's discovered-by map.
//!
//! All arithmetic is integer-only.

pub mod oracle;

pub use oracle::{GraphOracle, Traversal};
