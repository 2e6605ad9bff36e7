//! # lineage-vault — Royalty vaults and group reward pools.
//!
//! - [`ShareLedger`]: fixed-supply ownership-share balances with snapshot
//!   checkpoints.
//! - [`RoyaltyVault`]: per-node revenue accounting. Deposits accumulate on
//!   hand, a snapshot splits new revenue between the ancestor reserve and
//!   the holders' claim pool, and holders claim against named snapshots.
//! - [`GroupRewardPool`]: even split of a group's revenue across a dynamic
//!   membership using per-member accumulators and reward debt.
//!
//! Vaults and pools never move revenue themselves. Every outward transfer is
//! returned as a [`Payout`](lineage_core::types::Payout) after the
//! component's own accounting has been committed; the caller executes it.

pub mod group_pool;
pub mod shares;
pub mod vault;

pub use group_pool::{GroupRewardPool, MemberEntry};
pub use shares::ShareLedger;
pub use vault::{RoyaltyVault, SnapshotRecord};
