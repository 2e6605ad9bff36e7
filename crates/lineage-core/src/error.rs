//! Error types for the Lineage protocol.
use thiserror::Error;

use crate::types::{Address, IpId};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("node cannot link to itself: {0}")] SelfLink(IpId),
    #[error("empty parent list")] EmptyParents,
    #[error("duplicate parent: {0}")] DuplicateParent(IpId),
    #[error("node already linked: {0}")] AlreadyLinked(IpId),
    #[error("edge {child} -> {parent} would create a cycle")] Cycle { child: IpId, parent: IpId },
    #[error("{ancestor} is not an ancestor of {node}")] NotAnAncestor { node: IpId, ancestor: IpId },
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("parent/percent count mismatch: {parents} parents, {percents} percents")] ParentCountMismatch { parents: usize, percents: usize },
    #[error("too many parents: {count} > {max}")] TooManyParents { count: usize, max: usize },
    #[error("too many ancestors: {count} > {max}")] AncestorsExceeded { count: usize, max: usize },
    #[error("royalty stack exceeded: {stack} > {max}")] RoyaltyStackExceeded { stack: u64, max: u64 },
    #[error("royalty percent out of range: {0}")] PercentOutOfRange(u64),
    #[error("unknown node: {0}")] UnknownNode(IpId),
    #[error("node already initialized: {0}")] AlreadyInitialized(IpId),
    #[error("{ancestor} is not an ancestor of {child}")] NotAnAncestor { child: IpId, ancestor: IpId },
    #[error("share of {child} already collected by {ancestor}")] AlreadyCollected { child: IpId, ancestor: IpId },
    #[error("ancestry of {0} has more than one path")] MultiplePathAncestry(IpId),
    #[error("arithmetic overflow")] ArithmeticOverflow,
    #[error(transparent)] Graph(#[from] GraphError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VaultError {
    #[error("snapshot interval too short: next snapshot at {next_allowed}, now {now}")] IntervalTooShort { next_allowed: u64, now: u64 },
    #[error("nonexistent snapshot: {0}")] NonexistentSnapshot(u64),
    #[error("insufficient shares: have {have}, need {need}")] InsufficientShares { have: u64, need: u64 },
    #[error("ancestor reserve shares cannot be transferred")] ReservedShares,
    #[error("collection of {units} units exceeds unclaimed {unclaimed}")] ExceedsUnclaimed { units: u64, unclaimed: u64 },
    #[error("invalid share allocation: {0}")] InvalidAllocation(String),
    #[error("insufficient revenue: have {have}, need {need}")] InsufficientRevenue { have: u64, need: u64 },
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
    #[error("group has no members")] NoMembers,
    #[error("not a member: {0}")] NotAMember(IpId),
    #[error("insufficient pool balance: have {have}, need {need}")] InsufficientBalance { have: u64, need: u64 },
    #[error("arithmetic overflow")] ArithmeticOverflow,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("insufficient funds for {account}: have {have}, need {need}")] InsufficientFunds { account: Address, have: u64, need: u64 },
    #[error("arithmetic overflow")] ArithmeticOverflow,
}
