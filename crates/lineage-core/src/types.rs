//! Core protocol types: node, account and token identifiers, graph edges
//! and outward revenue transfers.
//!
//! All share and revenue amounts are `u64` integer units.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::{LABEL_DOMAIN, POOL_ADDRESS_DOMAIN, VAULT_ADDRESS_DOMAIN};

/// BLAKE3 of `domain || payload`, used for every derived identifier.
fn derive_bytes(domain: &[u8], payload: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(domain);
    hasher.update(payload);
    hasher.finalize().into()
}

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Default,
        )]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// The all-zero identifier.
            pub const ZERO: Self = Self([0u8; 32]);

            /// Return the underlying bytes.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }

            /// Check if this is the all-zero identifier.
            pub fn is_zero(&self) -> bool {
                self.0 == [0u8; 32]
            }

            /// Deterministic identifier derived from a human-readable label.
            ///
            /// Used by scenario files and tests to name nodes and accounts.
            pub fn from_label(label: &str) -> Self {
                Self(derive_bytes(LABEL_DOMAIN, label.as_bytes()))
            }

            /// Short hex prefix for log output.
            pub fn short(&self) -> String {
                hex::encode(&self.0[..4])
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }
    };
}

id_type!(
    /// Identifier of an IP node in the derivative graph.
    IpId
);

id_type!(
    /// Account identifier: share holders, callers, vaults and pools.
    Address
);

id_type!(
    /// Identifier of a revenue token accepted by vaults and pools.
    TokenId
);

impl From<IpId> for Address {
    /// The node's own account. This is where a node's ownership shares
    /// are minted and where its claims are paid.
    fn from(ip: IpId) -> Self {
        Address(ip.0)
    }
}

/// Address of the royalty vault owned by `ip`.
pub fn vault_address(ip: &IpId) -> Address {
    Address(derive_bytes(VAULT_ADDRESS_DOMAIN, ip.as_bytes()))
}

/// Address of the reward pool owned by the group node `group`.
pub fn pool_address(group: &IpId) -> Address {
    Address(derive_bytes(POOL_ADDRESS_DOMAIN, group.as_bytes()))
}

/// A parent edge: `child` owes `royalty_percent` of its revenue to `parent`.
///
/// `royalty_percent` is fixed-point with [`PERCENT_DENOMINATOR`](crate::constants::PERCENT_DENOMINATOR) = 100%.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    /// The licensing (derivative) node.
    pub child: IpId,
    /// The licensed (upstream) node.
    pub parent: IpId,
    /// Royalty owed along this edge.
    pub royalty_percent: u64,
}

impl Edge {
    /// Create a new edge.
    pub fn new(child: IpId, parent: IpId, royalty_percent: u64) -> Self {
        Self {
            child,
            parent,
            royalty_percent,
        }
    }
}

/// The parent edges recorded for a linked node.
///
/// A node linked under the path-decay policy carries exactly one edge, so a
/// path from any node through `Path` links to an ancestor is unique.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Parentage {
    /// Additive stack link: one or more parents.
    Stack(Vec<Edge>),
    /// Multiplicative path link: exactly one parent.
    Path(Edge),
}

impl Parentage {
    /// The parent edges as a slice.
    pub fn edges(&self) -> &[Edge] {
        match self {
            Self::Stack(edges) => edges,
            Self::Path(edge) => std::slice::from_ref(edge),
        }
    }

    /// Number of parent edges.
    pub fn len(&self) -> usize {
        self.edges().len()
    }

    /// Whether there are no parent edges.
    pub fn is_empty(&self) -> bool {
        self.edges().is_empty()
    }
}

/// An outward revenue-token transfer.
///
/// Vaults and pools emit payouts only after their own accounting for the
/// transfer has been committed.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct Payout {
    /// Paying vault or pool.
    pub from: Address,
    /// Recipient account, vault or pool.
    pub to: Address,
    /// Revenue token being moved.
    pub token: TokenId,
    /// Amount in token units.
    pub amount: u64,
}

impl fmt::Display for Payout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} -> {} : {} of {}",
            self.from.short(),
            self.to.short(),
            self.amount,
            self.token.short()
        )
    }
}
