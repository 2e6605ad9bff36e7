//! Shared fixtures for the integration tests.

use std::sync::Arc;

use lineage_core::collaborators::{MemoryAccess, MemoryDisputes, MemoryRegistry};
use lineage_core::types::{Address, IpId, TokenId};
use lineage_module::{Collaborators, RoyaltyConfig, RoyaltyModule};

/// Default snapshot interval, in seconds.
pub const WEEK: u64 = 7 * 24 * 3600;

/// Node id from a readable label.
pub fn ip(label: &str) -> IpId {
    IpId::from_label(label)
}

/// External account from a readable label.
pub fn acct(label: &str) -> Address {
    Address::from_label(label)
}

/// The node's own account, which holds its initial shares.
pub fn node_account(label: &str) -> Address {
    Address::from(ip(label))
}

pub fn usd() -> TokenId {
    TokenId::from_label("usd")
}

pub fn eur() -> TokenId {
    TokenId::from_label("eur")
}

/// Operator account used as caller under open access.
pub fn operator() -> Address {
    acct("operator")
}

/// A module with permissive collaborators.
pub fn open_module() -> RoyaltyModule {
    RoyaltyModule::new(RoyaltyConfig::default(), Collaborators::open())
        .expect("default config is valid")
}

/// A module wired to in-memory collaborators the test can mutate.
pub struct Harness {
    pub module: RoyaltyModule,
    pub registry: Arc<MemoryRegistry>,
    pub disputes: Arc<MemoryDisputes>,
    pub access: Arc<MemoryAccess>,
}

impl Harness {
    pub fn new() -> Self {
        let registry = Arc::new(MemoryRegistry::new());
        let disputes = Arc::new(MemoryDisputes::new());
        let access = Arc::new(MemoryAccess::new());
        let collaborators = Collaborators {
            registry: registry.clone(),
            disputes: disputes.clone(),
            access: access.clone(),
            hook: None,
        };
        let module = RoyaltyModule::new(RoyaltyConfig::default(), collaborators)
            .expect("default config is valid");
        Self {
            module,
            registry,
            disputes,
            access,
        }
    }

    /// Register `label` with the identity registry and make `controller`
    /// its controller.
    pub fn enroll(&self, label: &str, controller: Address) -> IpId {
        let id = ip(label);
        self.registry.register(id);
        self.access.set_controller(id, controller);
        id
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

/// Roots `a` and `b`, and `c` stack-linked to both at 10% and 15%.
pub fn reserve_split_module() -> RoyaltyModule {
    let mut m = open_module();
    let op = operator();
    m.register_root(op, ip("a"), 0).expect("root a");
    m.register_root(op, ip("b"), 0).expect("root b");
    m.link_to_parents(op, ip("c"), &[ip("a"), ip("b")], &[10_000_000, 15_000_000], 0)
        .expect("link c");
    m
}
