//! In-memory collaborator implementations.
//!
//! Each type wraps its state in a `parking_lot::RwLock` so it can be shared
//! as `Arc<dyn Trait>` with the module and still be mutated afterwards (a
//! test freezes a node after its vault was built, a registry admits new
//! nodes, and so on).

use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::debug;

use crate::traits::{AccessControl, DisputeStatus, IpRegistry};
use crate::types::{Address, IpId};

/// In-memory registry of known nodes.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    registered: RwLock<HashSet<IpId>>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node. Returns `false` if it was already registered.
    pub fn register(&self, ip: IpId) -> bool {
        let inserted = self.registered.write().insert(ip);
        if inserted {
            debug!(ip = %ip.short(), "registry: node registered");
        }
        inserted
    }

    /// Number of registered nodes.
    pub fn len(&self) -> usize {
        self.registered.read().len()
    }

    /// Whether no nodes are registered.
    pub fn is_empty(&self) -> bool {
        self.registered.read().is_empty()
    }
}

impl IpRegistry for MemoryRegistry {
    fn is_registered(&self, ip: &IpId) -> bool {
        self.registered.read().contains(ip)
    }
}

/// In-memory dispute state.
#[derive(Debug, Default)]
pub struct MemoryDisputes {
    frozen: RwLock<HashSet<IpId>>,
}

impl MemoryDisputes {
    /// Create a dispute set with nothing frozen.
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze a node.
    pub fn freeze(&self, ip: IpId) {
        if self.frozen.write().insert(ip) {
            debug!(ip = %ip.short(), "disputes: node frozen");
        }
    }

    /// Lift a freeze.
    pub fn unfreeze(&self, ip: &IpId) {
        if self.frozen.write().remove(ip) {
            debug!(ip = %ip.short(), "disputes: node unfrozen");
        }
    }
}

impl DisputeStatus for MemoryDisputes {
    fn is_frozen(&self, ip: &IpId) -> bool {
        self.frozen.read().contains(ip)
    }
}

/// In-memory permission table: one controller per node plus any number of
/// explicitly authorized modules.
#[derive(Debug, Default)]
pub struct MemoryAccess {
    controllers: RwLock<HashMap<IpId, Address>>,
    modules: RwLock<HashSet<(IpId, Address)>>,
}

impl MemoryAccess {
    /// Create an empty permission table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or replace) the controller of `ip`.
    pub fn set_controller(&self, ip: IpId, controller: Address) {
        self.controllers.write().insert(ip, controller);
    }

    /// Authorize `module` to act for `ip`.
    pub fn authorize_module(&self, ip: IpId, module: Address) {
        self.modules.write().insert((ip, module));
    }

    /// Revoke a module authorization.
    pub fn revoke_module(&self, ip: &IpId, module: &Address) {
        self.modules.write().remove(&(*ip, *module));
    }

    /// Controller of `ip`, if set.
    pub fn controller(&self, ip: &IpId) -> Option<Address> {
        self.controllers.read().get(ip).copied()
    }
}

impl AccessControl for MemoryAccess {
    fn is_authorized(&self, ip: &IpId, caller: &Address) -> bool {
        if self.controllers.read().get(ip) == Some(caller) {
            return true;
        }
        self.modules.read().contains(&(*ip, *caller))
    }
}

/// Access control that admits every caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAccess;

impl AccessControl for OpenAccess {
    fn is_authorized(&self, _ip: &IpId, _caller: &Address) -> bool {
        true
    }
}
