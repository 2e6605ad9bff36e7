//! Collaborator interfaces consumed by the Lineage core.
//!
//! The core never owns identity, dispute or permission state. It asks:
//! - [`IpRegistry`]: is this node registered?
//! - [`DisputeStatus`]: is this node frozen by a dispute?
//! - [`AccessControl`]: may this caller mutate this node?
//! - [`PayoutHook`]: observer notified of every outward transfer to an
//!   external account.

use crate::types::{Address, IpId, Payout};

/// Read-only view of the IP identity registry.
pub trait IpRegistry: Send + Sync {
    /// Whether `ip` is a registered node.
    fn is_registered(&self, ip: &IpId) -> bool;
}

/// Read-only view of the dispute collaborator.
///
/// A frozen node forfeits unclaimed revenue (claims compute to zero) and
/// cannot be linked or collected from.
pub trait DisputeStatus: Send + Sync {
    /// Whether `ip` is currently frozen.
    fn is_frozen(&self, ip: &IpId) -> bool;
}

/// Permission check for mutating entry points.
pub trait AccessControl: Send + Sync {
    /// Whether `caller` is the registered controller of `ip` or a module
    /// explicitly authorized for it.
    fn is_authorized(&self, ip: &IpId, caller: &Address) -> bool;
}

/// Observer for revenue leaving the protocol to an external account.
///
/// Called after the paying component has committed its accounting. An
/// implementation may call back into the protocol; the module rejects such
/// recursive entry.
pub trait PayoutHook: Send + Sync {
    /// A payout has been credited to `payout.to` on the external ledger.
    fn on_payout(&self, payout: &Payout);
}

/// Registry that accepts every node.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenRegistry;

impl IpRegistry for OpenRegistry {
    fn is_registered(&self, _ip: &IpId) -> bool {
        true
    }
}

/// Dispute collaborator with no disputes.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDisputes;

impl DisputeStatus for NoDisputes {
    fn is_frozen(&self, _ip: &IpId) -> bool {
        false
    }
}
