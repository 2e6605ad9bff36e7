//! Multiplicative path-decay policy.
//!
//! A child links to exactly one parent with a royalty percent `p`. The
//! parent is settled `p` share units of the child and every ancestor `a` of
//! the parent is settled `p * path_royalty(parent, a) / PERCENT_DENOMINATOR`
//! units, so the royalty owed to an ancestor dilutes with each hop.
//! Settlement is immediate: there is no reserve and nothing to collect.
//!
//! The parent's own ancestry must be single-path, which is what makes the
//! path royalty to each ancestor well defined.

use std::collections::HashMap;

use lineage_core::constants::{MAX_ROYALTY_STACK, PERCENT_DENOMINATOR};
use lineage_core::error::PolicyError;
use lineage_core::math::apply_percent;
use lineage_core::types::IpId;
use lineage_graph::GraphOracle;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Share units of the child transferred to one ancestor's vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    /// Receiving ancestor.
    pub ancestor: IpId,
    /// Share units of the child.
    pub units: u64,
}

/// A recorded path link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLink {
    /// The single parent.
    pub parent: IpId,
    /// Percent owed to the parent.
    pub royalty_percent: u64,
    /// Link-time settlements, parent first, then ancestors in discovery
    /// order. Zero-unit entries are omitted.
    pub settlements: Vec<Settlement>,
}

impl PathLink {
    /// Sum of all settled units.
    pub fn total_units(&self) -> u64 {
        self.settlements.iter().map(|s| s.units).sum()
    }
}

/// The multiplicative path-decay policy.
#[derive(Debug, Clone)]
pub struct PathDecayPolicy {
    max_royalty_stack: u64,
    links: HashMap<IpId, PathLink>,
}

impl Default for PathDecayPolicy {
    fn default() -> Self {
        Self::new(MAX_ROYALTY_STACK)
    }
}

impl PathDecayPolicy {
    /// Create a policy capping total settlement at `max_royalty_stack`.
    pub fn new(max_royalty_stack: u64) -> Self {
        Self {
            max_royalty_stack,
            links: HashMap::new(),
        }
    }

    /// Compute the settlements for linking a child to `parent` at
    /// `royalty_percent`, without changing anything.
    pub fn preview(
        &self,
        oracle: &GraphOracle,
        parent: &IpId,
        royalty_percent: u64,
    ) -> Result<Vec<Settlement>, PolicyError> {
        if royalty_percent > PERCENT_DENOMINATOR {
            return Err(PolicyError::PercentOutOfRange(royalty_percent));
        }
        if !oracle.is_single_path(parent) {
            return Err(PolicyError::MultiplePathAncestry(*parent));
        }

        let mut settlements = Vec::new();
        if royalty_percent > 0 {
            settlements.push(Settlement {
                ancestor: *parent,
                units: royalty_percent,
            });
        }
        for ancestor in oracle.ancestors(parent) {
            let path = oracle.path_royalty(parent, &ancestor)?;
            let units = apply_percent(royalty_percent, path).ok_or(PolicyError::ArithmeticOverflow)?;
            if units > 0 {
                settlements.push(Settlement { ancestor, units });
            }
        }

        let total = settlements
            .iter()
            .try_fold(0u64, |acc, s| acc.checked_add(s.units))
            .ok_or(PolicyError::ArithmeticOverflow)?;
        if total > self.max_royalty_stack {
            return Err(PolicyError::RoyaltyStackExceeded {
                stack: total,
                max: self.max_royalty_stack,
            });
        }
        Ok(settlements)
    }

    /// Validate and apply a path link of `child` to its single `parent`.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::AlreadyInitialized`] if `child` is already linked
    /// - [`PolicyError::PercentOutOfRange`]
    /// - [`PolicyError::MultiplePathAncestry`] if the parent's ancestry
    ///   branches
    /// - [`PolicyError::RoyaltyStackExceeded`] if total settlement exceeds
    ///   the cap
    /// - [`PolicyError::Graph`] for structural errors (self link, cycle)
    pub fn on_link_to_parent(
        &mut self,
        oracle: &mut GraphOracle,
        child: IpId,
        parent: IpId,
        royalty_percent: u64,
    ) -> Result<PathLink, PolicyError> {
        if self.links.contains_key(&child) {
            return Err(PolicyError::AlreadyInitialized(child));
        }
        let settlements = self.preview(oracle, &parent, royalty_percent)?;
        oracle.add_path_edge(child, parent, royalty_percent)?;

        let link = PathLink {
            parent,
            royalty_percent,
            settlements,
        };
        for s in &link.settlements {
            debug!(child = %child.short(), ancestor = %s.ancestor.short(), units = s.units, "lrp: settlement");
        }
        info!(
            child = %child.short(),
            parent = %parent.short(),
            royalty_percent,
            settled = link.total_units(),
            "lrp: linked to parent"
        );
        self.links.insert(child, link.clone());
        Ok(link)
    }

    /// The recorded link of `child`.
    pub fn link(&self, child: &IpId) -> Option<&PathLink> {
        self.links.get(child)
    }

    /// Total share units `child` settled upstream (zero if unknown).
    pub fn settled_units(&self, child: &IpId) -> u64 {
        self.links.get(child).map(PathLink::total_units).unwrap_or(0)
    }
}
