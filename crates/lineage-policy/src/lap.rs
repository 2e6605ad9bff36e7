//! Additive ancestor-stack policy.
//!
//! When a child links to its parents, the policy checks the link against the
//! configured bounds, writes the edges to the oracle and caches the child's
//! royalty stack together with each ancestor's contribution to it. The
//! child's vault later reserves exactly `royalty_stack` share units; each
//! ancestor collects its contribution once.
//!
//! Rules:
//! 1. `1 <= parents <= max_parents`, one percent per parent, each percent
//!    at most 100%.
//! 2. `sum(percents) + sum(royalty_stack(parent)) <= max_royalty_stack`.
//! 3. The resulting ancestor closure has at most `max_ancestors` nodes.
//! 4. Each ancestor collects at most once.

use std::collections::{BTreeSet, HashMap, HashSet};

use lineage_core::constants::{MAX_ANCESTORS, MAX_PARENTS, MAX_ROYALTY_STACK, PERCENT_DENOMINATOR};
use lineage_core::error::{GraphError, PolicyError};
use lineage_core::types::IpId;
use lineage_graph::GraphOracle;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Bounds enforced on every stack link.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackLimits {
    /// Maximum number of direct parents.
    pub max_parents: usize,
    /// Maximum size of the ancestor closure.
    pub max_ancestors: usize,
    /// Maximum royalty stack.
    pub max_royalty_stack: u64,
}

impl Default for StackLimits {
    fn default() -> Self {
        Self {
            max_parents: MAX_PARENTS,
            max_ancestors: MAX_ANCESTORS,
            max_royalty_stack: MAX_ROYALTY_STACK,
        }
    }
}

/// Royalty data cached for a node at link time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoyaltyData {
    /// Additive royalty stack of the node.
    pub royalty_stack: u64,
    /// Ancestors and their share-unit contribution, in discovery order.
    pub ancestors: Vec<(IpId, u64)>,
    /// Ancestors that have already collected.
    collected: BTreeSet<IpId>,
}

impl RoyaltyData {
    /// Contribution of `ancestor`, if it is one.
    pub fn contribution(&self, ancestor: &IpId) -> Option<u64> {
        self.ancestors
            .iter()
            .find(|(a, _)| a == ancestor)
            .map(|(_, units)| *units)
    }

    /// Whether `ancestor` has collected its share.
    pub fn is_collected(&self, ancestor: &IpId) -> bool {
        self.collected.contains(ancestor)
    }

    /// Number of ancestors that have collected.
    pub fn collected_count(&self) -> usize {
        self.collected.len()
    }
}

/// Outcome of a successful stack link, consumed when building the vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackLink {
    /// Royalty stack of the new child.
    pub royalty_stack: u64,
    /// Ancestors and their contribution, summing to `royalty_stack`.
    pub ancestors: Vec<(IpId, u64)>,
}

/// The additive ancestor-stack policy.
#[derive(Debug, Clone, Default)]
pub struct AncestorStackPolicy {
    limits: StackLimits,
    data: HashMap<IpId, RoyaltyData>,
}

impl AncestorStackPolicy {
    /// Create a policy with the given limits.
    pub fn new(limits: StackLimits) -> Self {
        Self {
            limits,
            data: HashMap::new(),
        }
    }

    /// The configured limits.
    pub fn limits(&self) -> StackLimits {
        self.limits
    }

    /// Record a root node: empty stack, no ancestors.
    pub fn on_root(&mut self, node: IpId) -> Result<(), PolicyError> {
        if self.data.contains_key(&node) {
            return Err(PolicyError::AlreadyInitialized(node));
        }
        self.data.insert(node, RoyaltyData::default());
        debug!(node = %node.short(), "lap: root recorded");
        Ok(())
    }

    /// Validate and apply a stack link of `child` to `parents`.
    ///
    /// On success the edges are written to `oracle` and the child's royalty
    /// data is cached. On any error neither the oracle nor the policy
    /// changes.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::AlreadyInitialized`] if `child` already has data
    /// - [`PolicyError::ParentCountMismatch`] if the slices differ in length
    /// - [`PolicyError::TooManyParents`], [`PolicyError::PercentOutOfRange`]
    /// - [`PolicyError::RoyaltyStackExceeded`], [`PolicyError::AncestorsExceeded`]
    /// - [`PolicyError::Graph`] for structural errors (empty, duplicate,
    ///   self link, cycle)
    pub fn on_link_to_parents(
        &mut self,
        oracle: &mut GraphOracle,
        child: IpId,
        parents: &[IpId],
        percents: &[u64],
    ) -> Result<StackLink, PolicyError> {
        if self.data.contains_key(&child) {
            return Err(PolicyError::AlreadyInitialized(child));
        }
        if parents.len() != percents.len() {
            return Err(PolicyError::ParentCountMismatch {
                parents: parents.len(),
                percents: percents.len(),
            });
        }
        if parents.is_empty() {
            return Err(GraphError::EmptyParents.into());
        }
        if parents.len() > self.limits.max_parents {
            return Err(PolicyError::TooManyParents {
                count: parents.len(),
                max: self.limits.max_parents,
            });
        }
        if let Some(bad) = percents.iter().find(|p| **p > PERCENT_DENOMINATOR) {
            return Err(PolicyError::PercentOutOfRange(*bad));
        }

        let mut stack_bound: u64 = 0;
        for (parent, percent) in parents.iter().zip(percents) {
            stack_bound = stack_bound
                .checked_add(*percent)
                .and_then(|s| s.checked_add(oracle.royalty_stack(parent)))
                .ok_or(PolicyError::ArithmeticOverflow)?;
        }
        if stack_bound > self.limits.max_royalty_stack {
            return Err(PolicyError::RoyaltyStackExceeded {
                stack: stack_bound,
                max: self.limits.max_royalty_stack,
            });
        }

        let mut closure: HashSet<IpId> = HashSet::new();
        for parent in parents {
            closure.insert(*parent);
            closure.extend(oracle.ancestors(parent));
        }
        if closure.len() > self.limits.max_ancestors {
            return Err(PolicyError::AncestorsExceeded {
                count: closure.len(),
                max: self.limits.max_ancestors,
            });
        }

        let pairs: Vec<(IpId, u64)> = parents.iter().copied().zip(percents.iter().copied()).collect();
        oracle.add_edges(child, &pairs)?;

        let royalty_stack = oracle.royalty_stack(&child);
        let ancestors = oracle.stack_contributions(&child);
        self.data.insert(
            child,
            RoyaltyData {
                royalty_stack,
                ancestors: ancestors.clone(),
                collected: BTreeSet::new(),
            },
        );

        info!(
            child = %child.short(),
            parents = parents.len(),
            ancestors = ancestors.len(),
            royalty_stack,
            "lap: linked to parents"
        );
        Ok(StackLink {
            royalty_stack,
            ancestors,
        })
    }

    /// Share units `ancestor` may collect from `child`.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::UnknownNode`] if `child` has no royalty data
    /// - [`PolicyError::NotAnAncestor`] if `ancestor` is not in the list
    /// - [`PolicyError::AlreadyCollected`] on replay
    pub fn pending_collection(&self, child: &IpId, ancestor: &IpId) -> Result<u64, PolicyError> {
        let data = self.data.get(child).ok_or(PolicyError::UnknownNode(*child))?;
        let units = data.contribution(ancestor).ok_or(PolicyError::NotAnAncestor {
            child: *child,
            ancestor: *ancestor,
        })?;
        if data.is_collected(ancestor) {
            return Err(PolicyError::AlreadyCollected {
                child: *child,
                ancestor: *ancestor,
            });
        }
        Ok(units)
    }

    /// Set the collected flag after the vault transfer has been applied.
    ///
    /// Validates like [`pending_collection`](Self::pending_collection) and
    /// returns the collected units.
    pub fn mark_collected(&mut self, child: &IpId, ancestor: &IpId) -> Result<u64, PolicyError> {
        let units = self.pending_collection(child, ancestor)?;
        if let Some(data) = self.data.get_mut(child) {
            data.collected.insert(*ancestor);
        }
        debug!(child = %child.short(), ancestor = %ancestor.short(), units, "lap: ancestor collected");
        Ok(units)
    }

    /// Cached royalty data of `node`.
    pub fn royalty_data(&self, node: &IpId) -> Option<&RoyaltyData> {
        self.data.get(node)
    }

    /// Cached royalty stack of `node` (zero if unknown).
    pub fn royalty_stack(&self, node: &IpId) -> u64 {
        self.data.get(node).map(|d| d.royalty_stack).unwrap_or(0)
    }

    /// Whether `ancestor` has collected from `child`.
    pub fn is_collected(&self, child: &IpId, ancestor: &IpId) -> bool {
        self.data
            .get(child)
            .map(|d| d.is_collected(ancestor))
            .unwrap_or(false)
    }

    /// Whether `node` has been recorded (as root or linked child).
    pub fn contains(&self, node: &IpId) -> bool {
        self.data.contains_key(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ip(seed: u8) -> IpId {
        IpId([seed; 32])
    }

    const PCT_10: u64 = 10_000_000;
    const PCT_15: u64 = 15_000_000;

    fn setup() -> (AncestorStackPolicy, GraphOracle) {
        let mut policy = AncestorStackPolicy::new(StackLimits::default());
        for seed in 1..=3 {
            policy.on_root(ip(seed)).unwrap();
        }
        (policy, GraphOracle::new())
    }

    // ------------------------------------------------------------------
    // Linking
    // ------------------------------------------------------------------

    #[test]
    fn root_twice_rejected() {
        let (mut policy, _) = setup();
        assert_eq!(policy.on_root(ip(1)), Err(PolicyError::AlreadyInitialized(ip(1))));
    }

    #[test]
    fn two_parent_link_records_contributions() {
        let (mut policy, mut oracle) = setup();
        let link = policy
            .on_link_to_parents(&mut oracle, ip(10), &[ip(1), ip(2)], &[PCT_10, PCT_15])
            .unwrap();
        assert_eq!(link.royalty_stack, PCT_10 + PCT_15);
        assert_eq!(link.ancestors, vec![(ip(1), PCT_10), (ip(2), PCT_15)]);
        assert_eq!(policy.royalty_stack(&ip(10)), PCT_10 + PCT_15);
        assert!(oracle.has_ancestor(&ip(10), &ip(2)));
    }

    #[test]
    fn grandchild_inherits_parent_stack() {
        let (mut policy, mut oracle) = setup();
        policy
            .on_link_to_parents(&mut oracle, ip(10), &[ip(1)], &[PCT_10])
            .unwrap();
        let link = policy
            .on_link_to_parents(&mut oracle, ip(11), &[ip(10)], &[PCT_15])
            .unwrap();
        assert_eq!(link.royalty_stack, PCT_10 + PCT_15);
        assert_eq!(link.ancestors, vec![(ip(10), PCT_15), (ip(1), PCT_10)]);
    }

    #[test]
    fn mismatched_lengths_rejected() {
        let (mut policy, mut oracle) = setup();
        assert_eq!(
            policy.on_link_to_parents(&mut oracle, ip(10), &[ip(1), ip(2)], &[PCT_10]),
            Err(PolicyError::ParentCountMismatch {
                parents: 2,
                percents: 1
            })
        );
    }

    #[test]
    fn empty_parents_rejected() {
        let (mut policy, mut oracle) = setup();
        assert_eq!(
            policy.on_link_to_parents(&mut oracle, ip(10), &[], &[]),
            Err(PolicyError::Graph(GraphError::EmptyParents))
        );
    }

    #[test]
    fn too_many_parents_rejected() {
        let mut policy = AncestorStackPolicy::new(StackLimits {
            max_parents: 1,
            ..StackLimits::default()
        });
        let mut oracle = GraphOracle::new();
        assert_eq!(
            policy.on_link_to_parents(&mut oracle, ip(10), &[ip(1), ip(2)], &[1, 1]),
            Err(PolicyError::TooManyParents { count: 2, max: 1 })
        );
    }

    #[test]
    fn percent_out_of_range_rejected() {
        let (mut policy, mut oracle) = setup();
        assert_eq!(
            policy.on_link_to_parents(&mut oracle, ip(10), &[ip(1)], &[PERCENT_DENOMINATOR + 1]),
            Err(PolicyError::PercentOutOfRange(PERCENT_DENOMINATOR + 1))
        );
    }

    #[test]
    fn stack_exceeded_leaves_state_unchanged() {
        let (mut policy, mut oracle) = setup();
        policy
            .on_link_to_parents(&mut oracle, ip(10), &[ip(1)], &[60_000_000])
            .unwrap();
        let err = policy
            .on_link_to_parents(&mut oracle, ip(11), &[ip(10)], &[50_000_000])
            .unwrap_err();
        assert_eq!(
            err,
            PolicyError::RoyaltyStackExceeded {
                stack: 110_000_000,
                max: MAX_ROYALTY_STACK
            }
        );
        assert!(!oracle.is_linked(&ip(11)));
        assert!(!policy.contains(&ip(11)));
    }

    #[test]
    fn stack_at_exact_cap_allowed() {
        let (mut policy, mut oracle) = setup();
        let link = policy
            .on_link_to_parents(&mut oracle, ip(10), &[ip(1)], &[MAX_ROYALTY_STACK])
            .unwrap();
        assert_eq!(link.royalty_stack, MAX_ROYALTY_STACK);
    }

    #[test]
    fn ancestors_exceeded_rejected() {
        let mut policy = AncestorStackPolicy::new(StackLimits {
            max_ancestors: 2,
            ..StackLimits::default()
        });
        let mut oracle = GraphOracle::new();
        policy.on_root(ip(1)).unwrap();
        policy.on_link_to_parents(&mut oracle, ip(2), &[ip(1)], &[1]).unwrap();
        policy.on_link_to_parents(&mut oracle, ip(3), &[ip(2)], &[1]).unwrap();
        assert_eq!(
            policy.on_link_to_parents(&mut oracle, ip(4), &[ip(3)], &[1]),
            Err(PolicyError::AncestorsExceeded { count: 3, max: 2 })
        );
        assert!(!oracle.is_linked(&ip(4)));
    }

    #[test]
    fn relink_rejected() {
        let (mut policy, mut oracle) = setup();
        policy
            .on_link_to_parents(&mut oracle, ip(10), &[ip(1)], &[PCT_10])
            .unwrap();
        assert_eq!(
            policy.on_link_to_parents(&mut oracle, ip(10), &[ip(2)], &[PCT_10]),
            Err(PolicyError::AlreadyInitialized(ip(10)))
        );
    }

    #[test]
    fn graph_error_propagates_without_policy_state() {
        let (mut policy, mut oracle) = setup();
        let err = policy
            .on_link_to_parents(&mut oracle, ip(10), &[ip(1), ip(1)], &[1, 1])
            .unwrap_err();
        assert_eq!(err, PolicyError::Graph(GraphError::DuplicateParent(ip(1))));
        assert!(!policy.contains(&ip(10)));
    }

    // ------------------------------------------------------------------
    // Collection bookkeeping
    // ------------------------------------------------------------------

    #[test]
    fn collect_once() {
        let (mut policy, mut oracle) = setup();
        policy
            .on_link_to_parents(&mut oracle, ip(10), &[ip(1), ip(2)], &[PCT_10, PCT_15])
            .unwrap();
        assert_eq!(policy.pending_collection(&ip(10), &ip(1)), Ok(PCT_10));
        assert_eq!(policy.mark_collected(&ip(10), &ip(1)), Ok(PCT_10));
        assert!(policy.is_collected(&ip(10), &ip(1)));
        assert_eq!(
            policy.mark_collected(&ip(10), &ip(1)),
            Err(PolicyError::AlreadyCollected {
                child: ip(10),
                ancestor: ip(1)
            })
        );
        assert_eq!(policy.royalty_data(&ip(10)).unwrap().collected_count(), 1);
    }

    #[test]
    fn collect_by_non_ancestor_rejected() {
        let (mut policy, mut oracle) = setup();
        policy
            .on_link_to_parents(&mut oracle, ip(10), &[ip(1)], &[PCT_10])
            .unwrap();
        assert_eq!(
            policy.pending_collection(&ip(10), &ip(3)),
            Err(PolicyError::NotAnAncestor {
                child: ip(10),
                ancestor: ip(3)
            })
        );
    }

    #[test]
    fn collect_unknown_child_rejected() {
        let (policy, _) = setup();
        assert_eq!(
            policy.pending_collection(&ip(99), &ip(1)),
            Err(PolicyError::UnknownNode(ip(99)))
        );
    }

    proptest! {
        #[test]
        fn accepted_links_respect_bounds(
            percents in prop::collection::vec(0u64..=40_000_000, 1..6),
        ) {
            let mut policy = AncestorStackPolicy::new(StackLimits::default());
            let mut oracle = GraphOracle::new();
            policy.on_root(ip(1)).unwrap();
            // Chain: each new node links to the previous one.
            for (i, pct) in percents.iter().enumerate() {
                let child = ip(i as u8 + 2);
                let parent = ip(i as u8 + 1);
                let _ = policy.on_link_to_parents(&mut oracle, child, &[parent], &[*pct]);
            }
            for seed in 1..=(percents.len() as u8 + 1) {
                let node = ip(seed);
                prop_assert!(oracle.royalty_stack(&node) <= MAX_ROYALTY_STACK);
                prop_assert!(oracle.ancestor_count(&node) <= MAX_ANCESTORS);
            }
        }
    }
}
