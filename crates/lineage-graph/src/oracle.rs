//! In-memory graph royalty oracle.
//!
//! Edges are written once, when a child links to its parents, and never
//! change afterwards. Every query runs a fresh breadth-first traversal from
//! the queried node over parent edges; nothing about a traversal outlives
//! the call that started it.

use std::collections::{HashMap, HashSet, VecDeque};

use lineage_core::error::GraphError;
use lineage_core::math::compound_percents;
use lineage_core::types::{Edge, IpId, Parentage};
use tracing::debug;

/// Result of one breadth-first traversal from a node over parent edges.
#[derive(Debug, Clone, Default)]
pub struct Traversal {
    /// Ancestors in discovery order (the start node is excluded).
    pub order: Vec<IpId>,
    /// For each discovered ancestor, the node whose parent edge reached it
    /// first.
    pub discovered_by: HashMap<IpId, IpId>,
    /// Every edge of the ancestor closure, each exactly once.
    pub edges: Vec<Edge>,
}

impl Traversal {
    /// Whether `ip` was discovered as an ancestor.
    pub fn contains(&self, ip: &IpId) -> bool {
        self.discovered_by.contains_key(ip)
    }
}

/// Parent-edge store with ancestry queries.
#[derive(Debug, Clone, Default)]
pub struct GraphOracle {
    /// Linked child -> its parent edges.
    links: HashMap<IpId, Parentage>,
    /// Parent -> children that link to it, in link order.
    children: HashMap<IpId, Vec<IpId>>,
}

impl GraphOracle {
    /// Create an empty oracle.
    pub fn new() -> Self {
        Self::default()
    }

    // ------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------

    /// Link `child` to one or more parents under the additive stack policy.
    ///
    /// `parents` holds `(parent, royalty_percent)` pairs.
    ///
    /// # Errors
    ///
    /// - [`GraphError::EmptyParents`] if `parents` is empty
    /// - [`GraphError::AlreadyLinked`] if `child` already has parent edges
    /// - [`GraphError::SelfLink`] if a parent is the child itself
    /// - [`GraphError::DuplicateParent`] if a parent appears twice
    /// - [`GraphError::Cycle`] if `child` is already an ancestor of a parent
    pub fn add_edges(&mut self, child: IpId, parents: &[(IpId, u64)]) -> Result<(), GraphError> {
        if parents.is_empty() {
            return Err(GraphError::EmptyParents);
        }
        let mut seen = HashSet::with_capacity(parents.len());
        for (parent, _) in parents {
            if !seen.insert(*parent) {
                return Err(GraphError::DuplicateParent(*parent));
            }
        }
        for (parent, _) in parents {
            self.check_new_edge(child, *parent)?;
        }

        let edges: Vec<Edge> = parents
            .iter()
            .map(|(parent, percent)| Edge::new(child, *parent, *percent))
            .collect();
        self.insert_links(child, Parentage::Stack(edges));
        Ok(())
    }

    /// Link `child` to exactly one parent under the path policy.
    ///
    /// # Errors
    ///
    /// Same as [`add_edges`](Self::add_edges) for a single parent.
    pub fn add_path_edge(&mut self, child: IpId, parent: IpId, royalty_percent: u64) -> Result<(), GraphError> {
        self.check_new_edge(child, parent)?;
        self.insert_links(child, Parentage::Path(Edge::new(child, parent, royalty_percent)));
        Ok(())
    }

    fn check_new_edge(&self, child: IpId, parent: IpId) -> Result<(), GraphError> {
        if self.links.contains_key(&child) {
            return Err(GraphError::AlreadyLinked(child));
        }
        if parent == child {
            return Err(GraphError::SelfLink(child));
        }
        if self.has_ancestor(&parent, &child) {
            return Err(GraphError::Cycle { child, parent });
        }
        Ok(())
    }

    fn insert_links(&mut self, child: IpId, parentage: Parentage) {
        for edge in parentage.edges() {
            self.children.entry(edge.parent).or_default().push(child);
            debug!(
                child = %child.short(),
                parent = %edge.parent.short(),
                percent = edge.royalty_percent,
                "oracle: edge added"
            );
        }
        self.links.insert(child, parentage);
    }

    // ------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------

    /// Parent edges recorded for `node`, if it has been linked.
    pub fn parentage(&self, node: &IpId) -> Option<&Parentage> {
        self.links.get(node)
    }

    /// Parent edges of `node`; empty for roots and unknown nodes.
    pub fn parents(&self, node: &IpId) -> &[Edge] {
        self.links.get(node).map(Parentage::edges).unwrap_or(&[])
    }

    /// Children that link directly to `node`.
    pub fn children(&self, node: &IpId) -> &[IpId] {
        self.children.get(node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The edge `child -> parent`, if it exists.
    pub fn edge(&self, child: &IpId, parent: &IpId) -> Option<&Edge> {
        self.parents(child).iter().find(|e| e.parent == *parent)
    }

    /// Whether `node` has been linked to parents.
    pub fn is_linked(&self, node: &IpId) -> bool {
        self.links.contains_key(node)
    }

    /// Breadth-first traversal of the ancestor closure of `node`.
    pub fn traverse(&self, node: &IpId) -> Traversal {
        let mut out = Traversal::default();
        let mut visited: HashSet<IpId> = HashSet::from([*node]);
        let mut queue: VecDeque<IpId> = VecDeque::from([*node]);

        while let Some(current) = queue.pop_front() {
            for edge in self.parents(&current) {
                out.edges.push(*edge);
                if visited.insert(edge.parent) {
                    out.discovered_by.insert(edge.parent, current);
                    out.order.push(edge.parent);
                    queue.push_back(edge.parent);
                }
            }
        }
        out
    }

    /// Whether `candidate` is reachable from `node` over parent edges.
    pub fn has_ancestor(&self, node: &IpId, candidate: &IpId) -> bool {
        if node == candidate {
            return false;
        }
        self.traverse(node).contains(candidate)
    }

    /// Ancestors of `node` in breadth-first discovery order.
    pub fn ancestors(&self, node: &IpId) -> Vec<IpId> {
        self.traverse(node).order
    }

    /// Size of the ancestor closure of `node`.
    pub fn ancestor_count(&self, node: &IpId) -> usize {
        self.traverse(node).order.len()
    }

    /// Additive royalty stack: sum of every closure edge's percentage,
    /// counting each edge once.
    pub fn royalty_stack(&self, node: &IpId) -> u64 {
        self.traverse(node)
            .edges
            .iter()
            .fold(0u64, |acc, e| acc.saturating_add(e.royalty_percent))
    }

    /// Per-ancestor breakdown of [`royalty_stack`](Self::royalty_stack).
    ///
    /// An ancestor's contribution is the sum of the closure edges that point
    /// at it. Entries follow discovery order and sum to the stack.
    pub fn stack_contributions(&self, node: &IpId) -> Vec<(IpId, u64)> {
        let traversal = self.traverse(node);
        let mut totals: HashMap<IpId, u64> = HashMap::with_capacity(traversal.order.len());
        for edge in &traversal.edges {
            let entry = totals.entry(edge.parent).or_insert(0);
            *entry = entry.saturating_add(edge.royalty_percent);
        }
        traversal
            .order
            .iter()
            .map(|ancestor| (*ancestor, totals.get(ancestor).copied().unwrap_or(0)))
            .collect()
    }

    /// Multiplicative royalty from `node` to `ancestor` along the path the
    /// traversal discovered first.
    ///
    /// For a chain `A <- B <- C` with edge percentages `p1` (B to A) and
    /// `p2` (C to B), `path_royalty(C, A) == p1 * p2 / PERCENT_DENOMINATOR`.
    ///
    /// # Errors
    ///
    /// - [`GraphError::NotAnAncestor`] if `ancestor` is not reachable
    pub fn path_royalty(&self, node: &IpId, ancestor: &IpId) -> Result<u64, GraphError> {
        let traversal = self.traverse(node);
        let path = self.reconstruct_path(node, ancestor, &traversal)?;
        compound_percents(path.iter().map(|e| e.royalty_percent)).ok_or(GraphError::ArithmeticOverflow)
    }

    /// Edges from `node` up to `ancestor`, walking the discovered-by map
    /// backwards from the ancestor. Returned in ancestor-to-node order.
    fn reconstruct_path(
        &self,
        node: &IpId,
        ancestor: &IpId,
        traversal: &Traversal,
    ) -> Result<Vec<Edge>, GraphError> {
        let not_found = || GraphError::NotAnAncestor {
            node: *node,
            ancestor: *ancestor,
        };
        if !traversal.contains(ancestor) {
            return Err(not_found());
        }

        let mut path = Vec::new();
        let mut current = *ancestor;
        while current != *node {
            let child = *traversal.discovered_by.get(&current).ok_or_else(not_found)?;
            let edge = self.edge(&child, &current).ok_or_else(not_found)?;
            path.push(*edge);
            current = child;
        }
        Ok(path)
    }

    /// Whether every node in the closure of `node` (itself included) has at
    /// most one parent edge, i.e. every ancestor is reached by one path.
    pub fn is_single_path(&self, node: &IpId) -> bool {
        if self.parents(node).len() > 1 {
            return false;
        }
        self.traverse(node)
            .order
            .iter()
            .all(|ancestor| self.parents(ancestor).len() <= 1)
    }

    /// Number of linked nodes.
    pub fn linked_count(&self) -> usize {
        self.links.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::constants::PERCENT_DENOMINATOR;
    use proptest::prelude::*;

    fn ip(seed: u8) -> IpId {
        IpId([seed; 32])
    }

    const PCT_10: u64 = 10_000_000;
    const PCT_15: u64 = 15_000_000;
    const PCT_20: u64 = 20_000_000;

    /// Diamond: D links to B and C, both of which link to A.
    fn diamond() -> GraphOracle {
        let mut g = GraphOracle::new();
        g.add_edges(ip(2), &[(ip(1), PCT_10)]).unwrap(); // B -> A
        g.add_edges(ip(3), &[(ip(1), PCT_15)]).unwrap(); // C -> A
        g.add_edges(ip(4), &[(ip(2), PCT_20), (ip(3), PCT_10)]).unwrap(); // D -> B, C
        g
    }

    // --- writes ---

    #[test]
    fn add_edges_rejects_empty() {
        let mut g = GraphOracle::new();
        assert_eq!(g.add_edges(ip(1), &[]), Err(GraphError::EmptyParents));
    }

    #[test]
    fn add_edges_rejects_self_link() {
        let mut g = GraphOracle::new();
        assert_eq!(
            g.add_edges(ip(1), &[(ip(1), PCT_10)]),
            Err(GraphError::SelfLink(ip(1)))
        );
    }

    #[test]
    fn add_edges_rejects_duplicate_parent() {
        let mut g = GraphOracle::new();
        assert_eq!(
            g.add_edges(ip(2), &[(ip(1), PCT_10), (ip(1), PCT_10)]),
            Err(GraphError::DuplicateParent(ip(1)))
        );
        assert!(!g.is_linked(&ip(2)));
    }

    #[test]
    fn add_edges_rejects_relink() {
        let mut g = GraphOracle::new();
        g.add_edges(ip(2), &[(ip(1), PCT_10)]).unwrap();
        assert_eq!(
            g.add_edges(ip(2), &[(ip(3), PCT_10)]),
            Err(GraphError::AlreadyLinked(ip(2)))
        );
        assert_eq!(
            g.add_path_edge(ip(2), ip(3), PCT_10),
            Err(GraphError::AlreadyLinked(ip(2)))
        );
    }

    #[test]
    fn add_edges_rejects_cycle() {
        let mut g = GraphOracle::new();
        g.add_edges(ip(2), &[(ip(1), PCT_10)]).unwrap();
        g.add_edges(ip(3), &[(ip(2), PCT_10)]).unwrap();
        // 1 -> 3 would close 1 <- 2 <- 3 <- 1
        assert_eq!(
            g.add_edges(ip(1), &[(ip(3), PCT_10)]),
            Err(GraphError::Cycle {
                child: ip(1),
                parent: ip(3)
            })
        );
        assert!(!g.is_linked(&ip(1)));
    }

    #[test]
    fn failed_link_leaves_no_partial_edges() {
        let mut g = GraphOracle::new();
        g.add_edges(ip(2), &[(ip(1), PCT_10)]).unwrap();
        // Second parent is invalid (self link); first must not be recorded.
        assert!(g.add_edges(ip(5), &[(ip(1), PCT_10), (ip(5), PCT_10)]).is_err());
        assert!(!g.is_linked(&ip(5)));
        assert_eq!(g.children(&ip(1)), &[ip(2)]);
    }

    #[test]
    fn children_recorded() {
        let g = diamond();
        assert_eq!(g.children(&ip(1)), &[ip(2), ip(3)]);
        assert_eq!(g.children(&ip(4)), &[] as &[IpId]);
    }

    // --- ancestry ---

    #[test]
    fn root_has_no_ancestors() {
        let g = diamond();
        assert_eq!(g.ancestor_count(&ip(1)), 0);
        assert!(g.ancestors(&ip(1)).is_empty());
        assert_eq!(g.royalty_stack(&ip(1)), 0);
    }

    #[test]
    fn unknown_node_has_no_ancestors() {
        let g = diamond();
        assert_eq!(g.ancestor_count(&ip(99)), 0);
        assert!(!g.has_ancestor(&ip(99), &ip(1)));
    }

    #[test]
    fn diamond_shared_ancestor_visited_once() {
        let g = diamond();
        assert_eq!(g.ancestors(&ip(4)), vec![ip(2), ip(3), ip(1)]);
        assert_eq!(g.ancestor_count(&ip(4)), 3);
    }

    #[test]
    fn has_ancestor_transitive() {
        let g = diamond();
        assert!(g.has_ancestor(&ip(4), &ip(1)));
        assert!(g.has_ancestor(&ip(4), &ip(2)));
        assert!(!g.has_ancestor(&ip(1), &ip(4)));
        assert!(!g.has_ancestor(&ip(4), &ip(4)));
    }

    #[test]
    fn repeated_queries_are_stable() {
        let g = diamond();
        let first = g.royalty_stack(&ip(4));
        for _ in 0..5 {
            assert_eq!(g.royalty_stack(&ip(4)), first);
            assert_eq!(g.ancestor_count(&ip(4)), 3);
        }
    }

    // --- royalty stack ---

    #[test]
    fn stack_counts_each_edge_once() {
        let g = diamond();
        // D->B 20 + D->C 10 + B->A 10 + C->A 15
        assert_eq!(g.royalty_stack(&ip(4)), PCT_20 + PCT_10 + PCT_10 + PCT_15);
    }

    #[test]
    fn contributions_sum_to_stack() {
        let g = diamond();
        let contributions = g.stack_contributions(&ip(4));
        assert_eq!(
            contributions,
            vec![(ip(2), PCT_20), (ip(3), PCT_10), (ip(1), PCT_10 + PCT_15)]
        );
        let sum: u64 = contributions.iter().map(|(_, v)| v).sum();
        assert_eq!(sum, g.royalty_stack(&ip(4)));
    }

    // --- path royalty ---

    #[test]
    fn path_royalty_direct_parent() {
        let mut g = GraphOracle::new();
        g.add_path_edge(ip(2), ip(1), PCT_10).unwrap();
        assert_eq!(g.path_royalty(&ip(2), &ip(1)).unwrap(), PCT_10);
    }

    #[test]
    fn path_royalty_three_link_chain() {
        let mut g = GraphOracle::new();
        let p1 = 10_000_000;
        let p2 = 50_000_000;
        g.add_path_edge(ip(2), ip(1), p1).unwrap(); // B -> A
        g.add_path_edge(ip(3), ip(2), p2).unwrap(); // C -> B
        assert_eq!(
            g.path_royalty(&ip(3), &ip(1)).unwrap(),
            p1 * p2 / PERCENT_DENOMINATOR
        );
    }

    #[test]
    fn path_royalty_truncates() {
        let mut g = GraphOracle::new();
        g.add_path_edge(ip(2), ip(1), 3).unwrap();
        g.add_path_edge(ip(3), ip(2), 3).unwrap();
        assert_eq!(g.path_royalty(&ip(3), &ip(1)).unwrap(), 0);
    }

    #[test]
    fn path_royalty_not_ancestor() {
        let g = diamond();
        assert_eq!(
            g.path_royalty(&ip(1), &ip(4)),
            Err(GraphError::NotAnAncestor {
                node: ip(1),
                ancestor: ip(4)
            })
        );
        assert!(g.path_royalty(&ip(4), &ip(4)).is_err());
    }

    #[test]
    fn path_royalty_uses_first_discovered_path() {
        let g = diamond();
        // A is first discovered via B (D->B 20%, B->A 10%).
        assert_eq!(
            g.path_royalty(&ip(4), &ip(1)).unwrap(),
            PCT_20 * PCT_10 / PERCENT_DENOMINATOR
        );
    }

    #[test]
    fn single_path_detection() {
        let g = diamond();
        assert!(g.is_single_path(&ip(2)));
        assert!(!g.is_single_path(&ip(4)));

        let mut chain = GraphOracle::new();
        chain.add_path_edge(ip(2), ip(1), PCT_10).unwrap();
        chain.add_path_edge(ip(3), ip(2), PCT_10).unwrap();
        assert!(chain.is_single_path(&ip(3)));
        assert!(chain.is_single_path(&ip(1)));
    }

    #[test]
    fn parentage_kind_recorded() {
        let mut g = GraphOracle::new();
        g.add_path_edge(ip(2), ip(1), PCT_10).unwrap();
        g.add_edges(ip(3), &[(ip(1), PCT_10)]).unwrap();
        assert!(matches!(g.parentage(&ip(2)), Some(Parentage::Path(_))));
        assert!(matches!(g.parentage(&ip(3)), Some(Parentage::Stack(_))));
        assert!(g.parentage(&ip(1)).is_none());
        assert_eq!(g.linked_count(), 2);
    }

    // --- proptest ---

    /// Build a random DAG where node `i` may only link to nodes `< i`.
    fn build_dag(layout: &[Vec<(u8, u64)>]) -> GraphOracle {
        let mut g = GraphOracle::new();
        for (i, parents) in layout.iter().enumerate() {
            let child = ip(i as u8 + 1);
            let mut ps: Vec<(IpId, u64)> = Vec::new();
            for (p, pct) in parents {
                if (*p as usize) < i {
                    let parent = ip(*p + 1);
                    if !ps.iter().any(|(x, _)| *x == parent) {
                        ps.push((parent, *pct));
                    }
                }
            }
            if !ps.is_empty() {
                g.add_edges(child, &ps).unwrap();
            }
        }
        g
    }

    proptest! {
        #[test]
        fn contributions_always_sum_to_stack(
            layout in prop::collection::vec(
                prop::collection::vec((0u8..12, 0u64..=PERCENT_DENOMINATOR / 20), 0..3),
                1..12,
            )
        ) {
            let g = build_dag(&layout);
            for i in 0..layout.len() {
                let node = ip(i as u8 + 1);
                let sum: u64 = g.stack_contributions(&node).iter().map(|(_, v)| v).sum();
                prop_assert_eq!(sum, g.royalty_stack(&node));
            }
        }

        #[test]
        fn ancestors_are_unique_and_exclude_self(
            layout in prop::collection::vec(
                prop::collection::vec((0u8..12, 0u64..=PERCENT_DENOMINATOR / 20), 0..3),
                1..12,
            )
        ) {
            let g = build_dag(&layout);
            for i in 0..layout.len() {
                let node = ip(i as u8 + 1);
                let ancestors = g.ancestors(&node);
                let unique: HashSet<_> = ancestors.iter().collect();
                prop_assert_eq!(unique.len(), ancestors.len());
                prop_assert!(!ancestors.contains(&node));
            }
        }

        #[test]
        fn path_royalty_never_exceeds_first_edge(
            pcts in prop::collection::vec(0u64..=PERCENT_DENOMINATOR, 1..8),
        ) {
            let mut g = GraphOracle::new();
            for (i, pct) in pcts.iter().enumerate() {
                g.add_path_edge(ip(i as u8 + 2), ip(i as u8 + 1), *pct).unwrap();
            }
            let leaf = ip(pcts.len() as u8 + 1);
            let root = ip(1);
            let value = g.path_royalty(&leaf, &root).unwrap();
            prop_assert!(value <= pcts[0]);
            prop_assert!(value <= *pcts.last().unwrap());
        }
    }
}
