//! Graph iteration utilities and algorithms.
//!
//! This module provides idiomatic iterators and common graph algorithms
//! for inspecting and analyzing graphs before and after compilation.
//!
//! # Iterators
//!
//! - [`NodesIter`]: Iterate over all registered nodes
//! - [`EdgesIter`]: Iterate over all edges as (source, edge) pairs
//!
//! # Algorithms
//!
//! - [`topological_sort`](crate::graphs::GraphBuilder::topological_sort):
//!   Deterministic node ordering
//!
//! # Examples
//!
//! ```
//! use stategraph::graphs::GraphBuilder;
//! use stategraph::types::NodeId;
//!
//! # struct MyNode;
//! # #[async_trait::async_trait]
//! # impl stategraph::node::NodeHandler for MyNode {
//! #     async fn run(&self, _: stategraph::state::StateSnapshot, _: stategraph::node::NodeContext) -> Result<stategraph::node::NodeOutput, stategraph::node::NodeError> {
//! #         Ok(stategraph::node::NodeOutput::default())
//! #     }
//! # }
//!
//! let builder = GraphBuilder::new()
//!     .add_node("A", MyNode)
//!     .add_node("B", MyNode)
//!     .add_edge(NodeId::Start, "A")
//!     .add_edge("A", "B")
//!     .add_edge("B", NodeId::End);
//!
//! // Iterate over nodes
//! for node_id in builder.nodes() {
//!     println!("Node: {:?}", node_id);
//! }
//!
//! // Iterate over edges
//! for (from, edge) in builder.edges() {
//!     println!("Edge: {:?} -> {:?}", from, edge.to());
//! }
//!
//! // Get deterministic topological ordering
//! let sorted = builder.topological_sort();
//! println!("Topological order: {:?}", sorted);
//! ```

use super::builder::{GraphBuilder, NodeSpec};
use super::edges::Edge;
use crate::types::NodeId;
use rustc_hash::{FxHashMap, FxHashSet};
use std::collections::VecDeque;

impl GraphBuilder {
    /// Iterator over registered node ids.
    pub fn nodes(&self) -> NodesIter<'_> {
        NodesIter::new(self.nodes.keys())
    }

    /// Iterator over all declared edges as (source, edge) pairs.
    pub fn edges(&self) -> EdgesIter<'_> {
        EdgesIter::new(&self.edges)
    }

    /// Deterministic topological ordering of the declared topology.
    ///
    /// Cycles are permitted at runtime (bounded by the iteration limit), so
    /// on a cyclic graph this returns a partial ordering that excludes cycle
    /// members.
    pub fn topological_sort(&self) -> Vec<NodeId> {
        topological_sort(&self.edges)
    }
}

/// Iterator over node ids in a graph.
///
/// Yields each registered node id. Does not include virtual `Start` or
/// `End` nodes as they are not stored in the node registry.
///
/// # Examples
///
/// ```
/// use stategraph::graphs::GraphBuilder;
/// use stategraph::types::NodeId;
///
/// # struct MyNode;
/// # #[async_trait::async_trait]
/// # impl stategraph::node::NodeHandler for MyNode {
/// #     async fn run(&self, _: stategraph::state::StateSnapshot, _: stategraph::node::NodeContext) -> Result<stategraph::node::NodeOutput, stategraph::node::NodeError> {
/// #         Ok(stategraph::node::NodeOutput::default())
/// #     }
/// # }
///
/// let builder = GraphBuilder::new()
///     .add_node("A", MyNode)
///     .add_node("B", MyNode)
///     .add_edge(NodeId::Start, "A")
///     .add_edge("A", "B")
///     .add_edge("B", NodeId::End);
///
/// let nodes: Vec<_> = builder.nodes().collect();
/// assert_eq!(nodes.len(), 2);
/// ```
pub struct NodesIter<'a> {
    inner: std::collections::hash_map::Keys<'a, NodeId, NodeSpec>,
}

impl<'a> NodesIter<'a> {
    pub(super) fn new(inner: std::collections::hash_map::Keys<'a, NodeId, NodeSpec>) -> Self {
        Self { inner }
    }
}

impl<'a> Iterator for NodesIter<'a> {
    type Item = &'a NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<'a> ExactSizeIterator for NodesIter<'a> {}

/// Iterator over edges in a graph as (source, edge) pairs.
///
/// Yields each declared edge, including edges from/to virtual `Start` and
/// `End` nodes. The iteration order across sources is not guaranteed to be
/// deterministic due to hash map iteration; edges from one source come in
/// declaration order.
///
/// # Examples
///
/// ```
/// use stategraph::graphs::GraphBuilder;
/// use stategraph::types::NodeId;
///
/// # struct MyNode;
/// # #[async_trait::async_trait]
/// # impl stategraph::node::NodeHandler for MyNode {
/// #     async fn run(&self, _: stategraph::state::StateSnapshot, _: stategraph::node::NodeContext) -> Result<stategraph::node::NodeOutput, stategraph::node::NodeError> {
/// #         Ok(stategraph::node::NodeOutput::default())
/// #     }
/// # }
///
/// let builder = GraphBuilder::new()
///     .add_node("A", MyNode)
///     .add_edge(NodeId::Start, "A")
///     .add_edge("A", NodeId::End);
///
/// let edges: Vec<_> = builder.edges().collect();
/// assert_eq!(edges.len(), 2);
/// ```
pub struct EdgesIter<'a> {
    outer: std::collections::hash_map::Iter<'a, NodeId, Vec<Edge>>,
    current_from: Option<&'a NodeId>,
    current_targets: std::slice::Iter<'a, Edge>,
}

impl<'a> EdgesIter<'a> {
    pub(super) fn new(edges: &'a FxHashMap<NodeId, Vec<Edge>>) -> Self {
        let mut outer = edges.iter();
        let (current_from, current_targets) = match outer.next() {
            Some((from, targets)) => (Some(from), targets.iter()),
            None => (None, [].iter()),
        };
        Self {
            outer,
            current_from,
            current_targets,
        }
    }
}

impl<'a> Iterator for EdgesIter<'a> {
    type Item = (&'a NodeId, &'a Edge);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(edge) = self.current_targets.next() {
                return Some((self.current_from.unwrap(), edge));
            }
            match self.outer.next() {
                Some((from, targets)) => {
                    self.current_from = Some(from);
                    self.current_targets = targets.iter();
                }
                None => return None,
            }
        }
    }
}

/// Total ordering over node ids: Start first, End last, names lexicographic.
fn compare_ids(a: &NodeId, b: &NodeId) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (NodeId::Start, NodeId::Start) | (NodeId::End, NodeId::End) => Ordering::Equal,
        (NodeId::Start, _) => Ordering::Less,
        (_, NodeId::Start) => Ordering::Greater,
        (NodeId::End, _) => Ordering::Greater,
        (_, NodeId::End) => Ordering::Less,
        (NodeId::Named(a_name), NodeId::Named(b_name)) => a_name.cmp(b_name),
    }
}

/// Performs Kahn's algorithm for topological sorting.
///
/// Returns nodes in topological order (dependencies before dependents).
/// Virtual `Start` node is always first, `End` is always last.
/// Ties are broken lexicographically for deterministic ordering.
///
/// On a cyclic graph this returns a partial ordering that excludes cycle
/// members; cycles are legal at runtime and bounded by the iteration limit.
pub(super) fn topological_sort(edges: &FxHashMap<NodeId, Vec<Edge>>) -> Vec<NodeId> {
    // Build in-degree map and collect all nodes
    let mut in_degree: FxHashMap<NodeId, usize> = FxHashMap::default();
    let mut all_nodes: FxHashSet<NodeId> = FxHashSet::default();

    // Collect all nodes from edges
    for (from, tos) in edges {
        all_nodes.insert(from.clone());
        in_degree.entry(from.clone()).or_insert(0);
        for edge in tos {
            all_nodes.insert(edge.to().clone());
            *in_degree.entry(edge.to().clone()).or_insert(0) += 1;
        }
    }

    // Initialize queue with nodes that have in-degree 0
    // Use a Vec and sort for deterministic ordering
    let mut queue: VecDeque<NodeId> = VecDeque::new();
    let mut zero_in_degree: Vec<_> = in_degree
        .iter()
        .filter(|entry| *entry.1 == 0)
        .map(|(node, _)| node.clone())
        .collect();

    zero_in_degree.sort_by(compare_ids);
    queue.extend(zero_in_degree);

    let mut result: Vec<NodeId> = Vec::with_capacity(all_nodes.len());

    while let Some(node) = queue.pop_front() {
        result.push(node.clone());

        if let Some(neighbors) = edges.get(&node) {
            // Collect neighbors that become zero in-degree after removing this node
            let mut new_zero: Vec<NodeId> = Vec::new();
            for edge in neighbors {
                if let Some(deg) = in_degree.get_mut(edge.to()) {
                    *deg = deg.saturating_sub(1);
                    if *deg == 0 {
                        new_zero.push(edge.to().clone());
                    }
                }
            }
            // Sort new zero-degree nodes for determinism
            new_zero.sort_by(compare_ids);
            queue.extend(new_zero);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> NodeId {
        NodeId::Named(name.to_string())
    }

    #[test]
    fn test_topological_sort_linear() {
        let mut edges: FxHashMap<NodeId, Vec<Edge>> = FxHashMap::default();
        edges.insert(NodeId::Start, vec![Edge::unconditional(named("A"))]);
        edges.insert(named("A"), vec![Edge::unconditional(named("B"))]);
        edges.insert(named("B"), vec![Edge::unconditional(NodeId::End)]);

        let sorted = topological_sort(&edges);

        // Start should be first, End should be last
        assert_eq!(sorted[0], NodeId::Start);
        assert_eq!(sorted[sorted.len() - 1], NodeId::End);

        // A should come before B
        let a_pos = sorted.iter().position(|n| n == &named("A")).unwrap();
        let b_pos = sorted.iter().position(|n| n == &named("B")).unwrap();
        assert!(a_pos < b_pos);
    }

    #[test]
    fn test_topological_sort_diamond() {
        // Start -> A, B -> C -> End (diamond pattern)
        let mut edges: FxHashMap<NodeId, Vec<Edge>> = FxHashMap::default();
        edges.insert(
            NodeId::Start,
            vec![
                Edge::unconditional(named("A")),
                Edge::unconditional(named("B")),
            ],
        );
        edges.insert(named("A"), vec![Edge::unconditional(named("C"))]);
        edges.insert(named("B"), vec![Edge::unconditional(named("C"))]);
        edges.insert(named("C"), vec![Edge::unconditional(NodeId::End)]);

        let sorted = topological_sort(&edges);

        assert_eq!(sorted[0], NodeId::Start);
        assert_eq!(sorted[sorted.len() - 1], NodeId::End);

        // A and B should both come before C
        let a_pos = sorted.iter().position(|n| n == &named("A")).unwrap();
        let b_pos = sorted.iter().position(|n| n == &named("B")).unwrap();
        let c_pos = sorted.iter().position(|n| n == &named("C")).unwrap();
        assert!(a_pos < c_pos);
        assert!(b_pos < c_pos);

        // A should come before B due to lexicographic ordering
        assert!(a_pos < b_pos);
    }

    #[test]
    fn test_topological_sort_deterministic() {
        // Multiple runs should produce the same order
        let mut edges: FxHashMap<NodeId, Vec<Edge>> = FxHashMap::default();
        edges.insert(
            NodeId::Start,
            vec![
                Edge::unconditional(named("X")),
                Edge::unconditional(named("Y")),
                Edge::unconditional(named("Z")),
            ],
        );
        edges.insert(named("X"), vec![Edge::unconditional(NodeId::End)]);
        edges.insert(named("Y"), vec![Edge::unconditional(NodeId::End)]);
        edges.insert(named("Z"), vec![Edge::unconditional(NodeId::End)]);

        let sorted1 = topological_sort(&edges);
        let sorted2 = topological_sort(&edges);

        assert_eq!(sorted1, sorted2);
    }

    #[test]
    fn test_topological_sort_skips_cycle_members() {
        // Start -> A -> B -> A (cycle), A -> End
        let mut edges: FxHashMap<NodeId, Vec<Edge>> = FxHashMap::default();
        edges.insert(NodeId::Start, vec![Edge::unconditional(named("A"))]);
        edges.insert(
            named("A"),
            vec![
                Edge::unconditional(named("B")),
                Edge::unconditional(NodeId::End),
            ],
        );
        edges.insert(named("B"), vec![Edge::unconditional(named("A"))]);

        let sorted = topological_sort(&edges);
        assert_eq!(sorted[0], NodeId::Start);
        // A and B participate in a cycle and are excluded from the ordering.
        assert!(!sorted.contains(&named("A")));
        assert!(!sorted.contains(&named("B")));
    }
}
