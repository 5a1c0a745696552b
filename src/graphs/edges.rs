//! Edge types and routing guards for conditional graph flow.
//!
//! This module contains the types used for static topology and dynamic
//! routing in graphs: every edge targets exactly one node, and an edge may
//! carry a guard that is evaluated against the current state to decide
//! whether the edge is taken.

use crate::types::NodeId;
use std::sync::Arc;

/// Guard function for conditional edge routing.
///
/// Takes a [`StateSnapshot`](crate::state::StateSnapshot) and returns whether
/// the edge should be taken. Guards are evaluated in the order the edges were
/// declared; the first guard that returns `true` wins. Guards are used with
/// [`GraphBuilder::add_conditional_edge`](crate::graphs::GraphBuilder::add_conditional_edge).
///
/// # Examples
///
/// ```
/// use stategraph::graphs::EdgeGuard;
/// use std::sync::Arc;
///
/// // Route to a retry node while the attempt counter is low
/// let retry_guard: EdgeGuard = Arc::new(|snapshot| {
///     snapshot
///         .get("attempts")
///         .and_then(|v| v.as_u64())
///         .is_some_and(|n| n < 3)
/// });
///
/// // Route on a string field produced by an upstream classifier
/// let is_price: EdgeGuard = Arc::new(|snapshot| {
///     snapshot.field_str("topic") == Some("price")
/// });
/// ```
pub type EdgeGuard =
    Arc<dyn Fn(&crate::state::StateSnapshot) -> bool + Send + Sync + 'static>;

/// A directed edge from one node to another, optionally guarded.
///
/// Unguarded edges form the static fallback topology; guarded edges are
/// consulted first during routing. The private fields ensure edges are
/// constructed through the builder API rather than direct field access.
///
/// # Examples
///
/// ```
/// use stategraph::graphs::{Edge, EdgeGuard};
/// use stategraph::types::NodeId;
/// use std::sync::Arc;
///
/// let plain = Edge::unconditional(NodeId::from("persist"));
/// assert!(!plain.is_conditional());
///
/// let guard: EdgeGuard = Arc::new(|snapshot| snapshot.get("error").is_some());
/// let guarded = Edge::guarded(NodeId::from("recover"), guard);
/// assert!(guarded.is_conditional());
/// ```
#[derive(Clone)]
pub struct Edge {
    /// Target node for this edge.
    to: NodeId,
    /// Guard deciding whether the edge is taken; `None` marks the fallback.
    guard: Option<EdgeGuard>,
}

impl Edge {
    /// Creates an unguarded edge, the static fallback from its source node.
    pub fn unconditional(to: impl Into<NodeId>) -> Self {
        Self {
            to: to.into(),
            guard: None,
        }
    }

    /// Creates a guarded edge that is taken only when `guard` returns `true`.
    pub fn guarded(to: impl Into<NodeId>, guard: EdgeGuard) -> Self {
        Self {
            to: to.into(),
            guard: Some(guard),
        }
    }

    /// Returns the target node of this edge.
    pub fn to(&self) -> &NodeId {
        &self.to
    }

    /// Returns the guard of this edge, if any.
    pub fn guard(&self) -> Option<&EdgeGuard> {
        self.guard.as_ref()
    }

    /// Whether this edge carries a guard.
    pub fn is_conditional(&self) -> bool {
        self.guard.is_some()
    }
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Edge")
            .field("to", &self.to)
            .field("guarded", &self.guard.is_some())
            .finish()
    }
}
