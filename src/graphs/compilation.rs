//! Graph compilation logic and validation.
//!
//! This module contains the logic for compiling a GraphBuilder into an
//! executable [`App`], including the structural validation that makes the
//! runtime's routing rules safe to apply: unique names, a single entry
//! point, unambiguous fallbacks, well-formed parallel groups, and no silent
//! dead ends.

use miette::Diagnostic;
use rustc_hash::FxHashSet;
use thiserror::Error;

use super::builder::{GraphBuilder, NodeSpec};
use crate::app::App;
use crate::types::{JoinStrategy, NodeId};

/// Structural problems detected while compiling a graph.
#[derive(Debug, Error, Diagnostic)]
pub enum GraphCompileError {
    /// A node or group name was declared more than once.
    #[error("node {name:?} is declared more than once")]
    #[diagnostic(
        code(stategraph::compile::duplicate_node),
        help("Node and parallel group names share one namespace; pick a unique name.")
    )]
    DuplicateNode { name: String },

    /// No edge leaves `NodeId::Start`.
    #[error("graph has no entry point")]
    #[diagnostic(
        code(stategraph::compile::missing_entry_point),
        help("Add set_entry_point(...) or an edge from NodeId::Start.")
    )]
    MissingEntryPoint,

    /// An edge, group, condition route, or terminal marking references a
    /// name that was never registered.
    #[error("unknown node {name:?} referenced by {referenced_by}")]
    #[diagnostic(code(stategraph::compile::unknown_node))]
    UnknownNode {
        name: String,
        referenced_by: String,
    },

    /// An edge leaves `End` or enters `Start`.
    #[error("edge {from} -> {to} is not allowed")]
    #[diagnostic(
        code(stategraph::compile::invalid_edge),
        help("Edges cannot leave End or enter Start.")
    )]
    InvalidEdge { from: String, to: String },

    /// More than one unguarded edge leaves the same node, so the routing
    /// fallback is statically ambiguous.
    #[error("node {node:?} has {count} unguarded outgoing edges; the fallback must be unique")]
    #[diagnostic(
        code(stategraph::compile::ambiguous_fallback),
        help("Keep at most one unguarded edge per node and guard the rest.")
    )]
    AmbiguousFallback { node: String, count: usize },

    /// A node has no way out and is not marked terminal.
    #[error("node {node:?} has no outgoing edge and is not marked terminal")]
    #[diagnostic(
        code(stategraph::compile::dead_end),
        help("Add an edge, route it to NodeId::End, or mark_terminal(...) it.")
    )]
    DeadEnd { node: String },

    /// A parallel group has fewer than two members.
    #[error("parallel group {group:?} needs at least two members, has {size}")]
    #[diagnostic(code(stategraph::compile::group_too_small))]
    GroupTooSmall { group: String, size: usize },

    /// A quorum join requires zero successes or more than the member count.
    #[error("parallel group {group:?} has invalid quorum {quorum} for {size} members")]
    #[diagnostic(
        code(stategraph::compile::invalid_quorum),
        help("Quorum must be between 1 and the member count.")
    )]
    InvalidQuorum {
        group: String,
        quorum: usize,
        size: usize,
    },

    /// A group member cannot run as concurrent work.
    #[error("node {member:?} cannot be a member of parallel group {group:?}: {reason}")]
    #[diagnostic(code(stategraph::compile::invalid_group_member))]
    InvalidGroupMember {
        group: String,
        member: String,
        reason: &'static str,
    },

    /// A static edge connects two members of the same group.
    #[error("static edge {from:?} -> {to:?} connects two members of parallel group {group:?}")]
    #[diagnostic(
        code(stategraph::compile::intra_group_edge),
        help("Members exchange data through the shared state, not edges.")
    )]
    IntraGroupEdge {
        group: String,
        from: String,
        to: String,
    },
}

/// Compilation logic for GraphBuilder.
impl GraphBuilder {
    /// Compiles the graph into an executable application.
    ///
    /// Validates the declared structure and converts it into an [`App`] that
    /// can execute runs. The checks are purely static: cycles are allowed
    /// (the runtime bounds them with its iteration limit) and nodes that are
    /// only reachable through explicit routing produce a warning rather than
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns a [`GraphCompileError`] when the structure is unsound:
    /// duplicate names, a missing entry point, references to unregistered
    /// nodes, edges leaving `End` or entering `Start`, more than one
    /// unguarded edge from a node, nodes with no way out, or malformed
    /// parallel groups.
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
    /// let app = GraphBuilder::new()
    ///     .add_node("process", MyNode)
    ///     .add_edge(NodeId::Start, "process")
    ///     .add_edge("process", NodeId::End)
    ///     .compile()
    ///     .unwrap();
    ///
    /// // App is ready for execution
    /// ```
    pub fn compile(self) -> Result<App, GraphCompileError> {
        let GraphBuilder {
            nodes,
            edges,
            groups,
            terminal,
            registry,
            runtime_config,
            duplicate_nodes,
        } = self;

        if let Some(dup) = duplicate_nodes.first() {
            return Err(GraphCompileError::DuplicateNode {
                name: dup.to_string(),
            });
        }

        // Group names share the node namespace.
        let mut group_names: FxHashSet<&str> = FxHashSet::default();
        for group in &groups {
            if nodes.contains_key(&group.node_id()) || !group_names.insert(group.name.as_str()) {
                return Err(GraphCompileError::DuplicateNode {
                    name: group.name.clone(),
                });
            }
        }

        let is_known = |id: &NodeId| match id {
            NodeId::Start | NodeId::End => true,
            NodeId::Named(name) => nodes.contains_key(id) || group_names.contains(name.as_str()),
        };

        if edges.get(&NodeId::Start).is_none_or(|v| v.is_empty()) {
            return Err(GraphCompileError::MissingEntryPoint);
        }

        for (from, targets) in &edges {
            if *from == NodeId::End {
                let to = targets
                    .first()
                    .map(|e| e.to().to_string())
                    .unwrap_or_default();
                return Err(GraphCompileError::InvalidEdge {
                    from: from.to_string(),
                    to,
                });
            }
            if !is_known(from) {
                return Err(GraphCompileError::UnknownNode {
                    name: from.to_string(),
                    referenced_by: "an edge source".to_string(),
                });
            }
            let mut fallbacks = 0usize;
            for edge in targets {
                if *edge.to() == NodeId::Start {
                    return Err(GraphCompileError::InvalidEdge {
                        from: from.to_string(),
                        to: edge.to().to_string(),
                    });
                }
                if !is_known(edge.to()) {
                    return Err(GraphCompileError::UnknownNode {
                        name: edge.to().to_string(),
                        referenced_by: format!("edge from {from}"),
                    });
                }
                if !edge.is_conditional() {
                    fallbacks += 1;
                }
            }
            if fallbacks > 1 {
                return Err(GraphCompileError::AmbiguousFallback {
                    node: from.to_string(),
                    count: fallbacks,
                });
            }
        }

        // Condition route tables reference the same namespace as edges.
        for (id, spec) in &nodes {
            if let NodeSpec::Condition(cond) = spec {
                for target in cond.targets() {
                    if *target == NodeId::Start {
                        return Err(GraphCompileError::InvalidEdge {
                            from: id.to_string(),
                            to: target.to_string(),
                        });
                    }
                    if !is_known(target) {
                        return Err(GraphCompileError::UnknownNode {
                            name: target.to_string(),
                            referenced_by: format!("condition node {id}"),
                        });
                    }
                }
            }
        }

        for group in &groups {
            if group.members.len() < 2 {
                return Err(GraphCompileError::GroupTooSmall {
                    group: group.name.clone(),
                    size: group.members.len(),
                });
            }
            if let JoinStrategy::Quorum(quorum) = group.join
                && (quorum == 0 || quorum > group.members.len())
            {
                return Err(GraphCompileError::InvalidQuorum {
                    group: group.name.clone(),
                    quorum,
                    size: group.members.len(),
                });
            }

            let mut member_set: FxHashSet<&NodeId> = FxHashSet::default();
            for member in &group.members {
                match member {
                    NodeId::Start | NodeId::End => {
                        return Err(GraphCompileError::InvalidGroupMember {
                            group: group.name.clone(),
                            member: member.to_string(),
                            reason: "virtual endpoints cannot run as members",
                        });
                    }
                    NodeId::Named(name) => {
                        if group_names.contains(name.as_str()) {
                            return Err(GraphCompileError::InvalidGroupMember {
                                group: group.name.clone(),
                                member: member.to_string(),
                                reason: "groups cannot nest",
                            });
                        }
                    }
                }
                match nodes.get(member) {
                    None => {
                        return Err(GraphCompileError::UnknownNode {
                            name: member.to_string(),
                            referenced_by: format!("parallel group {}", group.name),
                        });
                    }
                    Some(NodeSpec::Condition(_)) => {
                        return Err(GraphCompileError::InvalidGroupMember {
                            group: group.name.clone(),
                            member: member.to_string(),
                            reason: "condition nodes route, they do not execute",
                        });
                    }
                    Some(_) => {}
                }
                if !member_set.insert(member) {
                    return Err(GraphCompileError::InvalidGroupMember {
                        group: group.name.clone(),
                        member: member.to_string(),
                        reason: "listed more than once",
                    });
                }
            }

            for (from, targets) in &edges {
                if member_set.contains(from) {
                    for edge in targets {
                        if member_set.contains(edge.to()) {
                            return Err(GraphCompileError::IntraGroupEdge {
                                group: group.name.clone(),
                                from: from.to_string(),
                                to: edge.to().to_string(),
                            });
                        }
                    }
                }
            }
        }

        for id in &terminal {
            if !nodes.contains_key(id)
                && !matches!(id, NodeId::Named(name) if group_names.contains(name.as_str()))
            {
                return Err(GraphCompileError::UnknownNode {
                    name: id.to_string(),
                    referenced_by: "mark_terminal".to_string(),
                });
            }
        }

        // Every node and group needs a way out: an outgoing edge, routes (for
        // condition nodes), a terminal marking, or a group that carries it.
        let member_of_any: FxHashSet<&NodeId> =
            groups.iter().flat_map(|g| g.members.iter()).collect();
        for (id, spec) in &nodes {
            let has_routes = matches!(spec, NodeSpec::Condition(cond) if cond.targets().next().is_some());
            let has_out = edges.get(id).is_some_and(|v| !v.is_empty())
                || has_routes
                || terminal.contains(id)
                || member_of_any.contains(id);
            if !has_out {
                return Err(GraphCompileError::DeadEnd {
                    node: id.to_string(),
                });
            }
        }
        for group in &groups {
            let gid = group.node_id();
            let has_out =
                edges.get(&gid).is_some_and(|v| !v.is_empty()) || terminal.contains(&gid);
            if !has_out {
                return Err(GraphCompileError::DeadEnd {
                    node: group.name.clone(),
                });
            }
        }

        warn_unreachable(&nodes, &edges, &groups);

        tracing::debug!(
            nodes = nodes.len(),
            groups = groups.len(),
            "graph compiled"
        );
        Ok(App::from_parts(
            nodes,
            edges,
            groups,
            terminal,
            registry,
            runtime_config,
        ))
    }
}

/// BFS over the static topology; nodes only reachable through explicit
/// routing from handler outputs are reported, not rejected.
fn warn_unreachable(
    nodes: &rustc_hash::FxHashMap<NodeId, NodeSpec>,
    edges: &rustc_hash::FxHashMap<NodeId, Vec<super::edges::Edge>>,
    groups: &[super::groups::ParallelGroup],
) {
    let mut seen: FxHashSet<NodeId> = FxHashSet::default();
    let mut stack = vec![NodeId::Start];
    while let Some(id) = stack.pop() {
        if !seen.insert(id.clone()) {
            continue;
        }
        if let Some(targets) = edges.get(&id) {
            for edge in targets {
                stack.push(edge.to().clone());
            }
        }
        if let Some(NodeSpec::Condition(cond)) = nodes.get(&id) {
            for target in cond.targets() {
                stack.push(target.clone());
            }
        }
        if let Some(group) = groups.iter().find(|g| g.node_id() == id) {
            for member in &group.members {
                stack.push(member.clone());
            }
        }
    }
    for id in nodes.keys() {
        if !seen.contains(id) {
            tracing::warn!(node = %id, "node is unreachable from Start via static topology");
        }
    }
    for group in groups {
        if !seen.contains(&group.node_id()) {
            tracing::warn!(group = %group.name, "group is unreachable from Start via static topology");
        }
    }
}
