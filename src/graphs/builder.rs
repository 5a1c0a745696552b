//! GraphBuilder implementation for constructing executable graphs.
//!
//! This module contains the main GraphBuilder type and its fluent API
//! for declaring nodes, edges, parallel groups, reducers, and configuration,
//! plus the [`NodeSpec`] variants the builder registers.

use rustc_hash::{FxHashMap, FxHashSet};
use std::sync::Arc;

use super::edges::{Edge, EdgeGuard};
use super::groups::ParallelGroup;
use crate::node::{NodeContext, NodeError, NodeHandler, NodeOutput};
use crate::reducers::{Reducer, ReducerRegistry};
use crate::runtimes::RuntimeConfig;
use crate::state::StateSnapshot;
use crate::tools::{ToolCall, ToolRegistry, TOOL_CALLS_FIELD, TOOL_RESULTS_FIELD};
use crate::types::NodeId;

/// Router function for condition nodes.
///
/// Takes a [`StateSnapshot`] and returns a label; the condition node maps
/// the label to a target through its route table.
pub type ConditionRouter = Arc<dyn Fn(&StateSnapshot) -> String + Send + Sync + 'static>;

/// What a registered node is: a computation handler, a tool executor, or a
/// routing condition.
#[derive(Clone)]
pub enum NodeSpec {
    /// User-supplied handler implementing [`NodeHandler`].
    Computation(Arc<dyn NodeHandler>),
    /// Executes pending `tool_calls` against a registry and records
    /// `tool_results`.
    Tool(ToolRegistry),
    /// Evaluates a router over the state and picks the next node; never
    /// modifies state.
    Condition(ConditionSpec),
}

impl NodeSpec {
    /// Short label for logging and metadata.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            NodeSpec::Computation(_) => "computation",
            NodeSpec::Tool(_) => "tool",
            NodeSpec::Condition(_) => "condition",
        }
    }

    /// Run this node's work unit.
    ///
    /// Condition nodes are routed synchronously between supersteps and never
    /// execute as work; compilation rejects them as group members, so the
    /// condition arm only fires on a hand-assembled graph and reports the
    /// misuse as an error.
    pub(crate) async fn execute(
        &self,
        snapshot: StateSnapshot,
        ctx: NodeContext,
    ) -> Result<NodeOutput, NodeError> {
        match self {
            NodeSpec::Computation(handler) => handler.run(snapshot, ctx).await,
            NodeSpec::Tool(tools) => run_tool_node(tools, snapshot, ctx).await,
            NodeSpec::Condition(_) => Err(NodeError::ValidationFailed(
                "condition nodes route between supersteps and cannot execute as work".to_string(),
            )),
        }
    }
}

impl std::fmt::Debug for NodeSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeSpec::Computation(_) => f.write_str("NodeSpec::Computation"),
            NodeSpec::Tool(tools) => write!(f, "NodeSpec::Tool({} tools)", tools.len()),
            NodeSpec::Condition(cond) => {
                write!(f, "NodeSpec::Condition({} routes)", cond.routes.len())
            }
        }
    }
}

/// Router plus route table for a condition node.
#[derive(Clone)]
pub struct ConditionSpec {
    router: ConditionRouter,
    routes: FxHashMap<String, NodeId>,
}

impl ConditionSpec {
    pub fn new(router: ConditionRouter, routes: FxHashMap<String, NodeId>) -> Self {
        Self { router, routes }
    }

    /// Evaluate the router and look up its label, returning both so callers
    /// can report unmapped labels.
    pub fn evaluate(&self, snapshot: &StateSnapshot) -> (String, Option<&NodeId>) {
        let label = (self.router)(snapshot);
        let target = self.routes.get(&label);
        (label, target)
    }

    /// Route labels, sorted for stable error messages.
    #[must_use]
    pub fn labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.routes.keys().cloned().collect();
        labels.sort();
        labels
    }

    /// Targets this condition can route to.
    pub fn targets(&self) -> impl Iterator<Item = &NodeId> + '_ {
        self.routes.values()
    }
}

async fn run_tool_node(
    tools: &ToolRegistry,
    snapshot: StateSnapshot,
    ctx: NodeContext,
) -> Result<NodeOutput, NodeError> {
    let calls = match snapshot.get(TOOL_CALLS_FIELD) {
        None | Some(serde_json::Value::Null) => Vec::new(),
        Some(value) => {
            ToolCall::parse_all(value).map_err(|e| NodeError::ValidationFailed(e.to_string()))?
        }
    };
    if calls.is_empty() {
        ctx.emit("tools", "no pending tool calls")?;
        return Ok(NodeOutput::new().with_field(
            TOOL_RESULTS_FIELD,
            serde_json::Value::Array(Vec::new()),
        ));
    }
    ctx.emit("tools", format!("executing {} tool call(s)", calls.len()))?;
    let results = tools.execute_all(&calls).await;
    let value = serde_json::to_value(&results)?;
    Ok(NodeOutput::new().with_field(TOOL_RESULTS_FIELD, value))
}

/// Builder for constructing executable graphs with a fluent API.
///
/// `GraphBuilder` collects nodes, edges, parallel groups, reducers, and
/// runtime configuration, then validates the whole structure in
/// [`compile`](Self::compile) to produce an executable
/// [`App`](crate::app::App).
///
/// # Required Configuration
///
/// Every graph must have:
/// - At least one executable node added via [`add_node`](Self::add_node)
/// - An entry point: an edge from `NodeId::Start` (or
///   [`set_entry_point`](Self::set_entry_point))
/// - A way out of every node: an outgoing edge, a route to `NodeId::End`, or
///   [`mark_terminal`](Self::mark_terminal)
///
/// Note: `NodeId::Start` and `NodeId::End` are virtual endpoints and should
/// never be registered with `add_node`. They exist only for structural
/// definition.
///
/// # Examples
///
/// ## Simple Linear Graph
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
///     .add_node("worker", MyNode)
///     .add_edge(NodeId::Start, "worker")
///     .add_edge("worker", NodeId::End)
///     .compile()
///     .unwrap();
/// ```
///
/// ## Conditional Routing with Guards
/// ```
/// use stategraph::graphs::{EdgeGuard, GraphBuilder};
/// use stategraph::types::NodeId;
/// use std::sync::Arc;
///
/// # struct MyNode;
/// # #[async_trait::async_trait]
/// # impl stategraph::node::NodeHandler for MyNode {
/// #     async fn run(&self, _: stategraph::state::StateSnapshot, _: stategraph::node::NodeContext) -> Result<stategraph::node::NodeOutput, stategraph::node::NodeError> {
/// #         Ok(stategraph::node::NodeOutput::default())
/// #     }
/// # }
///
/// let has_error: EdgeGuard = Arc::new(|snapshot| snapshot.get("error").is_some());
///
/// let app = GraphBuilder::new()
///     .add_node("process", MyNode)
///     .add_node("recover", MyNode)
///     .set_entry_point("process")
///     .add_conditional_edge("process", "recover", has_error)
///     .add_edge("process", NodeId::End)
///     .add_edge("recover", NodeId::End)
///     .compile()
///     .unwrap();
/// ```
pub struct GraphBuilder {
    /// Registry of all nodes in the graph, keyed by their identifier.
    pub nodes: FxHashMap<NodeId, NodeSpec>,
    /// Outgoing edges per node, in declaration order.
    pub edges: FxHashMap<NodeId, Vec<Edge>>,
    /// Parallel groups, in declaration order.
    pub groups: Vec<ParallelGroup>,
    /// Nodes where a run may complete without routing further.
    pub terminal: FxHashSet<NodeId>,
    /// Per-field reducers applied by the merge barrier.
    pub registry: ReducerRegistry,
    /// Runtime configuration for the compiled application.
    pub runtime_config: RuntimeConfig,
    /// Names registered more than once; surfaced as an error at compile time.
    pub duplicate_nodes: Vec<NodeId>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    /// Creates a new, empty graph builder.
    ///
    /// The builder starts with no nodes, edges, or configuration.
    /// Use the fluent API methods to add components before calling
    /// [`compile`](Self::compile).
    #[must_use]
    pub fn new() -> Self {
        Self {
            nodes: FxHashMap::default(),
            edges: FxHashMap::default(),
            groups: Vec::new(),
            terminal: FxHashSet::default(),
            registry: ReducerRegistry::new(),
            runtime_config: RuntimeConfig::default(),
            duplicate_nodes: Vec::new(),
        }
    }

    fn insert_spec(&mut self, id: NodeId, spec: NodeSpec) {
        // Ignore attempts to register virtual Start/End ids; emit a warning.
        match id {
            NodeId::Start | NodeId::End => {
                tracing::warn!(
                    ?id,
                    "Ignoring registration of virtual node id (Start/End are virtual)"
                );
            }
            _ => {
                if self.nodes.contains_key(&id) {
                    // Keep the first registration; compile() reports the clash.
                    self.duplicate_nodes.push(id);
                } else {
                    self.nodes.insert(id, spec);
                }
            }
        }
    }

    /// Adds a computation node to the graph.
    ///
    /// Registers a handler under the given identifier. Each node must have a
    /// unique id within the graph; a second registration of the same id is
    /// kept aside and reported by [`compile`](Self::compile).
    ///
    /// NOTE: `NodeId::Start` and `NodeId::End` are virtual structural
    /// endpoints. If either is passed to `add_node`, the registration is
    /// ignored and a warning is emitted.
    ///
    /// # Examples
    ///
    /// ```
    /// use stategraph::graphs::GraphBuilder;
    /// use stategraph::node::{NodeContext, NodeError, NodeHandler, NodeOutput};
    /// use stategraph::state::StateSnapshot;
    /// use async_trait::async_trait;
    /// use serde_json::json;
    ///
    /// struct ProcessorNode;
    ///
    /// #[async_trait]
    /// impl NodeHandler for ProcessorNode {
    ///     async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodeOutput, NodeError> {
    ///         Ok(NodeOutput::new().with_field("processed", json!(true)))
    ///     }
    /// }
    ///
    /// let builder = GraphBuilder::new().add_node("processor", ProcessorNode);
    /// ```
    #[must_use]
    pub fn add_node(mut self, id: impl Into<NodeId>, node: impl NodeHandler + 'static) -> Self {
        self.insert_spec(id.into(), NodeSpec::Computation(Arc::new(node)));
        self
    }

    /// Adds a tool node backed by a [`ToolRegistry`].
    ///
    /// When executed, the node reads pending calls from the `tool_calls`
    /// state field, runs them sequentially, and writes their outcomes to
    /// `tool_results`.
    #[must_use]
    pub fn add_tool_node(mut self, id: impl Into<NodeId>, tools: ToolRegistry) -> Self {
        self.insert_spec(id.into(), NodeSpec::Tool(tools));
        self
    }

    /// Adds a condition node that routes by evaluating `router` over the
    /// state and mapping the returned label through `routes`.
    ///
    /// Condition nodes never modify state. A label with no mapping is a
    /// runtime routing error that fails the run.
    ///
    /// # Examples
    ///
    /// ```
    /// use stategraph::graphs::GraphBuilder;
    /// use stategraph::types::NodeId;
    /// use std::sync::Arc;
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
    ///     .add_node("price_node", MyNode)
    ///     .add_node("news_node", MyNode)
    ///     .add_condition_node(
    ///         "route_topic",
    ///         Arc::new(|snapshot| {
    ///             snapshot.field_str("topic").unwrap_or("news").to_string()
    ///         }),
    ///         [("price", "price_node"), ("news", "news_node")],
    ///     );
    /// ```
    #[must_use]
    pub fn add_condition_node<S, T, R>(
        mut self,
        id: impl Into<NodeId>,
        router: ConditionRouter,
        routes: R,
    ) -> Self
    where
        R: IntoIterator<Item = (S, T)>,
        S: Into<String>,
        T: Into<NodeId>,
    {
        let routes: FxHashMap<String, NodeId> = routes
            .into_iter()
            .map(|(label, target)| (label.into(), target.into()))
            .collect();
        self.insert_spec(
            id.into(),
            NodeSpec::Condition(ConditionSpec::new(router, routes)),
        );
        self
    }

    /// Adds an unguarded edge between two nodes.
    ///
    /// Unguarded edges are the static fallback: routing takes one when no
    /// guarded edge from the same node matched. A node may have at most one
    /// unguarded outgoing edge; a second makes the fallback ambiguous and
    /// [`compile`](Self::compile) rejects it.
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
    ///     .add_node("step", MyNode)
    ///     .add_edge(NodeId::Start, "step")
    ///     .add_edge("step", NodeId::End);
    /// ```
    #[must_use]
    pub fn add_edge(mut self, from: impl Into<NodeId>, to: impl Into<NodeId>) -> Self {
        self.edges
            .entry(from.into())
            .or_default()
            .push(Edge::unconditional(to.into()));
        self
    }

    /// Adds a guarded edge between two nodes.
    ///
    /// Guards from the same node are evaluated in declaration order during
    /// routing; the first guard returning `true` wins.
    #[must_use]
    pub fn add_conditional_edge(
        mut self,
        from: impl Into<NodeId>,
        to: impl Into<NodeId>,
        guard: EdgeGuard,
    ) -> Self {
        self.edges
            .entry(from.into())
            .or_default()
            .push(Edge::guarded(to.into(), guard));
        self
    }

    /// Declares the graph's entry point, replacing any previous one.
    ///
    /// Equivalent to a single unguarded edge from `NodeId::Start`; earlier
    /// Start edges are discarded so the entry stays unambiguous.
    #[must_use]
    pub fn set_entry_point(mut self, to: impl Into<NodeId>) -> Self {
        self.edges
            .insert(NodeId::Start, vec![Edge::unconditional(to.into())]);
        self
    }

    /// Marks a node as terminal: a run reaching it with no matching route
    /// completes instead of failing.
    #[must_use]
    pub fn mark_terminal(mut self, id: impl Into<NodeId>) -> Self {
        self.terminal.insert(id.into());
        self
    }

    /// Declares a parallel group. The group's name acts as a node in the
    /// topology; its members run concurrently when the cursor reaches it.
    #[must_use]
    pub fn add_parallel_group(mut self, group: ParallelGroup) -> Self {
        self.groups.push(group);
        self
    }

    /// Registers a reducer for one state field.
    #[must_use]
    pub fn with_reducer(mut self, field: impl Into<String>, reducer: Arc<dyn Reducer>) -> Self {
        self.registry.register(field, reducer);
        self
    }

    /// Replaces the whole reducer registry.
    #[must_use]
    pub fn with_registry(mut self, registry: ReducerRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Configures runtime settings for the compiled application.
    ///
    /// Runtime configuration controls execution behavior such as the
    /// iteration limit, checkpointing, and session management. If not
    /// specified, default configuration is used.
    #[must_use]
    pub fn with_runtime_config(mut self, runtime_config: RuntimeConfig) -> Self {
        self.runtime_config = runtime_config;
        self
    }
}
