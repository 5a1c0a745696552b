//! Graph definition and compilation for workflow execution.
//!
//! This module provides the core graph building functionality for creating
//! workflow graphs with nodes, edges, and conditional routing. The main
//! entry point is [`GraphBuilder`], which uses a builder pattern to
//! construct workflows that compile into executable [`App`](crate::app::App) instances.
//!
//! # Core Concepts
//!
//! - **Nodes**: Executable units of work implementing the [`NodeHandler`](crate::node::NodeHandler) trait
//! - **Edges**: Connections between nodes, optionally guarded by state predicates
//! - **Condition Nodes**: Pure routers that map the current state to a labelled target
//! - **Parallel Groups**: Named sets of nodes that run concurrently under a join strategy
//! - **Virtual Endpoints**: `NodeId::Start` and `NodeId::End` for structural definition
//! - **Compilation**: Validation and conversion to executable [`App`](crate::app::App)
//!
//! # Graph Iteration
//!
//! The module provides iterators for inspecting graph structure:
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
//!     .add_node("a", MyNode)
//!     .add_node("b", MyNode)
//!     .add_edge(NodeId::Start, "a")
//!     .add_edge("a", "b")
//!     .add_edge("b", NodeId::End);
//!
//! // Iterate over registered nodes
//! for node in builder.nodes() {
//!     println!("Node: {node}");
//! }
//!
//! // Iterate over edges as (from, edge) pairs
//! for (from, edge) in builder.edges() {
//!     println!("Edge: {from} -> {}", edge.to());
//! }
//!
//! // Get deterministic topological ordering
//! let sorted = builder.topological_sort();
//! ```
//!
//! # Quick Start
//!
//! ```
//! use stategraph::graphs::GraphBuilder;
//! use stategraph::types::NodeId;
//! use stategraph::node::{NodeHandler, NodeContext, NodeOutput, NodeError};
//! use stategraph::state::StateSnapshot;
//! use async_trait::async_trait;
//!
//! // Define a simple node
//! struct MyNode;
//!
//! #[async_trait]
//! impl NodeHandler for MyNode {
//!     async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodeOutput, NodeError> {
//!         Ok(NodeOutput::default())
//!     }
//! }
//!
//! // Build a simple workflow (virtual Start/End):
//! // Start (virtual) -> process -> End (virtual)
//! let app = GraphBuilder::new()
//!     .add_node("process", MyNode)
//!     .add_edge(NodeId::Start, "process")
//!     .add_edge("process", NodeId::End)
//!     .compile();
//! ```
//!
//! # Advanced Usage
//!
//! ## Guarded Edges
//!
//! ```
//! use stategraph::graphs::{EdgeGuard, GraphBuilder};
//! use stategraph::types::NodeId;
//! use std::sync::Arc;
//!
//! // Route to "retry" while the attempt counter stays low.
//! let should_retry: EdgeGuard = Arc::new(|snapshot| {
//!     snapshot
//!         .get("attempts")
//!         .and_then(|v| v.as_u64())
//!         .is_some_and(|n| n < 3)
//! });
//!
//! # struct MyNode;
//! # #[async_trait::async_trait]
//! # impl stategraph::node::NodeHandler for MyNode {
//! #     async fn run(&self, _: stategraph::state::StateSnapshot, _: stategraph::node::NodeContext) -> Result<stategraph::node::NodeOutput, stategraph::node::NodeError> {
//! #         Ok(stategraph::node::NodeOutput::default())
//! #     }
//! # }
//!
//! let app = GraphBuilder::new()
//!     .add_node("fetch", MyNode)
//!     .add_node("retry", MyNode)
//!     .set_entry_point("fetch")
//!     .add_conditional_edge("fetch", "retry", should_retry)
//!     .add_edge("fetch", NodeId::End)
//!     .add_edge("retry", "fetch")
//!     .compile();
//! ```
//!
//! ## Parallel Groups
//!
//! ```
//! use stategraph::graphs::{GraphBuilder, ParallelGroup};
//! use stategraph::types::{JoinStrategy, NodeId};
//!
//! # struct MyNode;
//! # #[async_trait::async_trait]
//! # impl stategraph::node::NodeHandler for MyNode {
//! #     async fn run(&self, _: stategraph::state::StateSnapshot, _: stategraph::node::NodeContext) -> Result<stategraph::node::NodeOutput, stategraph::node::NodeError> {
//! #         Ok(stategraph::node::NodeOutput::default())
//! #     }
//! # }
//!
//! let app = GraphBuilder::new()
//!     .add_node("search_web", MyNode)
//!     .add_node("search_docs", MyNode)
//!     .add_parallel_group(
//!         ParallelGroup::new(
//!             "research",
//!             vec![NodeId::from("search_web"), NodeId::from("search_docs")],
//!         )
//!             .with_join(JoinStrategy::Any),
//!     )
//!     .set_entry_point("research")
//!     .add_edge("research", NodeId::End)
//!     .compile();
//! ```

// Internal module declarations
mod builder;
mod compilation;
mod edges;
mod groups;
mod iteration;

// Public re-exports
pub use builder::{ConditionRouter, ConditionSpec, GraphBuilder, NodeSpec};
pub use compilation::GraphCompileError;
pub use edges::{Edge, EdgeGuard};
pub use groups::{DEFAULT_GROUP_TIMEOUT, ParallelGroup};
pub use iteration::{EdgesIter, NodesIter};
