//! # Stategraph: Graph-driven Workflow Execution Engine
//!
//! Stategraph is an engine for building stateful workflows as directed
//! graphs: nodes transform a shared versioned state, edges and condition
//! routers decide where execution goes next, and parallel groups fan work
//! out concurrently before a deterministic merge barrier folds the results
//! back in.
//!
//! ## Core Concepts
//!
//! - **Nodes**: Async units of work that read a state snapshot and return
//!   partial updates
//! - **State**: Free-form JSON fields with per-field version counters
//! - **Edges & Routers**: Guarded edges, explicit next-node overrides, and
//!   condition nodes mapping labels to targets
//! - **Parallel Groups**: Concurrent members with all/any/quorum joins
//! - **Runtime**: Sessions, supersteps, checkpoints, and resumption
//! - **Agent**: A conversational wrapper with per-session memory
//!
//! ## Quick Start
//!
//! ### Building a Workflow
//!
//! ```
//! use stategraph::graphs::GraphBuilder;
//! use stategraph::node::{NodeContext, NodeError, NodeHandler, NodeOutput};
//! use stategraph::state::StateSnapshot;
//! use stategraph::types::NodeId;
//! use async_trait::async_trait;
//! use serde_json::json;
//!
//! struct Classify;
//!
//! #[async_trait]
//! impl NodeHandler for Classify {
//!     async fn run(
//!         &self,
//!         snapshot: StateSnapshot,
//!         _ctx: NodeContext,
//!     ) -> Result<NodeOutput, NodeError> {
//!         let input = snapshot.field_str("input").unwrap_or_default();
//!         let topic = if input.contains("price") { "price" } else { "news" };
//!         Ok(NodeOutput::new().with_field("topic", json!(topic)))
//!     }
//! }
//!
//! let app = GraphBuilder::new()
//!     .add_node("classify", Classify)
//!     .set_entry_point("classify")
//!     .add_edge("classify", NodeId::End)
//!     .compile()
//!     .unwrap();
//! assert_eq!(app.nodes().len(), 1);
//! ```
//!
//! ### Running It
//!
//! ```rust,no_run
//! # use stategraph::app::App;
//! use stategraph::state::GraphState;
//! # async fn example(app: App) -> Result<(), Box<dyn std::error::Error>> {
//!
//! let final_state = app.invoke(GraphState::new_with_input("price of AAPL?")).await?;
//! println!("topic = {:?}", final_state.get("topic"));
//! # Ok(())
//! # }
//! ```
//!
//! ### State Management
//!
//! ```
//! use stategraph::state::GraphState;
//!
//! // Seed the conventional input field
//! let state = GraphState::new_with_input("Hello, system!");
//!
//! // Or use the builder for richer initial state
//! let complex_state = GraphState::builder()
//!     .with_input("What's the weather?")
//!     .with_value("location", serde_json::json!("San Francisco"))
//!     .build();
//!
//! // Every seeded field starts at version 1; barriers bump versions on change
//! assert_eq!(complex_state.version("location"), 1);
//! ```
//!
//! ### Error Handling
//!
//! The engine uses structured error types with diagnostic codes throughout:
//!
//! ```
//! use stategraph::node::{NodeContext, NodeError};
//!
//! // Errors are traced and can be emitted to the event bus
//! fn example_error_handling(ctx: &NodeContext) -> Result<(), NodeError> {
//!     ctx.emit("validation", "Checking input parameters")?;
//!
//!     Err(NodeError::MissingInput { what: "user_id" })
//! }
//! ```
//!
//! ## Module Guide
//!
//! - [`state`] - Versioned state container and snapshots
//! - [`node`] - Node trait and execution primitives
//! - [`tools`] - Tool trait, registry, and the tool-node calling convention
//! - [`graphs`] - Workflow graph definition and compilation
//! - [`reducers`] - State merge strategies for the barrier
//! - [`schedulers`] - Parallel group execution (joins, timeouts)
//! - [`runtimes`] - Sessions, the step loop, and checkpointing
//! - [`agent`] - Conversational wrapper with session memory
//! - [`event_bus`] - Event streaming to pluggable sinks

pub mod agent;
pub mod app;
pub mod errors;
pub mod event_bus;
pub mod graphs;
pub mod memory;
pub mod node;
pub mod reducers;
pub mod runtimes;
pub mod schedulers;
pub mod state;
pub mod telemetry;
pub mod tools;
pub mod types;
pub mod utils;
