//! Node execution framework for the graph engine.
//!
//! This module provides the core abstractions for executable graph nodes,
//! including the [`NodeHandler`] trait, execution context, state updates, and
//! error handling.

// Standard library and external crates
use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde_json;
use thiserror::Error;

// Internal crate modules
use crate::errors::ErrorEvent;
use crate::event_bus::Event;
use crate::state::StateSnapshot;
use crate::types::NodeId;

// ============================================================================
// Core Trait
// ============================================================================

/// Core trait defining executable graph nodes.
///
/// A `NodeHandler` represents a single unit of computation within a graph.
/// Handlers receive the current state snapshot and execution context, perform
/// their work, and return a [`NodeOutput`] describing the fields they want to
/// change and, optionally, where the run should go next.
///
/// # Design Principles
///
/// - **Stateless**: Handlers should be stateless and deterministic
/// - **Focused**: Each handler should have a single, well-defined responsibility
/// - **Composable**: Handlers should be easily combined into larger graphs
/// - **Observable**: Use the context to emit events for monitoring and debugging
///
/// # Error Handling
///
/// Handlers can handle errors in two ways:
/// 1. **Fatal errors**: Return `Err(NodeError)` to stop graph execution
/// 2. **Recoverable errors**: Add to `NodeOutput.errors` and return `Ok`
///
/// # Examples
///
/// ```rust,no_run
/// use stategraph::node::{NodeContext, NodeError, NodeHandler, NodeOutput};
/// use stategraph::state::StateSnapshot;
/// use async_trait::async_trait;
/// use serde_json::json;
///
/// struct ValidationNode {
///     required_fields: Vec<String>,
/// }
///
/// #[async_trait]
/// impl NodeHandler for ValidationNode {
///     async fn run(&self, snapshot: StateSnapshot, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
///         ctx.emit("validation", "Starting validation")?;
///
///         for field in &self.required_fields {
///             if snapshot.get(field).is_none() {
///                 return Err(NodeError::ValidationFailed(format!("Missing field: {}", field)));
///             }
///         }
///
///         Ok(NodeOutput::new().with_field("validated", json!(true)))
///     }
/// }
/// ```
#[async_trait]
pub trait NodeHandler: Send + Sync {
    /// Execute this node with the given state snapshot and context.
    async fn run(&self, snapshot: StateSnapshot, ctx: NodeContext)
        -> Result<NodeOutput, NodeError>;
}

// ============================================================================
// Execution Context
// ============================================================================

/// Execution context passed to nodes during graph execution.
///
/// Provides nodes with access to their execution environment, including step
/// information, node identity, and communication channels for observability.
#[derive(Clone, Debug)]
pub struct NodeContext {
    /// Unique identifier for this node instance.
    pub node_id: String,
    /// Current superstep number.
    pub step: u64,
    /// Channel for emitting events to the engine's event system.
    pub event_bus_sender: flume::Sender<Event>,
}

impl NodeContext {
    /// Emit a node-scoped event enriched with this context's metadata.
    ///
    /// Creates structured events that include the node's ID and step
    /// information, making them traceable in the execution log.
    pub fn emit(
        &self,
        scope: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<(), NodeContextError> {
        self.event_bus_sender
            .send(Event::node_message_with_meta(
                self.node_id.clone(),
                self.step,
                scope,
                message,
            ))
            .map_err(|_| NodeContextError::EventBusUnavailable)
    }
}

// ============================================================================
// State Updates
// ============================================================================

/// The outcome of one node execution.
///
/// Represents the changes a node wants to make to the shared state, plus an
/// optional explicit routing target. All fields are optional, allowing nodes
/// to update only the state aspects they care about. The merge barrier folds
/// field updates into the state through each field's reducer.
///
/// # Examples
///
/// ```rust
/// use stategraph::node::NodeOutput;
/// use stategraph::types::NodeId;
/// use stategraph::utils::collections::new_update_map;
/// use serde_json::json;
///
/// // Single-field update
/// let output = NodeOutput::new().with_field("status", json!("success"));
///
/// // Several fields at once
/// let mut update = new_update_map();
/// update.insert("status".to_string(), json!("success"));
/// update.insert("duration_ms".to_string(), json!(150));
/// let output = NodeOutput::new().with_update(update);
///
/// // Update plus an explicit routing decision that overrides static edges
/// let output = NodeOutput::new()
///     .with_field("validated", json!(true))
///     .with_next(NodeId::from("persist"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct NodeOutput {
    /// Field updates to merge into the shared state.
    pub update: Option<FxHashMap<String, serde_json::Value>>,
    /// Explicit routing target, overriding the node's static edges.
    pub next: Option<NodeId>,
    /// Recoverable errors to record in the run's execution metadata.
    pub errors: Option<Vec<ErrorEvent>>,
}

impl NodeOutput {
    pub fn new() -> Self {
        Self {
            ..Default::default()
        }
    }

    /// Create a `NodeOutput` with a full update map.
    #[must_use]
    pub fn with_update(mut self, update: FxHashMap<String, serde_json::Value>) -> Self {
        self.update = Some(update);
        self
    }

    /// Add or overwrite a single field in the update map.
    #[must_use]
    pub fn with_field(mut self, field: impl Into<String>, value: serde_json::Value) -> Self {
        self.update
            .get_or_insert_with(FxHashMap::default)
            .insert(field.into(), value);
        self
    }

    /// Create a `NodeOutput` with an explicit routing target.
    #[must_use]
    pub fn with_next(mut self, next: impl Into<NodeId>) -> Self {
        self.next = Some(next.into());
        self
    }

    /// Create a `NodeOutput` with one or more recoverable errors.
    #[must_use]
    pub fn with_errors(mut self, errors: Vec<ErrorEvent>) -> Self {
        self.errors = Some(errors);
        self
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur when using NodeContext methods.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeContextError {
    /// Event could not be sent due to event bus disconnection or capacity issues.
    #[error("failed to emit event: event bus unavailable")]
    #[diagnostic(
        code(stategraph::node::event_bus_unavailable),
        help("The event bus may be disconnected or at capacity. Check engine state.")
    )]
    EventBusUnavailable,
}

/// Errors that can occur during node execution.
///
/// `NodeError` represents fatal errors that should halt graph execution.
/// For recoverable errors that should be tracked but not halt execution,
/// use `NodeOutput.errors` instead.
#[derive(Debug, Error, Diagnostic)]
pub enum NodeError {
    /// Expected input data is missing from the state snapshot.
    #[error("missing expected input: {what}")]
    #[diagnostic(
        code(stategraph::node::missing_input),
        help("Check that the previous node produced the required data.")
    )]
    MissingInput { what: &'static str },

    /// External provider or service error.
    #[error("provider error ({provider}): {message}")]
    #[diagnostic(code(stategraph::node::provider))]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// JSON serialization/deserialization error.
    #[error(transparent)]
    #[diagnostic(code(stategraph::node::serde_json))]
    Serde(#[from] serde_json::Error),

    /// Input validation failed.
    #[error("validation failed: {0}")]
    #[diagnostic(
        code(stategraph::node::validation),
        help("Check input data format and required fields.")
    )]
    ValidationFailed(String),

    /// Event bus communication error.
    #[error("event bus error: {0}")]
    #[diagnostic(code(stategraph::node::event_bus))]
    EventBus(#[from] NodeContextError),
}
