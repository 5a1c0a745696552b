//! Tool invocation for graphs that let nodes request side effects.
//!
//! A tool node reads pending [`ToolCall`]s from the shared state, executes
//! them against a [`ToolRegistry`], and writes [`ToolResult`]s back. Failures
//! of individual calls are captured as data in the result rather than
//! aborting the run, so downstream nodes can inspect and react to them.

use async_trait::async_trait;
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// State field a tool node reads pending calls from.
pub const TOOL_CALLS_FIELD: &str = "tool_calls";
/// State field a tool node writes results to.
pub const TOOL_RESULTS_FIELD: &str = "tool_results";

/// A named capability that a graph can invoke with JSON arguments.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Registry key for this tool.
    fn name(&self) -> &str;

    /// Human-readable description of what the tool does.
    fn description(&self) -> &str {
        ""
    }

    /// Execute the tool with the given arguments.
    async fn execute(&self, args: Value) -> Result<Value, ToolError>;
}

/// A pending request to execute one tool, as stored in the `tool_calls`
/// state field.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolCall {
    /// Caller-assigned correlation id, carried through to the result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Tool name to invoke.
    pub name: String,
    /// Tool arguments (JSON value, typically an object).
    #[serde(default)]
    pub args: Value,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        Self {
            id: None,
            name: name.into(),
            args,
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Deserialize the `tool_calls` state field into calls.
    pub fn parse_all(value: &Value) -> Result<Vec<ToolCall>, ToolError> {
        serde_json::from_value(value.clone()).map_err(|e| ToolError::MalformedCalls {
            message: e.to_string(),
        })
    }
}

/// The outcome of one tool call, as written to the `tool_results` state
/// field.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    /// Whether the call succeeded. On `false`, `error` holds the reason.
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    pub fn success(call: &ToolCall, value: Value) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            ok: true,
            value: Some(value),
            error: None,
        }
    }

    pub fn failure(call: &ToolCall, error: impl Into<String>) -> Self {
        Self {
            id: call.id.clone(),
            name: call.name.clone(),
            ok: false,
            value: None,
            error: Some(error.into()),
        }
    }
}

/// Collection of tools available to a tool node.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: FxHashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: FxHashMap::default(),
        }
    }

    /// Build a registry from an iterator of tools.
    pub fn from_tools<I>(tools: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Tool>>,
    {
        let mut registry = Self::new();
        for tool in tools {
            registry.register(tool);
        }
        registry
    }

    /// Registers a tool under its own name. Re-registering a name replaces
    /// the earlier tool.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> &mut Self {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "tool replaced an existing registration");
        }
        self
    }

    /// Builder-style registration for fluent construction.
    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    /// Registered tool names, sorted for stable error messages.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a single call, converting any failure into a failed
    /// [`ToolResult`] instead of an error.
    #[instrument(skip(self, call), fields(tool = %call.name))]
    pub async fn execute_call(&self, call: &ToolCall) -> ToolResult {
        let Some(tool) = self.tools.get(&call.name) else {
            return ToolResult::failure(
                call,
                ToolError::NotFound {
                    name: call.name.clone(),
                    available: self.names().join(", "),
                }
                .to_string(),
            );
        };
        match tool.execute(call.args.clone()).await {
            Ok(value) => ToolResult::success(call, value),
            Err(err) => ToolResult::failure(call, err.to_string()),
        }
    }

    /// Execute calls one at a time, in the order they were requested.
    ///
    /// Sequential execution keeps results aligned with their calls and makes
    /// tool side effects deterministic within a superstep.
    pub async fn execute_all(&self, calls: &[ToolCall]) -> Vec<ToolResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            results.push(self.execute_call(call).await);
        }
        results
    }
}

/// Errors surfaced by tool lookup and execution.
#[derive(Debug, Error, Diagnostic)]
pub enum ToolError {
    /// Requested tool is not registered.
    #[error("tool {name:?} not found (available: {available})")]
    #[diagnostic(
        code(stategraph::tools::not_found),
        help("Register the tool on the node's ToolRegistry before running the graph.")
    )]
    NotFound { name: String, available: String },

    /// The `tool_calls` state field did not deserialize into calls.
    #[error("malformed tool_calls field: {message}")]
    #[diagnostic(
        code(stategraph::tools::malformed_calls),
        help("tool_calls must be a JSON array of {{\"name\", \"args\", optional \"id\"}} objects.")
    )]
    MalformedCalls { message: String },

    /// Arguments failed the tool's own validation.
    #[error("invalid arguments for tool {tool:?}: {message}")]
    #[diagnostic(code(stategraph::tools::invalid_arguments))]
    InvalidArguments { tool: String, message: String },

    /// The tool ran and reported a failure.
    #[error("tool {tool:?} execution failed: {message}")]
    #[diagnostic(code(stategraph::tools::execution))]
    Execution { tool: String, message: String },
}
