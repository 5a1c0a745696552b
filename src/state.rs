//! State management for graph execution.
//!
//! Workflow state is an open mapping from field name to JSON value, with a
//! per-field version counter used for change detection and step reporting.
//! Nodes never mutate state directly: they return partial updates that the
//! engine merges through each field's configured reducer, bumping the
//! field's version whenever a merge changes it.
//!
//! # Core Types
//!
//! - [`GraphState`]: the authoritative field map plus version counters
//! - [`StateSnapshot`]: immutable, owned copy handed to node handlers
//! - [`GraphStateBuilder`]: fluent construction of seeded initial state
//!
//! # Examples
//!
//! ```rust
//! use stategraph::state::GraphState;
//! use serde_json::json;
//!
//! let mut state = GraphState::new_with_input("What is the BTC price?");
//! state.set("user_id", json!("user123"));
//!
//! let snapshot = state.snapshot();
//! assert_eq!(snapshot.get("user_id"), Some(&json!("user123")));
//! assert_eq!(snapshot.field_str("input"), Some("What is the BTC price?"));
//! ```

use rustc_hash::FxHashMap;
use serde_json::{Value, json};

/// Conventional field name the agent wrapper seeds with the user request.
pub const INPUT_FIELD: &str = "input";

/// The authoritative state container for a workflow run.
///
/// Fields are free-form JSON values keyed by name. Each field carries a
/// version counter: seeded fields start at 1, and every merge barrier that
/// changes a field bumps its version by exactly one. Versions make step
/// reports and checkpoints self-describing without diffing values.
///
/// # Examples
///
/// ```rust
/// use stategraph::state::GraphState;
/// use serde_json::json;
///
/// let mut state = GraphState::new();
/// state.set("counter", json!(0));
/// assert_eq!(state.version("counter"), 1);
///
/// state.set("counter", json!(1));
/// assert_eq!(state.version("counter"), 2);
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GraphState {
    values: FxHashMap<String, Value>,
    versions: FxHashMap<String, u32>,
}

impl GraphState {
    /// Create an empty state with no fields.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a state seeded with the conventional `input` field.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use stategraph::state::GraphState;
    ///
    /// let state = GraphState::new_with_input("hello");
    /// assert_eq!(state.snapshot().field_str("input"), Some("hello"));
    /// ```
    #[must_use]
    pub fn new_with_input(input: impl Into<String>) -> Self {
        let mut state = Self::new();
        state.set(INPUT_FIELD, json!(input.into()));
        state
    }

    /// Create a state from an existing field map; every field starts at
    /// version 1.
    #[must_use]
    pub fn from_values(values: FxHashMap<String, Value>) -> Self {
        let versions = values.keys().map(|k| (k.clone(), 1)).collect();
        Self { values, versions }
    }

    /// Start building a seeded state fluently.
    #[must_use]
    pub fn builder() -> GraphStateBuilder {
        GraphStateBuilder::default()
    }

    /// Current value of a field, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Current version of a field; 0 for fields that do not exist yet.
    #[must_use]
    pub fn version(&self, field: &str) -> u32 {
        self.versions.get(field).copied().unwrap_or(0)
    }

    /// Set a field directly, bumping its version.
    ///
    /// This is the seeding/bookkeeping entry point for code that owns the
    /// state (initial setup, the agent wrapper). Node handlers must return
    /// partial updates instead; the engine merges those through reducers.
    pub fn set(&mut self, field: impl Into<String>, value: Value) -> &mut Self {
        let field = field.into();
        let next = self.version(&field).saturating_add(1);
        self.values.insert(field.clone(), value);
        self.versions.insert(field, next);
        self
    }

    /// Iterate field names in arbitrary order.
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    /// Number of fields currently present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// `true` when no fields are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Owned copy of the field map.
    #[must_use]
    pub fn values(&self) -> FxHashMap<String, Value> {
        self.values.clone()
    }

    /// Owned copy of the version map.
    #[must_use]
    pub fn versions(&self) -> FxHashMap<String, u32> {
        self.versions.clone()
    }

    /// Take an immutable snapshot for handing to node handlers.
    ///
    /// The snapshot owns deep clones; nothing a handler does to it can
    /// affect the authoritative state.
    #[must_use]
    pub fn snapshot(&self) -> StateSnapshot {
        StateSnapshot {
            values: self.values.clone(),
            versions: self.versions.clone(),
        }
    }

    /// Write a field without touching its version. Barrier internals only;
    /// the barrier decides afterwards whether the field changed.
    pub(crate) fn write_raw(&mut self, field: &str, value: Value) {
        self.values.insert(field.to_string(), value);
    }

    /// Force a field's version. Barrier internals only.
    pub(crate) fn set_version(&mut self, field: &str, version: u32) {
        self.versions.insert(field.to_string(), version);
    }

    /// Rebuild from persisted parts. Versions for unknown fields default
    /// to 1 so older checkpoints stay loadable.
    pub(crate) fn from_parts(
        values: FxHashMap<String, Value>,
        mut versions: FxHashMap<String, u32>,
    ) -> Self {
        for field in values.keys() {
            versions.entry(field.clone()).or_insert(1);
        }
        Self { values, versions }
    }
}

/// Immutable snapshot of [`GraphState`] at one point in time.
///
/// Handed by value to node handlers and routing predicates; all members of
/// a parallel group receive clones of the same snapshot.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StateSnapshot {
    /// Field values at snapshot time.
    pub values: FxHashMap<String, Value>,
    /// Field versions at snapshot time.
    pub versions: FxHashMap<String, u32>,
}

impl StateSnapshot {
    /// Value of a field, if present.
    #[must_use]
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// String contents of a field, when the field holds a JSON string.
    #[must_use]
    pub fn field_str(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(Value::as_str)
    }

    /// Version of a field; 0 for absent fields.
    #[must_use]
    pub fn version(&self, field: &str) -> u32 {
        self.versions.get(field).copied().unwrap_or(0)
    }
}

/// Fluent builder for seeded initial state.
///
/// # Examples
///
/// ```rust
/// use stategraph::state::GraphState;
/// use serde_json::json;
///
/// let state = GraphState::builder()
///     .with_input("analyze BTC")
///     .with_value("user_id", json!("u-42"))
///     .build();
///
/// assert_eq!(state.version("input"), 1);
/// assert_eq!(state.version("user_id"), 1);
/// ```
#[derive(Debug, Default)]
pub struct GraphStateBuilder {
    values: FxHashMap<String, Value>,
}

impl GraphStateBuilder {
    /// Seed the conventional `input` field.
    #[must_use]
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.values.insert(INPUT_FIELD.to_string(), json!(input.into()));
        self
    }

    /// Seed an arbitrary field.
    #[must_use]
    pub fn with_value(mut self, field: impl Into<String>, value: Value) -> Self {
        self.values.insert(field.into(), value);
        self
    }

    /// Finish building; every seeded field starts at version 1.
    #[must_use]
    pub fn build(self) -> GraphState {
        GraphState::from_values(self.values)
    }
}
