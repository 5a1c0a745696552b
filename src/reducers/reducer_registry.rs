use rustc_hash::FxHashMap;
use std::sync::Arc;

use crate::reducers::{LastWrite, Reducer, ReducerError};
use serde_json::Value;
use tracing::instrument;

/// Maps state fields to the reducer that merges updates into them.
///
/// Fields without an explicit registration fall back to the default
/// reducer, [`LastWrite`].
#[derive(Clone)]
pub struct ReducerRegistry {
    reducer_map: FxHashMap<String, Arc<dyn Reducer>>,
    default: Arc<dyn Reducer>,
}

impl std::fmt::Debug for ReducerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReducerRegistry")
            .field(
                "fields",
                &self.reducer_map.keys().collect::<Vec<_>>(),
            )
            .finish_non_exhaustive()
    }
}

impl Default for ReducerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ReducerRegistry {
    /// Creates a registry with no per-field reducers and `LastWrite` as the
    /// fallback.
    pub fn new() -> Self {
        Self {
            reducer_map: FxHashMap::default(),
            default: Arc::new(LastWrite),
        }
    }

    /// Registers a reducer for a specific state field.
    ///
    /// Registering a field twice replaces the earlier reducer; the merge
    /// barrier consults exactly one reducer per field.
    ///
    /// # Parameters
    /// - `field`: The state field to register the reducer for
    /// - `reducer`: The reducer implementation wrapped in Arc
    ///
    /// # Returns
    /// A mutable reference to self for method chaining
    pub fn register<S: Into<String>>(&mut self, field: S, reducer: Arc<dyn Reducer>) -> &mut Self {
        self.reducer_map.insert(field.into(), reducer);
        self
    }

    /// Builder-style method for registering a reducer.
    ///
    /// This is a convenience method that consumes self and returns it,
    /// enabling fluent API usage when constructing a ReducerRegistry.
    ///
    /// # Parameters
    /// - `field`: The state field to register the reducer for
    /// - `reducer`: The reducer implementation wrapped in Arc
    ///
    /// # Returns
    /// Self for method chaining
    ///
    /// # Examples
    /// ```
    /// use std::sync::Arc;
    /// use stategraph::reducers::{Append, ReducerRegistry};
    ///
    /// let registry = ReducerRegistry::new().with_reducer("messages", Arc::new(Append));
    /// ```
    #[must_use]
    pub fn with_reducer<S: Into<String>>(mut self, field: S, reducer: Arc<dyn Reducer>) -> Self {
        self.register(field, reducer);
        self
    }

    /// Replaces the fallback reducer used for unregistered fields.
    #[must_use]
    pub fn with_default(mut self, reducer: Arc<dyn Reducer>) -> Self {
        self.default = reducer;
        self
    }

    /// The reducer that will merge updates for `field`.
    #[must_use]
    pub fn reducer_for(&self, field: &str) -> &dyn Reducer {
        self.reducer_map
            .get(field)
            .map(|r| r.as_ref())
            .unwrap_or(self.default.as_ref())
    }

    /// Whether `field` has an explicitly registered reducer.
    #[must_use]
    pub fn has_reducer(&self, field: &str) -> bool {
        self.reducer_map.contains_key(field)
    }

    /// Folds one update into the current value of `field` using the
    /// registered (or default) reducer.
    #[instrument(skip(self, current, update), err)]
    pub fn apply_field(
        &self,
        field: &str,
        current: Option<&Value>,
        update: &Value,
    ) -> Result<Value, ReducerError> {
        self.reducer_for(field).apply(field, current, update)
    }
}
