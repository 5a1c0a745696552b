use super::{Reducer, ReducerError};
use serde_json::Value;

/// Accumulates updates into a JSON array instead of overwriting.
///
/// Array updates are concatenated element by element; any other value is
/// appended as a single element. A missing or non-array current value is
/// promoted to an array first, so the field converges on `Value::Array`
/// regardless of what seeded it.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct Append;

impl Reducer for Append {
    fn apply(
        &self,
        _field: &str,
        current: Option<&Value>,
        update: &Value,
    ) -> Result<Value, ReducerError> {
        let mut merged = match current {
            Some(Value::Array(items)) => items.clone(),
            Some(other) => vec![other.clone()],
            None => Vec::new(),
        };
        match update {
            Value::Array(items) => merged.extend(items.iter().cloned()),
            other => merged.push(other.clone()),
        }
        Ok(Value::Array(merged))
    }
}
