use super::{Reducer, ReducerError};
use crate::utils::json_ext::{deep_merge, value_type_name, MergeStrategy};
use serde_json::Value;

/// Deep-merges JSON object updates into a JSON object field.
///
/// Both the current value (when present) and the update must be objects;
/// anything else is a type mismatch. Nested objects merge recursively,
/// nested arrays concatenate, and colliding scalars take the update's value.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct MapMerge;

impl Reducer for MapMerge {
    fn apply(
        &self,
        field: &str,
        current: Option<&Value>,
        update: &Value,
    ) -> Result<Value, ReducerError> {
        if !update.is_object() {
            return Err(ReducerError::TypeMismatch {
                field: field.to_string(),
                expected: "object",
                got: value_type_name(update),
            });
        }
        let Some(current) = current else {
            return Ok(update.clone());
        };
        if !current.is_object() {
            return Err(ReducerError::TypeMismatch {
                field: field.to_string(),
                expected: "object",
                got: value_type_name(current),
            });
        }
        deep_merge(current, update, MergeStrategy::DeepMerge).map_err(|e| ReducerError::Apply {
            field: field.to_string(),
            message: e.to_string(),
        })
    }
}
