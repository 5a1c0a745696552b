mod append;
mod last_write;
mod map_merge;
mod reducer_registry;

pub use append::Append;
pub use last_write::LastWrite;
pub use map_merge::MapMerge;
pub use reducer_registry::*;

use serde_json::Value;
use std::fmt;

/// Unified reducer trait: every reducer folds one update into the current
/// value of a single state field and returns the new value.
///
/// Reducers never see the whole state. The merge barrier hands them the
/// field name (for error reporting), the field's current value if any, and
/// one node's update for that field.
pub trait Reducer: Send + Sync {
    fn apply(
        &self,
        field: &str,
        current: Option<&Value>,
        update: &Value,
    ) -> Result<Value, ReducerError>;
}

#[derive(Debug)]
pub enum ReducerError {
    TypeMismatch {
        field: String,
        expected: &'static str,
        got: &'static str,
    },

    Apply {
        field: String,
        message: String,
    },
}

impl fmt::Display for ReducerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReducerError::TypeMismatch {
                field,
                expected,
                got,
            } => {
                write!(
                    f,
                    "reducer for field {field:?} expected {expected}, got {got}"
                )
            }
            ReducerError::Apply { field, message } => {
                write!(f, "reducer apply failed for field {field:?}: {message}")
            }
        }
    }
}

impl std::error::Error for ReducerError {}
