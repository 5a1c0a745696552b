use super::{Reducer, ReducerError};
use serde_json::Value;

/// Default reducer: the incoming update replaces whatever was there.
#[derive(Debug, PartialEq, Clone, Hash, Eq)]
pub struct LastWrite;

impl Reducer for LastWrite {
    fn apply(
        &self,
        _field: &str,
        _current: Option<&Value>,
        update: &Value,
    ) -> Result<Value, ReducerError> {
        Ok(update.clone())
    }
}
