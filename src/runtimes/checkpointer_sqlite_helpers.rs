//! JSON glue for the SQLite checkpointer's TEXT columns.
//!
//! Every persisted blob goes through these helpers so serialization
//! failures always surface as [`CheckpointerError`] with the column that
//! produced them.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::runtimes::checkpointer::{CheckpointerError, Result};

pub(super) fn serialize_json<T: Serialize>(value: &T, what: &'static str) -> Result<String> {
    serde_json::to_string(value).map_err(|e| CheckpointerError::Serialization {
        what,
        message: e.to_string(),
    })
}

pub(super) fn deserialize_json<T: DeserializeOwned>(payload: &str, what: &'static str) -> Result<T> {
    serde_json::from_str(payload).map_err(|e| CheckpointerError::Serialization {
        what,
        message: e.to_string(),
    })
}

/// Unwrap a nullable column that must be present once a checkpoint exists.
pub(super) fn require_json_field(
    field: Option<String>,
    session_id: &str,
    what: &'static str,
) -> Result<String> {
    field.ok_or_else(|| CheckpointerError::CorruptRow {
        session_id: session_id.to_string(),
        what,
    })
}
