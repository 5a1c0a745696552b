/*!
Persistence primitives for serializing/deserializing runtime state and
checkpoints (used by the SQLite checkpointer and any future persistent
backends).

Design Goals:
- Provide explicit serde-friendly structs decoupled from internal
  in-memory representations.
- Keep conversion logic localized (From / TryFrom impls) so the
  checkpointer code is lean and declarative.
- Allow forward compatibility (fields absent from older rows default,
  and versions missing for a field fall back to 1 on restore).

This module intentionally does NOT perform I/O. It is pure data
transformation and (de)serialization glue.
*/

use chrono::Utc;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    runtimes::checkpointer::Checkpoint, state::GraphState, types::NodeId,
    utils::json_ext::JsonSerializable,
};

/// Blanket implementation of JsonSerializable for all suitable types using PersistenceError.
impl<T> JsonSerializable<PersistenceError> for T
where
    T: serde::Serialize + for<'de> serde::de::DeserializeOwned,
{
    fn to_json_string(&self) -> std::result::Result<String, PersistenceError> {
        serde_json::to_string(self).map_err(|e| PersistenceError::Serde { source: e })
    }

    fn from_json_str(s: &str) -> std::result::Result<Self, PersistenceError> {
        serde_json::from_str(s).map_err(|e| PersistenceError::Serde { source: e })
    }
}

/// Complete persisted shape of the in-memory [`GraphState`]: the field map
/// plus one version counter per field.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PersistedState {
    #[serde(default)]
    pub values: FxHashMap<String, Value>,
    #[serde(default)]
    pub versions: FxHashMap<String, u32>,
}

/// Full persisted checkpoint representation.
/// (Step history tables may store multiple instances of this shape.)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PersistedCheckpoint {
    pub session_id: String,
    pub step: u64,
    pub state: PersistedState,
    /// Cursor encoded as a string using NodeId::encode().
    pub cursor: String,
    /// Fields the merge barrier changed at this step.
    #[serde(default)]
    pub updated_fields: Vec<String>,
    pub concurrency_limit: usize,
    /// RFC3339 string form of creation time (keeps chrono::DateTime out of serialized shape).
    pub created_at: String,
}

use miette::Diagnostic;
use thiserror::Error;

/// Bidirectional conversion and serialization errors for persistence models.
#[derive(Debug, Error, Diagnostic)]
pub enum PersistenceError {
    #[error("missing field: {0}")]
    #[diagnostic(
        code(stategraph::persistence::missing_field),
        help("Populate the field in the persisted JSON before conversion.")
    )]
    MissingField(&'static str),

    #[error("JSON serialization/deserialization failed: {source}")]
    #[diagnostic(
        code(stategraph::persistence::serde),
        help("Ensure the JSON structure matches Persisted* types.")
    )]
    Serde {
        #[source]
        source: serde_json::Error,
    },

    #[error("persistence error: {0}")]
    #[diagnostic(code(stategraph::persistence::other))]
    Other(String),
}

pub type Result<T> = std::result::Result<T, PersistenceError>;

/* ---------- GraphState <-> PersistedState Conversions ---------- */

impl From<&GraphState> for PersistedState {
    fn from(s: &GraphState) -> Self {
        PersistedState {
            values: s.values(),
            versions: s.versions(),
        }
    }
}

impl TryFrom<PersistedState> for GraphState {
    type Error = PersistenceError;

    fn try_from(p: PersistedState) -> Result<Self> {
        Ok(GraphState::from_parts(p.values, p.versions))
    }
}

/* ---------- Checkpoint <-> PersistedCheckpoint Conversions ---------- */

impl From<&Checkpoint> for PersistedCheckpoint {
    fn from(cp: &Checkpoint) -> Self {
        PersistedCheckpoint {
            session_id: cp.session_id.clone(),
            step: cp.step,
            state: PersistedState::from(&cp.state),
            cursor: cp.cursor.encode(),
            updated_fields: cp.updated_fields.clone(),
            concurrency_limit: cp.concurrency_limit,
            created_at: cp.created_at.to_rfc3339(),
        }
    }
}

impl TryFrom<PersistedCheckpoint> for Checkpoint {
    type Error = PersistenceError;

    fn try_from(p: PersistedCheckpoint) -> Result<Self> {
        let state = GraphState::try_from(p.state)?;
        let cursor = NodeId::decode(&p.cursor);
        let parsed_dt = chrono::DateTime::parse_from_rfc3339(&p.created_at)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        Ok(Checkpoint {
            session_id: p.session_id,
            step: p.step,
            state,
            cursor,
            updated_fields: p.updated_fields,
            concurrency_limit: p.concurrency_limit,
            created_at: parsed_dt,
        })
    }
}

/* ---------- Convenience JSON helpers (using JsonSerializable trait from utils::json_ext) ---------- */

// Both PersistedState and PersistedCheckpoint automatically implement JsonSerializable
// through the blanket implementation above, providing to_json_string() and from_json_str() methods.

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn state_round_trips_with_versions() {
        let mut state = GraphState::new_with_input("hello");
        state.set("count", json!(3));

        let persisted = PersistedState::from(&state);
        let json = persisted.to_json_string().unwrap();
        let back = PersistedState::from_json_str(&json).unwrap();
        let restored = GraphState::try_from(back).unwrap();

        assert_eq!(restored.get("count"), Some(&json!(3)));
        assert_eq!(restored.version("count"), state.version("count"));
    }

    #[test]
    fn legacy_state_without_versions_defaults_to_one() {
        let raw = r#"{"values":{"input":"hi","notes":["a"]}}"#;
        let persisted = PersistedState::from_json_str(raw).unwrap();
        let restored = GraphState::try_from(persisted).unwrap();

        assert_eq!(restored.version("input"), 1);
        assert_eq!(restored.version("notes"), 1);
    }

    #[test]
    fn checkpoint_round_trips_cursor_encoding() {
        let mut state = GraphState::new();
        state.set("summary", json!("done"));
        let cp = Checkpoint {
            session_id: "sess".into(),
            step: 4,
            state,
            cursor: NodeId::from("publish"),
            updated_fields: vec!["summary".into()],
            concurrency_limit: 2,
            created_at: Utc::now(),
        };

        let persisted = PersistedCheckpoint::from(&cp);
        assert_eq!(persisted.cursor, "Named:publish");

        let restored = Checkpoint::try_from(persisted).unwrap();
        assert_eq!(restored.cursor, NodeId::from("publish"));
        assert_eq!(restored.updated_fields, vec!["summary".to_string()]);
        assert_eq!(restored.step, 4);
    }

    #[test]
    fn end_cursor_round_trips_through_sentinel() {
        let cp = Checkpoint {
            session_id: "sess".into(),
            step: 9,
            state: GraphState::new(),
            cursor: NodeId::End,
            updated_fields: vec![],
            concurrency_limit: 1,
            created_at: Utc::now(),
        };

        let persisted = PersistedCheckpoint::from(&cp);
        let restored = Checkpoint::try_from(persisted).unwrap();
        assert_eq!(restored.cursor, NodeId::End);
    }
}
