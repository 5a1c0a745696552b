#![allow(dead_code)]

use serde_json::Value;
use stategraph::state::GraphState;

pub fn assert_field(state: &GraphState, field: &str, expected: &Value) {
    assert_eq!(
        state.get(field),
        Some(expected),
        "expected field {field:?} to be {expected}, got {:?}",
        state.get(field)
    );
}

pub fn assert_version(state: &GraphState, field: &str, expected: u32) {
    assert_eq!(
        state.version(field),
        expected,
        "expected field {field:?} at version {expected}, got {}",
        state.version(field)
    );
}
