//! Collection helpers for building node update maps.
//!
//! Nodes report state changes as `FxHashMap<String, Value>` update maps.
//! These helpers keep node bodies short: typed inserts and reads without
//! spelling out `serde_json::Value` conversions at every call site.
//!
//! # Examples
//!
//! ```rust
//! use stategraph::utils::collections::{UpdateMapExt, new_update_map, update_map_from_pairs};
//! use serde_json::json;
//!
//! let mut update = new_update_map();
//! update.insert_string("status", "classified");
//! update.insert_number("confidence", 92);
//! update.insert_bool("cached", false);
//!
//! assert_eq!(update.get_string("status").unwrap(), "classified");
//!
//! let seeded = update_map_from_pairs([("attempts", json!(1))]);
//! assert_eq!(seeded.get("attempts"), Some(&json!(1)));
//! ```

use rustc_hash::FxHashMap;
use serde_json::Value;

/// Alias for the update map shape nodes hand back in their outputs.
pub type UpdateMap = FxHashMap<String, Value>;

/// Create an empty update map.
#[must_use]
pub fn new_update_map() -> UpdateMap {
    FxHashMap::default()
}

/// Build an update map from key/value pairs.
pub fn update_map_from_pairs<K, I>(pairs: I) -> UpdateMap
where
    K: Into<String>,
    I: IntoIterator<Item = (K, Value)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v))
        .collect()
}

/// Merge several update maps left to right; later maps win on key collisions.
pub fn merge_update_maps<'a, I>(maps: I) -> UpdateMap
where
    I: IntoIterator<Item = &'a UpdateMap>,
{
    let mut merged = new_update_map();
    for map in maps {
        for (k, v) in map {
            merged.insert(k.clone(), v.clone());
        }
    }
    merged
}

/// Typed insert/get sugar over an update map.
pub trait UpdateMapExt {
    fn insert_string(&mut self, key: impl Into<String>, value: impl Into<String>);
    fn insert_number(&mut self, key: impl Into<String>, value: impl Into<serde_json::Number>);
    fn insert_bool(&mut self, key: impl Into<String>, value: bool);

    fn get_string(&self, key: &str) -> Option<&str>;
    fn get_number(&self, key: &str) -> Option<serde_json::Number>;
    fn get_bool(&self, key: &str) -> Option<bool>;
}

impl UpdateMapExt for UpdateMap {
    fn insert_string(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.insert(key.into(), Value::String(value.into()));
    }

    fn insert_number(&mut self, key: impl Into<String>, value: impl Into<serde_json::Number>) {
        self.insert(key.into(), Value::Number(value.into()));
    }

    fn insert_bool(&mut self, key: impl Into<String>, value: bool) {
        self.insert(key.into(), Value::Bool(value));
    }

    fn get_string(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    fn get_number(&self, key: &str) -> Option<serde_json::Number> {
        match self.get(key) {
            Some(Value::Number(n)) => Some(n.clone()),
            _ => None,
        }
    }

    fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(Value::as_bool)
    }
}
