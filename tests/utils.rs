use serde_json::json;
use stategraph::utils::collections::{
    UpdateMapExt, merge_update_maps, new_update_map, update_map_from_pairs,
};
use stategraph::utils::id_generator::{IdConfig, IdGenerator};
use stategraph::utils::json_ext::{
    JsonError, MergeStrategy, deep_merge, get_by_path, set_by_path, value_type_name,
};

#[test]
fn deep_merge_combines_objects_recursively() {
    let left = json!({"a": 1, "b": {"x": 10}, "tags": ["l"]});
    let right = json!({"b": {"y": 20}, "c": 3, "tags": ["r"]});

    let merged = deep_merge(&left, &right, MergeStrategy::DeepMerge).unwrap();
    assert_eq!(
        merged,
        json!({"a": 1, "b": {"x": 10, "y": 20}, "c": 3, "tags": ["l", "r"]})
    );
}

#[test]
fn deep_merge_prefers_the_right_scalar() {
    let merged = deep_merge(&json!({"n": 1}), &json!({"n": 2}), MergeStrategy::DeepMerge).unwrap();
    assert_eq!(merged, json!({"n": 2}));
}

#[test]
fn prefer_left_and_prefer_right_resolve_conflicts() {
    let left = json!({"n": 1, "arr": [1]});
    let right = json!({"n": 2, "arr": [2]});

    let kept = deep_merge(&left, &right, MergeStrategy::PreferLeft).unwrap();
    assert_eq!(kept, json!({"n": 1, "arr": [1]}));

    let replaced = deep_merge(&left, &right, MergeStrategy::PreferRight).unwrap();
    assert_eq!(replaced, json!({"n": 2, "arr": [2]}));
}

#[test]
fn fail_on_conflict_reports_the_colliding_path() {
    let left = json!({"outer": {"inner": 1}});
    let right = json!({"outer": {"inner": "text"}});

    let err = deep_merge(&left, &right, MergeStrategy::FailOnConflict).unwrap_err();
    match err {
        JsonError::MergeConflict {
            path,
            left_type,
            right_type,
        } => {
            assert_eq!(path, "outer.inner");
            assert_eq!(left_type, "number");
            assert_eq!(right_type, "string");
        }
        other => panic!("expected merge conflict, got {other:?}"),
    }
}

#[test]
fn fail_on_conflict_allows_equal_values() {
    let merged = deep_merge(
        &json!({"n": 1}),
        &json!({"n": 1}),
        MergeStrategy::FailOnConflict,
    )
    .unwrap();
    assert_eq!(merged, json!({"n": 1}));
}

#[test]
fn get_by_path_walks_objects_and_arrays() {
    let data = json!({"user": {"aliases": ["primary", "backup"], "age": 30}});
    assert_eq!(get_by_path(&data, "user.age"), Some(&json!(30)));
    assert_eq!(get_by_path(&data, "user.aliases.1"), Some(&json!("backup")));
    assert_eq!(get_by_path(&data, ""), Some(&data));
    assert_eq!(get_by_path(&data, "user.missing"), None);
    assert_eq!(get_by_path(&data, "user.age.deeper"), None);
}

#[test]
fn set_by_path_creates_intermediate_objects() {
    let mut data = json!({});
    set_by_path(&mut data, "user.profile.name", json!("Alice")).unwrap();
    assert_eq!(data, json!({"user": {"profile": {"name": "Alice"}}}));

    set_by_path(&mut data, "user.profile.name", json!("Bob")).unwrap();
    assert_eq!(data["user"]["profile"]["name"], json!("Bob"));
}

#[test]
fn set_by_path_rejects_non_object_intermediates() {
    let mut data = json!({"user": "scalar"});
    let err = set_by_path(&mut data, "user.profile.name", json!("Alice")).unwrap_err();
    assert!(
        matches!(err, JsonError::InvalidPointer { ref pointer } if pointer == "user.profile.name")
    );
}

#[test]
fn value_type_names_cover_every_variant() {
    assert_eq!(value_type_name(&json!(null)), "null");
    assert_eq!(value_type_name(&json!(true)), "boolean");
    assert_eq!(value_type_name(&json!(1.5)), "number");
    assert_eq!(value_type_name(&json!("s")), "string");
    assert_eq!(value_type_name(&json!([])), "array");
    assert_eq!(value_type_name(&json!({})), "object");
}

#[test]
fn update_map_typed_accessors_round_trip() {
    let mut update = new_update_map();
    update.insert_string("status", "classified");
    update.insert_number("confidence", 92);
    update.insert_bool("cached", false);

    assert_eq!(update.get_string("status"), Some("classified"));
    assert_eq!(update.get_number("confidence"), Some(92.into()));
    assert_eq!(update.get_bool("cached"), Some(false));
    // Wrong-typed reads come back empty rather than panicking.
    assert_eq!(update.get_string("confidence"), None);
    assert_eq!(update.get_bool("missing"), None);
}

#[test]
fn later_update_maps_win_on_collision() {
    let first = update_map_from_pairs([("shared", json!(1)), ("only_first", json!("a"))]);
    let second = update_map_from_pairs([("shared", json!(2))]);

    let merged = merge_update_maps([&first, &second]);
    assert_eq!(merged.get("shared"), Some(&json!(2)));
    assert_eq!(merged.get("only_first"), Some(&json!("a")));
    assert_eq!(merged.len(), 2);
}

#[test]
fn generated_ids_carry_their_domain_prefix() {
    let ids = IdGenerator::new();
    assert!(ids.generate_run_id().starts_with("run-"));
    assert!(ids.generate_session_id().starts_with("session-"));
    assert!(ids.generate_record_id().starts_with("mem-"));
    assert_ne!(ids.generate_id(), ids.generate_id());
}

#[test]
fn seeded_generators_are_reproducible() {
    let config = IdConfig {
        prefix: Some("fixture".to_string()),
        seed: Some(42),
        use_counter: true,
    };
    let first = IdGenerator::with_config(config.clone());
    let second = IdGenerator::with_config(config);

    let a: Vec<String> = (0..3).map(|_| first.generate_id()).collect();
    let b: Vec<String> = (0..3).map(|_| second.generate_id()).collect();
    assert_eq!(a, b);
    assert!(a[0].starts_with("fixture-"));
    assert!(a[0].ends_with("-0"));
    assert!(a[2].ends_with("-2"));
    // The seeded sequence advances; consecutive ids differ.
    assert_ne!(a[0], a[1]);
}
