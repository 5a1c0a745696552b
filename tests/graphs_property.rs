#[macro_use]
extern crate proptest;

use proptest::prelude::{Strategy, prop};

mod common;
use common::*;

use std::sync::Arc;

use serde_json::{Value, json};
use stategraph::graphs::{EdgeGuard, GraphBuilder};
use stategraph::node::NodeOutput;
use stategraph::reducers::Reducer;
use stategraph::state::GraphState;
use stategraph::types::NodeId;

/// Generate valid custom node names.
///
/// Constraints:
/// - Starts with a letter
/// - Followed by 0..16 of [A-Za-z0-9_]
/// - Excludes the virtual endpoint names ("Start", "End")
fn node_name_strategy() -> impl Strategy<Value = String> {
    let base = prop::string::string_regex("[A-Za-z][A-Za-z0-9_]{0,16}").unwrap();
    base.prop_filter("exclude endpoint names", |s| s != "Start" && s != "End")
}

fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-z0-9_]{0,8}").unwrap()
}

fn block_on<F: std::future::Future<Output = ()>>(fut: F) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();
    rt.block_on(fut);
}

proptest! {
    #[test]
    fn prop_node_id_encoding_round_trips(name in node_name_strategy()) {
        let id = NodeId::from(name.as_str());
        prop_assert_eq!(id.clone(), NodeId::Named(name.clone()));
        prop_assert_eq!(NodeId::decode(&id.encode()), id);

        // Bare names without the "Named:" prefix still decode leniently.
        prop_assert_eq!(NodeId::decode(&name), NodeId::Named(name));
    }
}

proptest! {
    /// Property: applying the same outputs to two fresh states yields
    /// identical states, values and versions alike.
    #[test]
    fn prop_barrier_merges_deterministically(
        updates in prop::collection::vec((field_name_strategy(), 0i64..1000), 1..12),
    ) {
        block_on(async move {
            let app = GraphBuilder::new()
                .add_node("work", NoopNode)
                .set_entry_point("work")
                .add_edge("work", NodeId::End)
                .compile()
                .unwrap();

            let run_ids: Vec<NodeId> = (0..updates.len())
                .map(|i| NodeId::from(format!("n{i}").as_str()))
                .collect();
            let outputs: Vec<NodeOutput> = updates
                .iter()
                .map(|(field, value)| NodeOutput::new().with_field(field.clone(), json!(value)))
                .collect();

            let mut first = GraphState::new();
            let mut second = GraphState::new();
            let outcome_a = app
                .apply_barrier(&mut first, &run_ids, outputs.clone())
                .await
                .unwrap();
            let outcome_b = app
                .apply_barrier(&mut second, &run_ids, outputs)
                .await
                .unwrap();

            assert_eq!(first, second);
            assert_eq!(outcome_a.updated_fields, outcome_b.updated_fields);

            // Updated fields come back sorted.
            let mut sorted = outcome_a.updated_fields.clone();
            sorted.sort();
            assert_eq!(outcome_a.updated_fields, sorted);
        });
    }
}

proptest! {
    /// Property: barriers over disjoint fields commute. Folding update set
    /// A before B leaves the same values and versions as B before A.
    #[test]
    fn prop_disjoint_field_updates_commute(
        fields in prop::collection::hash_set(field_name_strategy(), 2..12),
        seed in 0i64..1000,
    ) {
        block_on(async move {
            let app = GraphBuilder::new()
                .add_node("work", NoopNode)
                .set_entry_point("work")
                .add_edge("work", NodeId::End)
                .compile()
                .unwrap();

            // Split one set of unique names in two, so A and B never share
            // a field.
            let fields: Vec<String> = fields.into_iter().collect();
            let split = fields.len() / 2;
            let output_for = |names: &[String], offset: i64| {
                let mut output = NodeOutput::new();
                for (i, name) in names.iter().enumerate() {
                    output = output.with_field(name.clone(), json!(seed + offset + i as i64));
                }
                output
            };
            let set_a = output_for(&fields[..split], 0);
            let set_b = output_for(&fields[split..], 100_000);
            let id_a = vec![NodeId::from("a")];
            let id_b = vec![NodeId::from("b")];

            let mut a_then_b = GraphState::new();
            app.apply_barrier(&mut a_then_b, &id_a, vec![set_a.clone()])
                .await
                .unwrap();
            app.apply_barrier(&mut a_then_b, &id_b, vec![set_b.clone()])
                .await
                .unwrap();

            let mut b_then_a = GraphState::new();
            app.apply_barrier(&mut b_then_a, &id_b, vec![set_b])
                .await
                .unwrap();
            app.apply_barrier(&mut b_then_a, &id_a, vec![set_a])
                .await
                .unwrap();

            assert_eq!(a_then_b, b_then_a);
            // Each field changed in exactly one barrier, whichever came
            // first.
            for field in &fields {
                assert_eq!(a_then_b.version(field), 1);
                assert_eq!(b_then_a.version(field), 1);
            }
        });
    }
}

proptest! {
    /// Property: the append reducer grows an array field by exactly the
    /// update's length and never reorders the existing prefix.
    #[test]
    fn prop_append_grows_by_the_update_length(
        current in prop::collection::vec(0i64..100, 0..10),
        update in prop::collection::vec(0i64..100, 0..10),
    ) {
        let existing = json!(current);
        let incoming = json!(update);

        let merged = stategraph::reducers::Append
            .apply("log", Some(&existing), &incoming)
            .unwrap();
        let Value::Array(items) = merged else {
            panic!("append must produce an array");
        };

        prop_assert_eq!(items.len(), current.len() + update.len());
        for (i, expected) in current.iter().enumerate() {
            prop_assert_eq!(&items[i], &json!(expected));
        }
        for (i, expected) in update.iter().enumerate() {
            prop_assert_eq!(&items[current.len() + i], &json!(expected));
        }
    }
}

proptest! {
    /// Property: a threshold guard routes to the guarded target exactly
    /// when the state satisfies it, and to the fallback otherwise.
    #[test]
    fn prop_guarded_edges_route_by_state(
        threshold in 0i64..100,
        score in 0i64..100,
    ) {
        block_on(async move {
            let guard: EdgeGuard = Arc::new(move |snapshot| {
                snapshot
                    .get("score")
                    .and_then(Value::as_i64)
                    .is_some_and(|n| n >= threshold)
            });

            let app = GraphBuilder::new()
                .add_node("root", NoopNode)
                .add_node("high", SetField::new("path", json!("high")))
                .add_node("low", SetField::new("path", json!("low")))
                .set_entry_point("root")
                .add_conditional_edge("root", "high", guard)
                .add_edge("root", "low")
                .add_edge("high", NodeId::End)
                .add_edge("low", NodeId::End)
                .compile()
                .unwrap();

            let initial = GraphState::builder()
                .with_value("score", json!(score))
                .build();
            let final_state = app.invoke(initial).await.unwrap();

            let expected = if score >= threshold { "high" } else { "low" };
            assert_field(&final_state, "path", &json!(expected));
        });
    }
}
