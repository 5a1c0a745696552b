mod common;
use common::*;

use std::sync::Arc;

use serde_json::json;
use stategraph::graphs::{EdgeGuard, GraphBuilder, GraphCompileError, ParallelGroup};
use stategraph::types::{JoinStrategy, NodeId};

#[test]
fn linear_graph_compiles() {
    let app = linear_app();
    assert_eq!(app.nodes().len(), 1);
    assert!(app.edges().contains_key(&NodeId::Start));
}

#[test]
fn duplicate_node_name_is_rejected() {
    let err = GraphBuilder::new()
        .add_node("work", NoopNode)
        .add_node("work", NoopNode)
        .set_entry_point("work")
        .add_edge("work", NodeId::End)
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphCompileError::DuplicateNode { name } if name == "work"));
}

#[test]
fn group_name_colliding_with_node_is_rejected() {
    let err = GraphBuilder::new()
        .add_node("fan", NoopNode)
        .add_node("a", NoopNode)
        .add_node("b", NoopNode)
        .add_parallel_group(ParallelGroup::new(
            "fan",
            vec![NodeId::from("a"), NodeId::from("b")],
        ))
        .set_entry_point("fan")
        .add_edge("fan", NodeId::End)
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphCompileError::DuplicateNode { name } if name == "fan"));
}

#[test]
fn missing_entry_point_is_rejected() {
    let err = GraphBuilder::new()
        .add_node("work", NoopNode)
        .add_edge("work", NodeId::End)
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphCompileError::MissingEntryPoint));
}

#[test]
fn edge_to_unknown_node_is_rejected() {
    let err = GraphBuilder::new()
        .add_node("work", NoopNode)
        .set_entry_point("work")
        .add_edge("work", "ghost")
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphCompileError::UnknownNode { name, .. } if name == "ghost"));
}

#[test]
fn edge_leaving_end_is_rejected() {
    let err = GraphBuilder::new()
        .add_node("work", NoopNode)
        .set_entry_point("work")
        .add_edge("work", NodeId::End)
        .add_edge(NodeId::End, "work")
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphCompileError::InvalidEdge { from, .. } if from == "End"));
}

#[test]
fn edge_into_start_is_rejected() {
    let err = GraphBuilder::new()
        .add_node("work", NoopNode)
        .set_entry_point("work")
        .add_edge("work", NodeId::Start)
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphCompileError::InvalidEdge { to, .. } if to == "Start"));
}

#[test]
fn two_unguarded_edges_are_ambiguous() {
    let err = GraphBuilder::new()
        .add_node("fork", NoopNode)
        .add_node("a", NoopNode)
        .add_node("b", NoopNode)
        .set_entry_point("fork")
        .add_edge("fork", "a")
        .add_edge("fork", "b")
        .add_edge("a", NodeId::End)
        .add_edge("b", NodeId::End)
        .compile()
        .unwrap_err();
    assert!(
        matches!(err, GraphCompileError::AmbiguousFallback { node, count } if node == "fork" && count == 2)
    );
}

#[test]
fn guarded_edges_do_not_count_as_fallbacks() {
    let yes: EdgeGuard = Arc::new(|snap| snap.get("flag").is_some());
    let no: EdgeGuard = Arc::new(|snap| snap.get("flag").is_none());
    let app = GraphBuilder::new()
        .add_node("fork", NoopNode)
        .add_node("a", NoopNode)
        .add_node("b", NoopNode)
        .set_entry_point("fork")
        .add_conditional_edge("fork", "a", yes)
        .add_conditional_edge("fork", "b", no)
        .add_edge("a", NodeId::End)
        .add_edge("b", NodeId::End)
        .compile();
    assert!(app.is_ok());
}

#[test]
fn dead_end_node_is_rejected() {
    let err = GraphBuilder::new()
        .add_node("work", NoopNode)
        .add_node("sink", NoopNode)
        .set_entry_point("work")
        .add_edge("work", "sink")
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphCompileError::DeadEnd { node } if node == "sink"));
}

#[test]
fn terminal_marking_permits_no_outgoing_edges() {
    let app = GraphBuilder::new()
        .add_node("work", NoopNode)
        .add_node("sink", NoopNode)
        .set_entry_point("work")
        .add_edge("work", "sink")
        .mark_terminal("sink")
        .compile()
        .unwrap();
    assert!(app.is_terminal(&NodeId::from("sink")));
    assert!(!app.is_terminal(&NodeId::from("work")));
}

#[test]
fn terminal_marking_unknown_node_is_rejected() {
    let err = GraphBuilder::new()
        .add_node("work", NoopNode)
        .set_entry_point("work")
        .add_edge("work", NodeId::End)
        .mark_terminal("ghost")
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphCompileError::UnknownNode { name, .. } if name == "ghost"));
}

#[test]
fn group_with_one_member_is_rejected() {
    let err = GraphBuilder::new()
        .add_node("only", NoopNode)
        .add_parallel_group(ParallelGroup::new("fan", vec![NodeId::from("only")]))
        .set_entry_point("fan")
        .add_edge("fan", NodeId::End)
        .compile()
        .unwrap_err();
    assert!(
        matches!(err, GraphCompileError::GroupTooSmall { group, size } if group == "fan" && size == 1)
    );
}

#[test]
fn quorum_bounds_are_validated() {
    let builder = |quorum| {
        GraphBuilder::new()
            .add_node("a", NoopNode)
            .add_node("b", NoopNode)
            .add_parallel_group(
                ParallelGroup::new("fan", vec![NodeId::from("a"), NodeId::from("b")])
                    .with_join(JoinStrategy::Quorum(quorum)),
            )
            .set_entry_point("fan")
            .add_edge("fan", NodeId::End)
            .compile()
    };
    assert!(matches!(
        builder(0).unwrap_err(),
        GraphCompileError::InvalidQuorum { quorum: 0, .. }
    ));
    assert!(matches!(
        builder(3).unwrap_err(),
        GraphCompileError::InvalidQuorum { quorum: 3, .. }
    ));
    assert!(builder(2).is_ok());
}

#[test]
fn condition_node_cannot_join_a_group() {
    let err = GraphBuilder::new()
        .add_node("a", NoopNode)
        .add_node("price_node", NoopNode)
        .add_condition_node(
            "route",
            Arc::new(|_| "price".to_string()),
            [("price", "price_node")],
        )
        .add_parallel_group(ParallelGroup::new(
            "fan",
            vec![NodeId::from("a"), NodeId::from("route")],
        ))
        .set_entry_point("fan")
        .add_edge("fan", NodeId::End)
        .add_edge("a", NodeId::End)
        .add_edge("price_node", NodeId::End)
        .compile()
        .unwrap_err();
    assert!(
        matches!(err, GraphCompileError::InvalidGroupMember { member, .. } if member == "route")
    );
}

#[test]
fn duplicate_group_member_is_rejected() {
    let err = GraphBuilder::new()
        .add_node("a", NoopNode)
        .add_node("b", NoopNode)
        .add_parallel_group(ParallelGroup::new(
            "fan",
            vec![NodeId::from("a"), NodeId::from("b"), NodeId::from("a")],
        ))
        .set_entry_point("fan")
        .add_edge("fan", NodeId::End)
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphCompileError::InvalidGroupMember { member, .. } if member == "a"));
}

#[test]
fn nested_groups_are_rejected() {
    let err = GraphBuilder::new()
        .add_node("a", NoopNode)
        .add_node("b", NoopNode)
        .add_node("c", NoopNode)
        .add_parallel_group(ParallelGroup::new(
            "inner",
            vec![NodeId::from("a"), NodeId::from("b")],
        ))
        .add_parallel_group(ParallelGroup::new(
            "outer",
            vec![NodeId::from("c"), NodeId::from("inner")],
        ))
        .set_entry_point("outer")
        .add_edge("outer", NodeId::End)
        .add_edge("inner", NodeId::End)
        .compile()
        .unwrap_err();
    assert!(
        matches!(err, GraphCompileError::InvalidGroupMember { member, .. } if member == "inner")
    );
}

#[test]
fn edge_between_group_members_is_rejected() {
    let err = GraphBuilder::new()
        .add_node("a", NoopNode)
        .add_node("b", NoopNode)
        .add_parallel_group(ParallelGroup::new(
            "fan",
            vec![NodeId::from("a"), NodeId::from("b")],
        ))
        .set_entry_point("fan")
        .add_edge("fan", NodeId::End)
        .add_edge("a", "b")
        .compile()
        .unwrap_err();
    assert!(
        matches!(err, GraphCompileError::IntraGroupEdge { from, to, .. } if from == "a" && to == "b")
    );
}

#[test]
fn condition_route_to_unknown_target_is_rejected() {
    let err = GraphBuilder::new()
        .add_node("work", NoopNode)
        .add_condition_node(
            "route",
            Arc::new(|_| "go".to_string()),
            [("go", "work"), ("bail", "ghost")],
        )
        .set_entry_point("route")
        .add_edge("work", NodeId::End)
        .compile()
        .unwrap_err();
    assert!(matches!(err, GraphCompileError::UnknownNode { name, .. } if name == "ghost"));
}

#[test]
fn set_entry_point_replaces_earlier_start_edges() {
    let app = GraphBuilder::new()
        .add_node("first", SetField::new("ran", json!("first")))
        .add_node("second", SetField::new("ran", json!("second")))
        .set_entry_point("first")
        .set_entry_point("second")
        .add_edge("first", NodeId::End)
        .add_edge("second", NodeId::End)
        .compile()
        .unwrap();
    let entries = &app.edges()[&NodeId::Start];
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].to(), &NodeId::from("second"));
}

#[test]
fn virtual_endpoints_are_not_registrable() {
    let builder = GraphBuilder::new()
        .add_node(NodeId::Start, NoopNode)
        .add_node(NodeId::End, NoopNode)
        .add_node("work", NoopNode);
    assert_eq!(builder.nodes.len(), 1);
}

#[test]
fn iterators_cover_nodes_and_edges() {
    let builder = GraphBuilder::new()
        .add_node("a", NoopNode)
        .add_node("b", NoopNode)
        .set_entry_point("a")
        .add_edge("a", "b")
        .add_edge("b", NodeId::End);
    assert_eq!(builder.nodes().len(), 2);
    assert_eq!(builder.edges().count(), 3);
}

#[test]
fn topological_sort_brackets_with_virtual_endpoints() {
    let builder = GraphBuilder::new()
        .add_node("a", NoopNode)
        .add_node("b", NoopNode)
        .set_entry_point("a")
        .add_edge("a", "b")
        .add_edge("b", NodeId::End);
    let sorted = builder.topological_sort();
    assert_eq!(sorted.first(), Some(&NodeId::Start));
    assert_eq!(sorted.last(), Some(&NodeId::End));
    assert_eq!(sorted.len(), 4);
}
