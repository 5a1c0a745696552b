//! End-to-end runs through a realistic workflow: condition routing into a
//! parallel fan-out, reducer-merged results, and a summarizing tail node.

mod common;
use common::*;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use stategraph::app::App;
use stategraph::graphs::{GraphBuilder, ParallelGroup};
use stategraph::node::{NodeContext, NodeError, NodeHandler, NodeOutput};
use stategraph::reducers::Append;
use stategraph::runtimes::{AppRunner, CheckpointerType, StepOptions, StepResult};
use stategraph::state::{GraphState, StateSnapshot};
use stategraph::types::NodeId;

/// Folds whatever landed in `sources` into a one-line summary.
struct Summarize;

#[async_trait]
impl NodeHandler for Summarize {
    async fn run(&self, snapshot: StateSnapshot, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let sources: Vec<String> = snapshot
            .get("sources")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        ctx.emit("summarize", format!("folding {} sources", sources.len()))?;
        Ok(NodeOutput::new()
            .with_field("summary", json!(sources.join(" + ")))
            .with_field("status", json!("done")))
    }
}

fn pipeline() -> App {
    GraphBuilder::new()
        .add_condition_node(
            "classify",
            Arc::new(|snapshot: &StateSnapshot| {
                snapshot.field_str("topic").unwrap_or("news").to_string()
            }),
            [("price", "fan"), ("news", "headlines")],
        )
        .add_parallel_group(ParallelGroup::new(
            "fan",
            vec![NodeId::from("spot"), NodeId::from("futures")],
        ))
        .add_node("spot", PushEntry { field: "sources", entry: "spot" })
        .add_node("futures", PushEntry { field: "sources", entry: "futures" })
        .add_node("headlines", PushEntry { field: "sources", entry: "headlines" })
        .add_node("summarize", Summarize)
        .with_reducer("sources", Arc::new(Append))
        .set_entry_point("classify")
        .add_edge("fan", "summarize")
        .add_edge("headlines", "summarize")
        .add_edge("summarize", NodeId::End)
        .compile()
        .unwrap()
}

fn topic_state(topic: &str) -> GraphState {
    GraphState::builder()
        .with_input("what moved today?")
        .with_value("topic", json!(topic))
        .build()
}

#[tokio::test]
async fn price_topic_fans_out_and_merges_deterministically() {
    init_tracing();
    let final_state = pipeline().invoke(topic_state("price")).await.unwrap();
    // Group members merge in declaration order, whatever order they finish in.
    assert_field(&final_state, "sources", &json!(["spot", "futures"]));
    assert_field(&final_state, "summary", &json!("spot + futures"));
    assert_field(&final_state, "status", &json!("done"));
    assert_version(&final_state, "sources", 1);
}

#[tokio::test]
async fn news_topic_takes_the_single_path() {
    init_tracing();
    let final_state = pipeline().invoke(topic_state("news")).await.unwrap();
    assert_field(&final_state, "sources", &json!(["headlines"]));
    assert_field(&final_state, "summary", &json!("headlines"));
}

#[tokio::test]
async fn unknown_topic_falls_back_to_the_default_label() {
    init_tracing();
    // The router maps a missing topic to "news".
    let final_state = pipeline()
        .invoke(state_with_input("anything"))
        .await
        .unwrap();
    assert_field(&final_state, "summary", &json!("headlines"));
}

#[tokio::test]
async fn the_pipeline_survives_an_interrupt_and_resume() {
    init_tracing();
    let mut runner = AppRunner::new(pipeline(), CheckpointerType::InMemory).await;
    runner
        .create_session("smoke".to_string(), topic_state("price"))
        .await
        .unwrap();

    // Walk the run one superstep at a time until it completes.
    let options = StepOptions {
        interrupt_each_step: true,
        ..StepOptions::default()
    };
    let mut steps = 0;
    loop {
        match runner.run_step("smoke", options.clone()).await.unwrap() {
            StepResult::Paused(_) => {
                steps += 1;
                assert!(steps < 10, "pipeline did not converge");
            }
            StepResult::Completed(report) => {
                assert!(report.completed);
                break;
            }
        }
    }

    // classify, fan, summarize.
    assert_eq!(steps, 3);
    let session = runner.get_session("smoke").unwrap();
    assert!(session.is_complete());
    assert_field(&session.state, "summary", &json!("spot + futures"));
}
