//! Benchmarks for the merge barrier: folding node outputs into shared state
//! through per-field reducers.

use std::sync::Arc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use serde_json::json;
use stategraph::app::App;
use stategraph::graphs::GraphBuilder;
use stategraph::node::{NodeContext, NodeError, NodeHandler, NodeOutput};
use stategraph::reducers::{Append, MapMerge};
use stategraph::state::{GraphState, StateSnapshot};
use stategraph::types::NodeId;
use tokio::runtime::Runtime;

const OUTPUT_COUNTS: &[usize] = &[4, 16, 64];

struct BenchNode;

#[async_trait::async_trait]
impl NodeHandler for BenchNode {
    async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::default())
    }
}

fn bench_app() -> App {
    GraphBuilder::new()
        .add_node("work", BenchNode)
        .set_entry_point("work")
        .add_edge("work", NodeId::End)
        .with_reducer("log", Arc::new(Append))
        .with_reducer("config", Arc::new(MapMerge))
        .compile()
        .expect("compilation should succeed")
}

fn run_ids(count: usize) -> Vec<NodeId> {
    (0..count)
        .map(|i| NodeId::from(format!("n{i}").as_str()))
        .collect()
}

/// Each output writes the same eight scalar fields; the default reducer
/// replaces on every fold.
fn last_write_outputs(count: usize) -> Vec<NodeOutput> {
    (0..count)
        .map(|i| {
            let mut output = NodeOutput::new();
            for field in 0..8 {
                output = output.with_field(format!("field_{field}"), json!(i));
            }
            output
        })
        .collect()
}

/// Each output appends one entry to a shared log field.
fn append_outputs(count: usize) -> Vec<NodeOutput> {
    (0..count)
        .map(|i| NodeOutput::new().with_field("log", json!([format!("entry-{i}")])))
        .collect()
}

/// Each output deep-merges a small object into a shared config field.
fn map_merge_outputs(count: usize) -> Vec<NodeOutput> {
    (0..count)
        .map(|i| {
            NodeOutput::new().with_field(
                "config",
                json!({
                    (format!("section_{}", i % 4)): {
                        "attempts": i,
                        "tags": [format!("t{i}")],
                    }
                }),
            )
        })
        .collect()
}

fn bench_merge_barrier(c: &mut Criterion) {
    let runtime = Runtime::new().expect("runtime");
    let app = bench_app();
    let mut group = c.benchmark_group("merge_barrier");

    for &count in OUTPUT_COUNTS {
        let ids = run_ids(count);
        let outputs = last_write_outputs(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(
            BenchmarkId::new("last_write", count),
            &count,
            |b, _| {
                b.to_async(&runtime).iter(|| async {
                    let mut state = GraphState::new();
                    app.apply_barrier(&mut state, &ids, outputs.clone())
                        .await
                        .expect("barrier should succeed")
                });
            },
        );
    }

    for &count in OUTPUT_COUNTS {
        let ids = run_ids(count);
        let outputs = append_outputs(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("append", count), &count, |b, _| {
            b.to_async(&runtime).iter(|| async {
                let mut state = GraphState::new();
                app.apply_barrier(&mut state, &ids, outputs.clone())
                    .await
                    .expect("barrier should succeed")
            });
        });
    }

    for &count in OUTPUT_COUNTS {
        let ids = run_ids(count);
        let outputs = map_merge_outputs(count);
        group.throughput(Throughput::Elements(count as u64));
        group.bench_with_input(BenchmarkId::new("map_merge", count), &count, |b, _| {
            b.to_async(&runtime).iter(|| async {
                let mut state = GraphState::new();
                app.apply_barrier(&mut state, &ids, outputs.clone())
                    .await
                    .expect("barrier should succeed")
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_merge_barrier);
criterion_main!(benches);
