#![allow(dead_code)]

use std::sync::Once;

use serde_json::json;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use stategraph::app::App;
use stategraph::graphs::GraphBuilder;
use stategraph::state::GraphState;
use stategraph::types::NodeId;

use super::nodes::SetField;

static TRACING: Once = Once::new();

/// Install the fmt subscriber once per test binary.
///
/// `RUST_LOG` controls the filter; the default keeps output quiet so span
/// noise does not drown assertion failures. Output goes through the test
/// writer so it stays attached to the owning test.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_test_writer())
            .try_init()
            .ok();
    });
}

pub fn state_with_input(input: &str) -> GraphState {
    GraphState::new_with_input(input)
}

/// Start -> work -> End, where `work` writes `status = "done"`.
pub fn linear_app() -> App {
    GraphBuilder::new()
        .add_node("work", SetField::new("status", json!("done")))
        .set_entry_point("work")
        .add_edge("work", NodeId::End)
        .compile()
        .expect("linear graph compiles")
}

/// Start -> loop -> loop, never reaching End.
pub fn self_loop_app() -> App {
    GraphBuilder::new()
        .add_node("loop", SetField::new("spin", json!(true)))
        .set_entry_point("loop")
        .add_edge("loop", "loop")
        .compile()
        .expect("self loop compiles")
}
