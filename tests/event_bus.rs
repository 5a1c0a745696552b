use std::time::Duration;

use serde_json::json;
use stategraph::event_bus::{ChannelSink, Event, EventBus, MemorySink};
use stategraph::node::NodeContext;
use tokio::sync::mpsc;

/// Waits for the broadcaster task to drain at least `count` events into the sink.
async fn wait_for(sink: &MemorySink, count: usize) {
    for _ in 0..100 {
        if sink.len() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("sink never reached {count} events, has {}", sink.len());
}

#[tokio::test]
async fn events_are_broadcast_to_the_sink() {
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    bus.listen_for_events();

    let sender = bus.get_sender();
    sender.send(Event::diagnostic("runner", "started")).unwrap();
    sender
        .send(Event::node_message_with_meta("worker", 3, "progress", "halfway"))
        .unwrap();

    wait_for(&sink, 2).await;
    let events = sink.snapshot();
    assert_eq!(events[0].message(), "started");
    assert_eq!(events[1].scope_label(), Some("progress"));
    bus.stop_listener().await;
}

#[tokio::test]
async fn listening_twice_does_not_duplicate_delivery() {
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    bus.listen_for_events();
    bus.listen_for_events();

    bus.get_sender()
        .send(Event::diagnostic("runner", "once"))
        .unwrap();

    wait_for(&sink, 1).await;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.len(), 1);
    bus.stop_listener().await;
}

#[tokio::test]
async fn added_sinks_receive_subsequent_events() {
    let first = MemorySink::new();
    let second = MemorySink::new();
    let bus = EventBus::with_sink(first.clone());
    bus.listen_for_events();

    bus.get_sender()
        .send(Event::diagnostic("runner", "early"))
        .unwrap();
    wait_for(&first, 1).await;

    bus.add_sink(second.clone());
    bus.get_sender()
        .send(Event::diagnostic("runner", "late"))
        .unwrap();

    wait_for(&second, 1).await;
    assert_eq!(first.len(), 2);
    assert_eq!(second.snapshot()[0].message(), "late");
    bus.stop_listener().await;
}

#[tokio::test]
async fn stop_listener_halts_delivery() {
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    bus.listen_for_events();

    bus.get_sender()
        .send(Event::diagnostic("runner", "before"))
        .unwrap();
    wait_for(&sink, 1).await;
    bus.stop_listener().await;

    bus.get_sender()
        .send(Event::diagnostic("runner", "after"))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.len(), 1);
}

#[tokio::test]
async fn channel_sink_forwards_to_async_consumers() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let bus = EventBus::with_sink(ChannelSink::new(tx));
    bus.listen_for_events();

    bus.get_sender()
        .send(Event::node_message("tool", "invoked"))
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event within deadline")
        .expect("channel open");
    assert_eq!(received, Event::node_message("tool", "invoked"));
    bus.stop_listener().await;
}

#[tokio::test]
async fn memory_sink_filters_by_scope_and_clears() {
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    bus.listen_for_events();

    let sender = bus.get_sender();
    sender.send(Event::diagnostic("runner", "a")).unwrap();
    sender.send(Event::diagnostic("scheduler", "b")).unwrap();
    sender.send(Event::diagnostic("runner", "c")).unwrap();

    wait_for(&sink, 3).await;
    let runner_events: Vec<String> = sink
        .scoped("runner")
        .iter()
        .map(|e| e.message().to_string())
        .collect();
    assert_eq!(runner_events, vec!["a", "c"]);

    sink.clear();
    assert!(sink.is_empty());
    bus.stop_listener().await;
}

#[tokio::test]
async fn node_context_emit_enriches_events_with_metadata() {
    let sink = MemorySink::new();
    let bus = EventBus::with_sink(sink.clone());
    bus.listen_for_events();

    let ctx = NodeContext {
        node_id: "summarize".to_string(),
        step: 7,
        event_bus_sender: bus.get_sender(),
    };
    ctx.emit("llm", "calling provider").unwrap();

    wait_for(&sink, 1).await;
    match &sink.snapshot()[0] {
        Event::Node(node) => {
            assert_eq!(node.node_id(), Some("summarize"));
            assert_eq!(node.step(), Some(7));
            assert_eq!(node.scope(), "llm");
        }
        other => panic!("expected a node event, got {other:?}"),
    }
    bus.stop_listener().await;
}

#[test]
fn display_prefixes_node_identity_when_known() {
    let full = Event::node_message_with_meta("router", 5, "routing", "picked branch");
    assert_eq!(full.to_string(), "[router@5] picked branch");

    let bare = Event::node_message("routing", "picked branch");
    assert_eq!(bare.to_string(), "picked branch");

    let diag = Event::diagnostic("runner", "session created");
    assert_eq!(diag.to_string(), "session created");
}

#[test]
fn json_value_has_a_normalized_schema() {
    let event = Event::node_message_with_meta("router", 5, "routing", "picked branch");
    let value = event.to_json_value();
    assert_eq!(value["type"], json!("node"));
    assert_eq!(value["scope"], json!("routing"));
    assert_eq!(value["message"], json!("picked branch"));
    assert_eq!(value["metadata"]["node_id"], json!("router"));
    assert_eq!(value["metadata"]["step"], json!(5));
    assert!(value["timestamp"].is_string());

    let diag = Event::diagnostic("runner", "done").to_json_value();
    assert_eq!(diag["type"], json!("diagnostic"));
    assert_eq!(diag["metadata"], json!({}));
}
