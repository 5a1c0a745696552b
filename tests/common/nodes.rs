#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::time::{Duration, sleep};

use stategraph::node::{NodeContext, NodeError, NodeHandler, NodeOutput};
use stategraph::state::StateSnapshot;
use stategraph::types::NodeId;

/// Does nothing; useful for pure-topology tests.
#[derive(Debug, Clone)]
pub struct NoopNode;

#[async_trait]
impl NodeHandler for NoopNode {
    async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::default())
    }
}

/// Writes one fixed field.
#[derive(Debug, Clone)]
pub struct SetField {
    pub field: &'static str,
    pub value: Value,
}

impl SetField {
    pub fn new(field: &'static str, value: Value) -> Self {
        Self { field, value }
    }
}

#[async_trait]
impl NodeHandler for SetField {
    async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new().with_field(self.field, self.value.clone()))
    }
}

/// Appends one entry to a field; pair with the `Append` reducer.
#[derive(Debug, Clone)]
pub struct PushEntry {
    pub field: &'static str,
    pub entry: &'static str,
}

#[async_trait]
impl NodeHandler for PushEntry {
    async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new().with_field(self.field, json!([self.entry])))
    }
}

/// Counts executions and records the running total in a field.
#[derive(Debug, Clone)]
pub struct CountingNode {
    pub field: &'static str,
    pub hits: Arc<AtomicUsize>,
}

impl CountingNode {
    pub fn new(field: &'static str) -> (Self, Arc<AtomicUsize>) {
        let hits = Arc::new(AtomicUsize::new(0));
        (
            Self {
                field,
                hits: hits.clone(),
            },
            hits,
        )
    }
}

#[async_trait]
impl NodeHandler for CountingNode {
    async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodeOutput, NodeError> {
        let n = self.hits.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(NodeOutput::new().with_field(self.field, json!(n)))
    }
}

/// Always fails with a validation error.
#[derive(Debug, Clone)]
pub struct FailingNode {
    pub reason: &'static str,
}

#[async_trait]
impl NodeHandler for FailingNode {
    async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodeOutput, NodeError> {
        Err(NodeError::ValidationFailed(self.reason.to_string()))
    }
}

/// Sleeps, then writes one field. Built for join/timeout tests under a
/// paused tokio clock.
#[derive(Debug, Clone)]
pub struct SlowNode {
    pub field: &'static str,
    pub value: Value,
    pub delay: Duration,
}

impl SlowNode {
    pub fn new(field: &'static str, value: Value, delay: Duration) -> Self {
        Self {
            field,
            value,
            delay,
        }
    }
}

#[async_trait]
impl NodeHandler for SlowNode {
    async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodeOutput, NodeError> {
        sleep(self.delay).await;
        Ok(NodeOutput::new().with_field(self.field, self.value.clone()))
    }
}

/// Steers routing through an explicit next target.
#[derive(Debug, Clone)]
pub struct JumpNode {
    pub target: NodeId,
}

impl JumpNode {
    pub fn to(target: impl Into<NodeId>) -> Self {
        Self {
            target: target.into(),
        }
    }
}

#[async_trait]
impl NodeHandler for JumpNode {
    async fn run(&self, _: StateSnapshot, _: NodeContext) -> Result<NodeOutput, NodeError> {
        Ok(NodeOutput::new().with_next(self.target.clone()))
    }
}

/// Tracks how many members run at the same time; used to assert the
/// scheduler's concurrency limit.
#[derive(Debug, Clone)]
pub struct ConcurrencyProbe {
    pub active: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub delay: Duration,
}

impl ConcurrencyProbe {
    pub fn new(delay: Duration) -> (Self, Arc<AtomicUsize>) {
        let peak = Arc::new(AtomicUsize::new(0));
        (
            Self {
                active: Arc::new(AtomicUsize::new(0)),
                peak: peak.clone(),
                delay,
            },
            peak,
        )
    }
}

#[async_trait]
impl NodeHandler for ConcurrencyProbe {
    async fn run(&self, _: StateSnapshot, ctx: NodeContext) -> Result<NodeOutput, NodeError> {
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        sleep(self.delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        Ok(NodeOutput::new().with_field(
            "probe",
            json!(format!("{}@{}", ctx.node_id, ctx.step)),
        ))
    }
}
