//! Step-level reporting types for the runtime.
//!
//! Each superstep the runner executes produces a [`StepReport`] describing
//! what ran, what merged, and where the cursor moved. Callers that drive the
//! engine step-by-step receive these wrapped in a [`StepResult`], which also
//! carries pause information when interrupts are requested via
//! [`StepOptions`]. Whole-run bookkeeping accumulates in
//! [`ExecutionMetadata`].

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::app::BarrierOutcome;
use crate::errors::ErrorEvent;
use crate::runtimes::session::SessionState;
use crate::types::{NodeId, RunStatus};

/// Record of a single node execution attempt.
///
/// One `NodeRun` is appended to [`ExecutionMetadata::node_runs`] for every
/// node the runner dispatches, including parallel-group members that were
/// cancelled before producing output.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeRun {
    /// Node that was dispatched.
    pub node: NodeId,
    /// Superstep in which the dispatch happened.
    pub step: u64,
    /// Terminal status of this attempt.
    pub status: RunStatus,
    /// Wall-clock duration of the attempt in milliseconds.
    pub duration_ms: u64,
    /// Error message when the attempt failed or was cancelled with a cause.
    pub error: Option<String>,
}

/// Result of executing one superstep in a session.
///
/// The embedded [`BarrierOutcome`] carries the canonical ordering of merged
/// fields and collected errors so callers can persist and resume without
/// drift.
///
/// # Examples
///
/// ```rust,no_run
/// use stategraph::runtimes::StepReport;
///
/// fn summarize(report: &StepReport) {
///     println!("step {} ran {} node(s)", report.step, report.ran_nodes.len());
///     println!("cursor moved to {}", report.next_cursor);
///     if report.completed {
///         println!("run finished");
///     }
/// }
/// ```
#[derive(Debug, Clone)]
pub struct StepReport {
    /// The step number that was executed (1-based; step 0 is the initial
    /// checkpoint written at session creation).
    pub step: u64,
    /// Nodes that ran during this step: one computation node, one condition
    /// node, or every member of a parallel group.
    pub ran_nodes: Vec<NodeId>,
    /// The outcome from applying the merge barrier.
    pub barrier_outcome: BarrierOutcome,
    /// Cursor after routing. [`NodeId::End`] means the run completed.
    pub next_cursor: NodeId,
    /// Per-field state versions after this step completed.
    pub state_versions: FxHashMap<String, u32>,
    /// Whether the run has completed (routing resolved to End).
    pub completed: bool,
}

/// Options for controlling step execution behavior.
///
/// Use these options to implement human-in-the-loop workflows, debugging,
/// or step-by-step execution patterns.
///
/// # Examples
///
/// ```rust
/// use stategraph::runtimes::StepOptions;
/// use stategraph::types::NodeId;
///
/// // Pause before a specific node.
/// let options = StepOptions {
///     interrupt_before: vec![NodeId::from("approval")],
///     interrupt_after: vec![],
///     interrupt_each_step: false,
/// };
/// ```
#[derive(Debug, Clone, Default)]
pub struct StepOptions {
    /// Nodes to pause execution before (for human-in-the-loop).
    pub interrupt_before: Vec<NodeId>,
    /// Nodes to pause execution after.
    pub interrupt_after: Vec<NodeId>,
    /// Whether to pause after each step (debugging mode).
    pub interrupt_each_step: bool,
}

/// The reason why execution was paused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PausedReason {
    /// Paused before executing the specified node.
    BeforeNode(NodeId),
    /// Paused after a step in which the specified node ran.
    AfterNode(NodeId),
    /// Paused after completing the specified step number.
    AfterStep(u64),
}

/// Extended step report when execution is paused.
///
/// Contains the full session state at the point of pause, allowing
/// inspection, modification, or later resumption.
#[derive(Debug, Clone)]
pub struct PausedReport {
    /// The complete session state at the pause point.
    pub session_state: SessionState,
    /// Why execution was paused.
    pub reason: PausedReason,
}

/// Result of attempting to run a step.
///
/// Either the step completed normally, or execution was paused at an
/// interrupt point before or after the work.
#[derive(Debug, Clone)]
pub enum StepResult {
    /// The step completed and execution can continue.
    Completed(StepReport),
    /// Execution was paused before completion.
    Paused(PausedReport),
}

/// Whole-run bookkeeping: status, timing, per-node run records, and every
/// error event collected along the way.
///
/// Metadata lives with the in-memory session and is not checkpointed; a
/// resumed session starts with fresh metadata while its step counter
/// continues from the restored checkpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ExecutionMetadata {
    pub session_id: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Number of supersteps executed so far.
    pub iterations: u64,
    /// One entry per node dispatch, in dispatch order.
    pub node_runs: Vec<NodeRun>,
    /// Fatal and non-fatal error events, in occurrence order.
    pub errors: Vec<ErrorEvent>,
}

impl ExecutionMetadata {
    #[must_use]
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            status: RunStatus::Idle,
            started_at: Utc::now(),
            finished_at: None,
            iterations: 0,
            node_runs: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// Mark the run finished with the given terminal status.
    pub fn finish(&mut self, status: RunStatus) {
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    /// Runs that did not complete successfully.
    #[must_use]
    pub fn failed_runs(&self) -> Vec<&NodeRun> {
        self.node_runs
            .iter()
            .filter(|run| run.status != RunStatus::Completed)
            .collect()
    }

    /// Total wall-clock duration, if the run has finished.
    #[must_use]
    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_finish_records_status_and_time() {
        let mut meta = ExecutionMetadata::new("sess-1");
        assert_eq!(meta.status, RunStatus::Idle);
        assert!(meta.finished_at.is_none());

        meta.finish(RunStatus::Completed);
        assert_eq!(meta.status, RunStatus::Completed);
        assert!(meta.finished_at.is_some());
        assert!(meta.duration_ms().is_some());
    }

    #[test]
    fn failed_runs_filters_completed() {
        let mut meta = ExecutionMetadata::new("sess-2");
        meta.node_runs.push(NodeRun {
            node: NodeId::from("ok"),
            step: 1,
            status: RunStatus::Completed,
            duration_ms: 3,
            error: None,
        });
        meta.node_runs.push(NodeRun {
            node: NodeId::from("bad"),
            step: 1,
            status: RunStatus::Failed,
            duration_ms: 1,
            error: Some("boom".into()),
        });
        meta.node_runs.push(NodeRun {
            node: NodeId::from("late"),
            step: 1,
            status: RunStatus::Cancelled,
            duration_ms: 0,
            error: None,
        });

        let failed = meta.failed_runs();
        assert_eq!(failed.len(), 2);
        assert_eq!(failed[0].node, NodeId::from("bad"));
    }
}
