//! Session state management for graph execution.
//!
//! This module defines the core types for managing session state during a
//! run, including the cursor that tracks the single active node and the
//! metadata that accumulates across steps.

use crate::runtimes::execution::ExecutionMetadata;
use crate::schedulers::Scheduler;
use crate::state::GraphState;
use crate::types::NodeId;

/// Session state that needs to survive across steps.
///
/// Contains everything needed to execute the next superstep: the merged
/// state, the current step number, the cursor pointing at the node to run
/// next, and the scheduler used for parallel groups. The state, step, and
/// cursor are what checkpoints persist; metadata stays in memory.
///
/// # Examples
///
/// ```rust
/// use stategraph::runtimes::{ExecutionMetadata, SessionState};
/// use stategraph::schedulers::Scheduler;
/// use stategraph::state::GraphState;
/// use stategraph::types::NodeId;
///
/// let session = SessionState {
///     state: GraphState::new_with_input("Hello"),
///     step: 0,
///     cursor: NodeId::from("classify"),
///     scheduler: Scheduler::default(),
///     metadata: ExecutionMetadata::new("sess-1"),
/// };
///
/// assert_eq!(session.step, 0);
/// assert!(!session.is_complete());
/// ```
#[derive(Debug, Clone)]
pub struct SessionState {
    /// The merged graph state, with per-field versions.
    pub state: GraphState,
    /// The current step number in the run.
    pub step: u64,
    /// The node to execute next. [`NodeId::End`] means the run completed.
    pub cursor: NodeId,
    /// The scheduler managing concurrent group-member execution.
    pub scheduler: Scheduler,
    /// Run bookkeeping: status, node runs, collected errors.
    pub metadata: ExecutionMetadata,
}

impl SessionState {
    /// Whether the cursor has reached [`NodeId::End`].
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.cursor == NodeId::End
    }
}

/// Indicates how a session was initialized.
///
/// Used to inform callers whether they're working with a fresh session
/// or one that was resumed from a checkpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionInit {
    /// A brand new session was created.
    Fresh,
    /// An existing session was resumed from a checkpoint.
    Resumed {
        /// The step number at which the session was checkpointed.
        checkpoint_step: u64,
    },
}
