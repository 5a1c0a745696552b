//! Core types for the stategraph execution engine.
//!
//! This module defines the fundamental vocabulary used throughout the
//! crate: how routable targets are identified and the small strategy/status
//! enums the engine dispatches on. These are the core domain concepts that
//! define what a workflow *is*.
//!
//! # Key Types
//!
//! - [`NodeId`]: identifies nodes, parallel groups, and the virtual
//!   `Start`/`End` endpoints
//! - [`JoinStrategy`] / [`ErrorStrategy`]: parallel-group policy knobs
//! - [`RunStatus`]: lifecycle state for runs and per-node metadata entries
//!
//! # Examples
//!
//! ```rust
//! use stategraph::types::{JoinStrategy, NodeId};
//!
//! let classify = NodeId::Named("classify".to_string());
//! assert_eq!(classify.encode(), "Named:classify");
//! assert_eq!(NodeId::decode("Named:classify"), classify);
//!
//! assert_eq!(JoinStrategy::default(), JoinStrategy::All);
//! ```

use serde::{Deserialize, Serialize};

/// Identifier for a routable target in a workflow graph.
///
/// `NodeId` names everything routing can point at: registered nodes,
/// parallel groups (which share the node namespace), and the two virtual
/// endpoints `Start` and `End`. The virtual endpoints are structural
/// markers only — they are never registered and never execute.
///
/// # Examples
///
/// ```
/// use stategraph::types::NodeId;
///
/// let start = NodeId::Start;
/// let worker = NodeId::Named("worker".to_string());
///
/// assert!(start.is_start());
/// assert!(worker.is_named());
/// assert_eq!(worker.to_string(), "worker");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeId {
    /// Virtual entry endpoint; routing from `Start` selects the entry node.
    Start,
    /// Virtual exit endpoint; routing to `End` completes the run.
    End,
    /// A user-registered node or parallel group, by name.
    Named(String),
}

impl NodeId {
    /// Encode this identifier as a stable string for persistence.
    ///
    /// The encoding is used in checkpoints and event payloads:
    /// `"Start"`, `"End"`, or `"Named:<name>"`.
    ///
    /// # Examples
    ///
    /// ```
    /// use stategraph::types::NodeId;
    ///
    /// assert_eq!(NodeId::Start.encode(), "Start");
    /// assert_eq!(NodeId::Named("classify".into()).encode(), "Named:classify");
    /// ```
    #[must_use]
    pub fn encode(&self) -> String {
        match self {
            NodeId::Start => "Start".to_string(),
            NodeId::End => "End".to_string(),
            NodeId::Named(name) => format!("Named:{name}"),
        }
    }

    /// Decode an identifier previously produced by [`encode`](Self::encode).
    ///
    /// Unrecognized encodings round-trip as `Named(<input>)` so checkpoints
    /// written by a newer version still load.
    #[must_use]
    pub fn decode(s: &str) -> Self {
        match s {
            "Start" => NodeId::Start,
            "End" => NodeId::End,
            other => match other.strip_prefix("Named:") {
                Some(name) => NodeId::Named(name.to_string()),
                None => NodeId::Named(other.to_string()),
            },
        }
    }

    /// Returns `true` for the virtual `Start` endpoint.
    #[must_use]
    pub fn is_start(&self) -> bool {
        matches!(self, NodeId::Start)
    }

    /// Returns `true` for the virtual `End` endpoint.
    #[must_use]
    pub fn is_end(&self) -> bool {
        matches!(self, NodeId::End)
    }

    /// Returns `true` for a user-registered node or group.
    #[must_use]
    pub fn is_named(&self) -> bool {
        matches!(self, NodeId::Named(_))
    }

    /// The bare name for `Named` identifiers, `None` for virtual endpoints.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            NodeId::Named(name) => Some(name),
            _ => None,
        }
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeId::Start => write!(f, "Start"),
            NodeId::End => write!(f, "End"),
            NodeId::Named(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for NodeId {
    /// Convenience conversion for builder call-sites.
    ///
    /// `"Start"` and `"End"` map to the virtual endpoints; anything else
    /// becomes `Named`.
    fn from(s: &str) -> Self {
        match s {
            "Start" => NodeId::Start,
            "End" => NodeId::End,
            other => NodeId::Named(other.to_string()),
        }
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        NodeId::from(s.as_str())
    }
}

/// Rule deciding when a parallel group's concurrent branches are done.
///
/// Combined with the group timeout and [`ErrorStrategy`] on
/// [`ParallelGroup`](crate::graphs::ParallelGroup).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JoinStrategy {
    /// Wait for every member to finish before merging (default).
    #[default]
    All,
    /// Merge as soon as the first member succeeds; cancel the rest.
    Any,
    /// Merge once the given number of members succeed; cancel the rest.
    Quorum(usize),
}

impl std::fmt::Display for JoinStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JoinStrategy::All => write!(f, "all"),
            JoinStrategy::Any => write!(f, "any"),
            JoinStrategy::Quorum(n) => write!(f, "quorum({n})"),
        }
    }
}

/// How a parallel group reacts to member failures and timeouts.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorStrategy {
    /// The first member failure (or a group timeout) aborts the invocation.
    #[default]
    FailFast,
    /// Failures are recorded in metadata; available results still merge.
    CollectErrors,
}

impl std::fmt::Display for ErrorStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorStrategy::FailFast => write!(f, "fail_fast"),
            ErrorStrategy::CollectErrors => write!(f, "collect_errors"),
        }
    }
}

/// Lifecycle state of a run, also used per node-execution in metadata.
///
/// A run moves `Idle → Running → {Completed | Failed}`. `Cancelled` is
/// recorded for parallel-group members aborted by an `any`/`quorum` join or
/// a group timeout; top-level runs are not externally cancellable.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Idle => write!(f, "idle"),
            RunStatus::Running => write!(f, "running"),
            RunStatus::Completed => write!(f, "completed"),
            RunStatus::Failed => write!(f, "failed"),
            RunStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}
