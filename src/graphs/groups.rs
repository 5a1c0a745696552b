//! Parallel group declarations for fan-out execution.
//!
//! A [`ParallelGroup`] names a set of member nodes that run concurrently in
//! one superstep. The group behaves like a single node in the topology:
//! edges route to and from the group's name, and the group's join and error
//! strategies decide when the superstep resolves and what happens when
//! members fail.

use crate::types::{ErrorStrategy, JoinStrategy, NodeId};
use std::time::Duration;

/// Deadline applied to a group when none is configured explicitly.
pub const DEFAULT_GROUP_TIMEOUT: Duration = Duration::from_secs(30);

/// A named set of nodes that execute concurrently within one superstep.
///
/// Member updates are buffered during execution and merged through the
/// reducer barrier in member declaration order, so a group run produces the
/// same state as the equivalent sequential execution of its members.
///
/// # Examples
///
/// ```
/// use stategraph::graphs::ParallelGroup;
/// use stategraph::types::{ErrorStrategy, JoinStrategy, NodeId};
/// use std::time::Duration;
///
/// let group = ParallelGroup::new(
///     "fetch_all",
///     vec![NodeId::from("fetch_news"), NodeId::from("fetch_prices")],
/// )
/// .with_join(JoinStrategy::Any)
/// .with_timeout(Duration::from_secs(5))
/// .with_error_strategy(ErrorStrategy::CollectErrors);
///
/// assert_eq!(group.members.len(), 2);
/// ```
#[derive(Clone)]
pub struct ParallelGroup {
    /// Name the topology routes to and from.
    pub name: String,
    /// Member nodes, in declaration order.
    pub members: Vec<NodeId>,
    /// When the group's superstep resolves.
    pub join: JoinStrategy,
    /// Deadline for the whole group.
    pub timeout: Duration,
    /// What a member failure does to the group.
    pub errors: ErrorStrategy,
}

impl ParallelGroup {
    /// Creates a group with the default join (`All`), timeout (30s), and
    /// error strategy (`FailFast`).
    pub fn new(name: impl Into<String>, members: Vec<NodeId>) -> Self {
        Self {
            name: name.into(),
            members,
            join: JoinStrategy::default(),
            timeout: DEFAULT_GROUP_TIMEOUT,
            errors: ErrorStrategy::default(),
        }
    }

    #[must_use]
    pub fn with_join(mut self, join: JoinStrategy) -> Self {
        self.join = join;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_error_strategy(mut self, errors: ErrorStrategy) -> Self {
        self.errors = errors;
        self
    }

    /// The group's name as a routable node id.
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        NodeId::Named(self.name.clone())
    }

    /// How many member successes the configured join strategy requires.
    #[must_use]
    pub fn required_successes(&self) -> usize {
        match self.join {
            JoinStrategy::All => self.members.len(),
            JoinStrategy::Any => 1,
            JoinStrategy::Quorum(n) => n,
        }
    }
}

impl std::fmt::Debug for ParallelGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParallelGroup")
            .field("name", &self.name)
            .field("members", &self.members)
            .field("join", &self.join)
            .field("timeout", &self.timeout)
            .field("errors", &self.errors)
            .finish()
    }
}
