//! Concurrent execution of parallel groups.
//!
//! The scheduler dispatches every member of a [`ParallelGroup`](crate::graphs::ParallelGroup)
//! against one shared state snapshot, bounds concurrency with a semaphore,
//! and resolves the group's join strategy: wait for all members, the first
//! success, or a quorum. Members still running once the join resolves are
//! cancelled and recorded as such in the run records.
//!
//! The scheduler never touches the shared state. It returns member outputs
//! in declaration order; the runner merges them at the superstep barrier.

mod scheduler;

pub use scheduler::{DEFAULT_CONCURRENCY_LIMIT, GroupReport, Scheduler, SchedulerError};
