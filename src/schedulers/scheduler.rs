use std::sync::Arc;
use std::time::Instant;

use miette::Diagnostic;
use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::{Instant as TokioInstant, timeout_at};
use tracing::instrument;

use crate::errors::{ErrorChain, ErrorEvent};
use crate::event_bus::Event;
use crate::graphs::{NodeSpec, ParallelGroup};
use crate::node::{NodeContext, NodeError, NodeOutput};
use crate::runtimes::execution::NodeRun;
use crate::state::StateSnapshot;
use crate::types::{ErrorStrategy, JoinStrategy, NodeId, RunStatus};

/// Concurrency limit used when none is configured.
pub const DEFAULT_CONCURRENCY_LIMIT: usize = 4;

/// Executes parallel group members under a bounded concurrency limit.
///
/// The limit caps how many members run at once; a group larger than the
/// limit queues its remaining members on a semaphore. The limit travels
/// with checkpoints so a resumed session schedules the way the original
/// one did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Scheduler {
    concurrency_limit: usize,
}

impl Scheduler {
    /// Create a scheduler allowing up to `concurrency_limit` members to run
    /// at once. A limit of zero is treated as one.
    #[must_use]
    pub fn new(concurrency_limit: usize) -> Self {
        Self {
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    #[must_use]
    pub fn concurrency_limit(&self) -> usize {
        self.concurrency_limit
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY_LIMIT)
    }
}

/// What one parallel group produced once its join resolved.
///
/// `run_ids` and `outputs` are parallel vectors holding the successful
/// members in declaration order, ready for the merge barrier. `runs` records
/// every member (completed, failed, or cancelled), also in declaration
/// order. `errors` holds the non-fatal error records accumulated under
/// [`ErrorStrategy::CollectErrors`].
#[derive(Debug, Default)]
pub struct GroupReport {
    pub run_ids: Vec<NodeId>,
    pub outputs: Vec<NodeOutput>,
    pub runs: Vec<NodeRun>,
    pub errors: Vec<ErrorEvent>,
}

/// Fatal outcomes of running a parallel group.
///
/// Errors carry the per-member run records collected up to the failure so
/// the runner can fold them into execution metadata.
#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    /// A member failed while the group runs under [`ErrorStrategy::FailFast`].
    #[error("member {member:?} of group {group:?} failed: {source}")]
    #[diagnostic(
        code(stategraph::scheduler::member_failed),
        help("Switch the group to ErrorStrategy::CollectErrors to keep sibling results.")
    )]
    MemberFailed {
        group: String,
        member: String,
        runs: Vec<NodeRun>,
        #[source]
        source: NodeError,
    },

    /// The join condition was not met before the group timeout elapsed.
    #[error("group {group:?} timed out after {timeout_ms} ms waiting for join {join}")]
    #[diagnostic(
        code(stategraph::scheduler::group_timeout),
        help("Raise the group timeout or switch to ErrorStrategy::CollectErrors.")
    )]
    GroupTimeout {
        group: String,
        timeout_ms: u64,
        join: JoinStrategy,
        runs: Vec<NodeRun>,
    },

    /// A member task panicked or was aborted outside the scheduler's control.
    #[error("task for group {group:?} failed to join: {message}")]
    #[diagnostic(code(stategraph::scheduler::join))]
    Join { group: String, message: String },
}

impl Scheduler {
    /// Run every member of `group` concurrently against `snapshot` and
    /// resolve the join.
    ///
    /// Members execute as independent tasks gated by the concurrency
    /// semaphore; all of them observe the identical pre-group snapshot.
    /// Resolution depends on the join strategy: `All` settles every member,
    /// `Any` stops at the first success, `Quorum(n)` at the n-th. Members
    /// still outstanding at resolution are aborted and recorded with
    /// [`RunStatus::Cancelled`].
    ///
    /// Under [`ErrorStrategy::FailFast`], the first member failure (or the
    /// group timeout) aborts the group. Under
    /// [`ErrorStrategy::CollectErrors`], failures and timeouts become error
    /// records in the report and whatever successes exist are returned for
    /// merging.
    ///
    /// `specs` must list the resolved members in declaration order; the
    /// report preserves that order regardless of completion timing.
    #[instrument(
        skip(self, group, specs, snapshot, event_sender),
        fields(group = %group.name, members = specs.len()),
        err
    )]
    pub async fn run_group(
        &self,
        group: &ParallelGroup,
        specs: Vec<(NodeId, NodeSpec)>,
        snapshot: StateSnapshot,
        step: u64,
        event_sender: flume::Sender<Event>,
    ) -> Result<GroupReport, SchedulerError> {
        let total = specs.len();
        let needed = group.required_successes();
        let started = Instant::now();
        let deadline = TokioInstant::now() + group.timeout;
        let semaphore = Arc::new(Semaphore::new(self.concurrency_limit));

        let _ = event_sender.send(Event::diagnostic(
            "scheduler",
            format!(
                "group {}: dispatching {total} members (join: {})",
                group.name, group.join
            ),
        ));

        let mut join_set: JoinSet<(usize, Result<NodeOutput, NodeError>, u64)> = JoinSet::new();
        for (index, (id, spec)) in specs.iter().enumerate() {
            let semaphore = semaphore.clone();
            let spec = spec.clone();
            let snapshot = snapshot.clone();
            let ctx = NodeContext {
                node_id: id.to_string(),
                step,
                event_bus_sender: event_sender.clone(),
            };
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .expect("scheduler semaphore closed");
                let node_started = Instant::now();
                let result = spec.execute(snapshot, ctx).await;
                (index, result, node_started.elapsed().as_millis() as u64)
            });
        }

        let mut outputs: Vec<Option<NodeOutput>> = vec![None; total];
        let mut runs: Vec<Option<NodeRun>> = vec![None; total];
        let mut errors: Vec<ErrorEvent> = Vec::new();
        let mut successes = 0usize;
        let mut settled = 0usize;
        let mut timed_out = false;

        while settled < total && successes < needed {
            let joined = match timeout_at(deadline, join_set.join_next()).await {
                Err(_) => {
                    timed_out = true;
                    break;
                }
                Ok(None) => break,
                Ok(Some(joined)) => joined,
            };
            let (index, result, duration_ms) = match joined {
                Ok(task) => task,
                Err(join_err) => {
                    join_set.abort_all();
                    return Err(SchedulerError::Join {
                        group: group.name.clone(),
                        message: join_err.to_string(),
                    });
                }
            };
            settled += 1;
            let member = specs[index].0.clone();
            match result {
                Ok(output) => {
                    successes += 1;
                    tracing::debug!(group = %group.name, node = %member, duration_ms, "group member completed");
                    runs[index] = Some(NodeRun {
                        node: member,
                        step,
                        status: RunStatus::Completed,
                        duration_ms,
                        error: None,
                    });
                    outputs[index] = Some(output);
                }
                Err(err) => match group.errors {
                    ErrorStrategy::FailFast => {
                        join_set.abort_all();
                        runs[index] = Some(NodeRun {
                            node: member.clone(),
                            step,
                            status: RunStatus::Failed,
                            duration_ms,
                            error: Some(err.to_string()),
                        });
                        let collected = finalize_runs(runs, &specs, step, started, None);
                        return Err(SchedulerError::MemberFailed {
                            group: group.name.clone(),
                            member: member.to_string(),
                            runs: collected,
                            source: err,
                        });
                    }
                    ErrorStrategy::CollectErrors => {
                        tracing::warn!(group = %group.name, node = %member, error = %err, "group member failed");
                        errors.push(
                            ErrorEvent::node(member.to_string(), step, ErrorChain::from_error(&err))
                                .with_tag("parallel"),
                        );
                        runs[index] = Some(NodeRun {
                            node: member,
                            step,
                            status: RunStatus::Failed,
                            duration_ms,
                            error: Some(err.to_string()),
                        });
                    }
                },
            }
        }

        join_set.abort_all();

        if timed_out {
            let timeout_ms = group.timeout.as_millis() as u64;
            match group.errors {
                ErrorStrategy::FailFast => {
                    let collected =
                        finalize_runs(runs, &specs, step, started, Some("group timed out"));
                    return Err(SchedulerError::GroupTimeout {
                        group: group.name.clone(),
                        timeout_ms,
                        join: group.join,
                        runs: collected,
                    });
                }
                ErrorStrategy::CollectErrors => {
                    for (index, run) in runs.iter_mut().enumerate() {
                        if run.is_none() {
                            let member = specs[index].0.clone();
                            errors.push(
                                ErrorEvent::node(
                                    member.to_string(),
                                    step,
                                    ErrorChain::msg(format!(
                                        "group {} timed out after {timeout_ms} ms",
                                        group.name
                                    )),
                                )
                                .with_tag("timeout"),
                            );
                            *run = Some(NodeRun {
                                node: member,
                                step,
                                status: RunStatus::Cancelled,
                                duration_ms: started.elapsed().as_millis() as u64,
                                error: Some("group timed out".to_string()),
                            });
                        }
                    }
                    let _ = event_sender.send(Event::diagnostic(
                        "scheduler",
                        format!(
                            "group {}: timed out, merging {successes} available results",
                            group.name
                        ),
                    ));
                }
            }
        }

        // Members still pending after an any/quorum join resolved.
        for (index, run) in runs.iter_mut().enumerate() {
            if run.is_none() {
                let member = specs[index].0.clone();
                tracing::debug!(group = %group.name, node = %member, "group member cancelled after join resolved");
                *run = Some(NodeRun {
                    node: member,
                    step,
                    status: RunStatus::Cancelled,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: None,
                });
            }
        }

        let _ = event_sender.send(Event::diagnostic(
            "scheduler",
            format!(
                "group {}: join resolved with {successes}/{total} successes",
                group.name
            ),
        ));

        let mut report = GroupReport::default();
        for (index, (id, _)) in specs.iter().enumerate() {
            if let Some(output) = outputs[index].take() {
                report.run_ids.push(id.clone());
                report.outputs.push(output);
            }
            if let Some(run) = runs[index].take() {
                report.runs.push(run);
            }
        }
        report.errors = errors;
        Ok(report)
    }
}

/// Convert the sparse run table into declaration-order records, marking
/// members that never settled as cancelled.
fn finalize_runs(
    mut runs: Vec<Option<NodeRun>>,
    specs: &[(NodeId, NodeSpec)],
    step: u64,
    started: Instant,
    cancel_reason: Option<&str>,
) -> Vec<NodeRun> {
    for (index, run) in runs.iter_mut().enumerate() {
        if run.is_none() {
            *run = Some(NodeRun {
                node: specs[index].0.clone(),
                step,
                status: RunStatus::Cancelled,
                duration_ms: started.elapsed().as_millis() as u64,
                error: cancel_reason.map(str::to_string),
            });
        }
    }
    runs.into_iter().flatten().collect()
}
