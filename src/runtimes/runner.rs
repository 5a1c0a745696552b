use std::sync::Arc;
use std::time::Instant;

use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;
use tracing::instrument;

use crate::app::{App, BarrierOutcome};
use crate::errors::{ErrorChain, ErrorEvent};
use crate::event_bus::{Event, EventBus};
use crate::graphs::NodeSpec;
use crate::node::{NodeContext, NodeError, NodeOutput};
use crate::reducers::ReducerError;
use crate::runtimes::checkpointer::{
    Checkpoint, Checkpointer, CheckpointerError, CheckpointerType, InMemoryCheckpointer,
    restore_session_state,
};
use crate::runtimes::execution::{
    ExecutionMetadata, NodeRun, PausedReason, PausedReport, StepOptions, StepReport, StepResult,
};
use crate::runtimes::session::{SessionInit, SessionState};
use crate::schedulers::{Scheduler, SchedulerError};
use crate::state::{GraphState, StateSnapshot};
use crate::types::{NodeId, RunStatus};

/// What one superstep executed, plus an inline routing decision when the
/// cursor was a condition node.
struct CursorOutcome {
    ran_nodes: Vec<NodeId>,
    outputs: Vec<NodeOutput>,
    routed: Option<NodeId>,
}

/// Fatal causes that stop a run.
///
/// Wrapped in [`RunError`] together with the metadata accumulated up to the
/// failure, so callers keep the per-node run records and error events.
#[derive(Debug, Error, Diagnostic)]
pub enum ExecutionError {
    #[error("session not found: {session_id}")]
    #[diagnostic(code(stategraph::runner::session_not_found))]
    SessionNotFound { session_id: String },

    #[error("node {node} is not registered")]
    #[diagnostic(
        code(stategraph::runner::missing_node),
        help("The cursor or an explicit next named a node the graph does not know.")
    )]
    MissingNode { node: String },

    #[error("node {node} failed at step {step}: {source}")]
    #[diagnostic(code(stategraph::runner::node_run))]
    NodeRun {
        node: String,
        step: u64,
        #[source]
        source: NodeError,
    },

    #[error("condition node {node} returned label {label:?} with no matching route")]
    #[diagnostic(
        code(stategraph::runner::routing),
        help("Declare the label in the condition's route table.")
    )]
    Routing {
        node: String,
        label: String,
        expected: Vec<String>,
    },

    #[error("no route out of node {node} at step {step}")]
    #[diagnostic(
        code(stategraph::runner::no_route),
        help("Add an edge, a fallback, or mark the node terminal.")
    )]
    NoRoute { node: String, step: u64 },

    #[error("exceeded max iterations ({limit})")]
    #[diagnostic(
        code(stategraph::runner::max_iterations),
        help("Raise RuntimeConfig::max_iterations or break the cycle with a guard.")
    )]
    MaxIterationsExceeded { limit: u32 },

    #[error("unexpected pause during run_until_complete")]
    #[diagnostic(code(stategraph::runner::unexpected_pause))]
    UnexpectedPause,

    #[error(transparent)]
    #[diagnostic(code(stategraph::runner::checkpointer))]
    Checkpointer(#[from] CheckpointerError),

    #[error(transparent)]
    #[diagnostic(code(stategraph::runner::scheduler))]
    Scheduler(#[from] SchedulerError),

    #[error("merge barrier failed: {0}")]
    #[diagnostic(code(stategraph::runner::merge))]
    Merge(#[from] ReducerError),
}

/// A failed run: the fatal cause plus everything the engine learned before
/// it stopped.
///
/// The metadata is the caller's post-mortem record: per-node run statuses,
/// the non-fatal errors collected along the way, and timing.
#[derive(Debug, Error, Diagnostic)]
#[error("run failed: {cause}")]
#[diagnostic(code(stategraph::runner::run_failed))]
pub struct RunError {
    #[source]
    pub cause: ExecutionError,
    pub metadata: ExecutionMetadata,
}

/// Runtime execution engine for compiled graphs with session management and
/// event streaming.
///
/// `AppRunner` wraps an [`App`] and manages the runtime environment:
/// - **Session Management**: Multiple isolated runs over one graph
/// - **Event Streaming**: Custom EventBus with pluggable sinks
/// - **Checkpointing**: State persistence and resume
/// - **Step Control**: Pausing, resuming, and interrupting execution
///
/// # Architecture: App vs AppRunner
///
/// - **`App`**: The graph structure (nodes, edges, groups, topology)
/// - **`AppRunner`**: The runtime environment (sessions, events, checkpoints)
///
/// This separation allows one `App` to be reused across multiple `AppRunner`
/// instances, each with its own EventBus configuration, which is what a web
/// server wants for per-request event isolation.
///
/// # Usage Patterns
///
/// ## Simple Execution (via App.invoke)
///
/// For basic runs where stdout logging is sufficient:
///
/// ```rust,no_run
/// # use stategraph::app::App;
/// # use stategraph::state::GraphState;
/// # async fn example(app: App) -> Result<(), Box<dyn std::error::Error>> {
/// // App.invoke() creates an AppRunner internally with the default EventBus
/// let final_state = app.invoke(GraphState::new_with_input("Hello")).await?;
/// # Ok(())
/// # }
/// ```
///
/// ## Advanced Execution (Direct AppRunner)
///
/// For systems needing event streaming, use `AppRunner` directly:
///
/// ```rust,no_run
/// # use stategraph::app::App;
/// # use stategraph::state::GraphState;
/// use stategraph::event_bus::{ChannelSink, EventBus};
/// use stategraph::runtimes::{AppRunner, CheckpointerType};
/// # async fn example(app: App) -> Result<(), Box<dyn std::error::Error>> {
///
/// let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
/// let bus = EventBus::with_sinks(vec![Box::new(ChannelSink::new(tx))]);
///
/// let mut runner = AppRunner::with_options_and_bus(
///     app,
///     CheckpointerType::InMemory,
///     false,
///     bus,
///     true,
/// )
/// .await;
///
/// let session_id = "my-session".to_string();
/// runner
///     .create_session(session_id.clone(), GraphState::new_with_input("Hello"))
///     .await?;
///
/// // Events stream to the channel while the graph runs
/// tokio::spawn(async move {
///     while let Some(event) = rx.recv().await {
///         println!("Event: {event}");
///     }
/// });
///
/// runner.run_until_complete(&session_id).await?;
/// # Ok(())
/// # }
/// ```
pub struct AppRunner {
    app: Arc<App>,
    sessions: FxHashMap<String, SessionState>,
    checkpointer: Option<Arc<dyn Checkpointer>>, // optional pluggable persistence
    autosave: bool,
    event_bus: EventBus,
}

impl AppRunner {
    /// Create a new AppRunner with the default EventBus (stdout only).
    ///
    /// This is the simplest constructor, used internally by
    /// [`App::invoke()`](crate::app::App::invoke). For custom event handling
    /// (streaming to web clients, etc.), use
    /// [`with_options_and_bus()`](Self::with_options_and_bus) instead.
    #[must_use]
    pub async fn new(app: App, checkpointer_type: CheckpointerType) -> Self {
        Self::with_options(app, checkpointer_type, true).await
    }

    #[must_use]
    pub async fn from_arc(app: Arc<App>, checkpointer_type: CheckpointerType) -> Self {
        Self::with_options_arc(app, checkpointer_type, true).await
    }

    async fn create_checkpointer(
        checkpointer_type: CheckpointerType,
        #[cfg_attr(not(feature = "sqlite"), allow(unused_variables))] sqlite_db_name: Option<String>,
    ) -> Option<Arc<dyn Checkpointer>> {
        match checkpointer_type {
            CheckpointerType::InMemory => Some(Arc::new(InMemoryCheckpointer::new())),
            #[cfg(feature = "sqlite")]
            CheckpointerType::SQLite => {
                let db_url = std::env::var("STATEGRAPH_SQLITE_URL")
                    .ok()
                    .or_else(|| {
                        sqlite_db_name
                            .as_ref()
                            .map(|name| format!("sqlite://{name}"))
                    })
                    .unwrap_or_else(|| {
                        let fallback = std::env::var("SQLITE_DB_NAME")
                            .unwrap_or_else(|_| "stategraph.db".to_string());
                        format!("sqlite://{fallback}")
                    });
                // Ensure underlying sqlite file exists. Steps:
                // 1. Strip "sqlite://" scheme to get filesystem path.
                // 2. Create parent directories if needed.
                // 3. Attempt to create the file (ignore errors if it already exists or any failure).
                if let Some(path) = db_url.strip_prefix("sqlite://") {
                    let path = path.trim();
                    if !path.is_empty() {
                        let p = std::path::Path::new(path);
                        if let Some(parent) = p.parent() {
                            let _ = std::fs::create_dir_all(parent);
                        }
                        if !p.exists() {
                            // Ignore result; if it already exists or we lack permission we proceed anyway.
                            let _ = std::fs::File::create_new(p);
                        }
                    }
                }
                match crate::runtimes::SQLiteCheckpointer::connect(&db_url).await {
                    Ok(cp) => Some(Arc::new(cp) as Arc<dyn Checkpointer>),
                    Err(e) => {
                        tracing::error!(
                            url = %db_url,
                            error = %e,
                            "SQLiteCheckpointer initialization failed"
                        );
                        None
                    }
                }
            }
        }
    }

    /// Create with explicit checkpointer + autosave toggle
    pub async fn with_options(
        app: App,
        checkpointer_type: CheckpointerType,
        autosave: bool,
    ) -> Self {
        let bus = app.runtime_config().event_bus.build_event_bus();
        let app = Arc::new(app);
        Self::with_arc_and_bus(app, checkpointer_type, autosave, bus, true).await
    }

    pub async fn with_options_arc(
        app: Arc<App>,
        checkpointer_type: CheckpointerType,
        autosave: bool,
    ) -> Self {
        let bus = app.runtime_config().event_bus.build_event_bus();
        Self::with_arc_and_bus(app, checkpointer_type, autosave, bus, true).await
    }

    /// Create an AppRunner with a custom EventBus for advanced event handling.
    ///
    /// Use this when you need to stream events to custom sinks (web clients,
    /// logging systems, monitoring dashboards). [`App::invoke()`] uses a
    /// default EventBus; this constructor lets you inject one with the sinks
    /// you want, which also gives per-request isolation in servers.
    ///
    /// # Parameters
    ///
    /// * `app` - The compiled graph
    /// * `checkpointer_type` - Persistence strategy (InMemory or SQLite)
    /// * `autosave` - Whether to save a checkpoint after each step
    /// * `event_bus` - Your custom EventBus with desired sinks
    /// * `start_listener` - Whether to start the EventBus listener immediately
    ///
    /// [`App::invoke()`]: crate::app::App::invoke
    pub async fn with_options_and_bus(
        app: App,
        checkpointer_type: CheckpointerType,
        autosave: bool,
        event_bus: EventBus,
        start_listener: bool,
    ) -> Self {
        let app = Arc::new(app);
        Self::with_arc_and_bus(app, checkpointer_type, autosave, event_bus, start_listener).await
    }

    /// Variant of [`with_options_and_bus()`](Self::with_options_and_bus) for
    /// an existing `Arc<App>`, avoiding a clone of the graph.
    pub async fn with_options_arc_and_bus(
        app: Arc<App>,
        checkpointer_type: CheckpointerType,
        autosave: bool,
        event_bus: EventBus,
        start_listener: bool,
    ) -> Self {
        Self::with_arc_and_bus(app, checkpointer_type, autosave, event_bus, start_listener).await
    }

    async fn with_arc_and_bus(
        app: Arc<App>,
        checkpointer_type: CheckpointerType,
        autosave: bool,
        event_bus: EventBus,
        start_listener: bool,
    ) -> Self {
        let sqlite_db_name = app.runtime_config().sqlite_db_name.clone();
        let checkpointer = Self::create_checkpointer(checkpointer_type, sqlite_db_name).await;
        if start_listener {
            event_bus.listen_for_events();
        }
        Self {
            app,
            sessions: FxHashMap::default(),
            checkpointer,
            autosave,
            event_bus,
        }
    }

    /// Initialize a new session with the given initial state.
    ///
    /// When a checkpointer already holds state for `session_id`, the stored
    /// snapshot wins: the session resumes at the checkpointed step and
    /// cursor, and `initial_state` is discarded. Otherwise the entry node is
    /// resolved by routing from `Start` against the initial state, and a
    /// step-0 checkpoint is written.
    #[instrument(skip(self, initial_state), err)]
    pub async fn create_session(
        &mut self,
        session_id: String,
        initial_state: GraphState,
    ) -> Result<SessionInit, RunError> {
        // If checkpointer present and session exists, load instead of creating anew
        let restored_checkpoint = if let Some(cp) = &self.checkpointer {
            cp.load_latest(&session_id).await.map_err(|e| {
                Self::fail(
                    ExecutionMetadata::new(session_id.clone()),
                    ExecutionError::Checkpointer(e),
                )
            })?
        } else {
            None
        };

        if let Some(stored) = restored_checkpoint {
            let restored = restore_session_state(&stored);
            self.sessions.insert(session_id, restored);
            return Ok(SessionInit::Resumed {
                checkpoint_step: stored.step,
            });
        }

        let entry = self
            .resolve_route(&NodeId::Start, None, &initial_state.snapshot(), 0)
            .map_err(|cause| Self::fail(ExecutionMetadata::new(session_id.clone()), cause))?;

        let default_limit = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        let session_state = SessionState {
            state: initial_state,
            step: 0,
            cursor: entry,
            scheduler: Scheduler::new(default_limit),
            metadata: ExecutionMetadata::new(session_id.clone()),
        };
        self.sessions
            .insert(session_id.clone(), session_state.clone());
        if let Some(cp) = &self.checkpointer {
            let _ = cp
                .save(Checkpoint::from_session(
                    &session_id,
                    &session_state,
                    Vec::new(),
                ))
                .await;
        }
        Ok(SessionInit::Fresh)
    }

    /// Execute one superstep for the given session.
    ///
    /// One superstep is: execute the node (or parallel group) under the
    /// cursor, merge its outputs at the barrier, checkpoint, and route the
    /// cursor to the next node. Interrupt options can pause before the node
    /// runs or after the step finishes.
    #[instrument(skip(self, options), err)]
    pub async fn run_step(
        &mut self,
        session_id: &str,
        options: StepOptions,
    ) -> Result<StepResult, RunError> {
        let (current_step, current_cursor, current_versions) = {
            let session_state = self.sessions.get(session_id).ok_or_else(|| {
                Self::fail(
                    ExecutionMetadata::new(session_id),
                    ExecutionError::SessionNotFound {
                        session_id: session_id.to_string(),
                    },
                )
            })?;
            (
                session_state.step,
                session_state.cursor.clone(),
                session_state.state.versions(),
            )
        };

        // Check if already completed
        if current_cursor == NodeId::End {
            return Ok(StepResult::Completed(StepReport {
                step: current_step,
                ran_nodes: vec![],
                barrier_outcome: BarrierOutcome::default(),
                next_cursor: NodeId::End,
                state_versions: current_versions,
                completed: true,
            }));
        }

        // Check for interrupt_before
        if options.interrupt_before.contains(&current_cursor) {
            let session_state = self
                .sessions
                .get(session_id)
                .expect("session exists after initial lookup")
                .clone();
            return Ok(StepResult::Paused(PausedReport {
                session_state,
                reason: PausedReason::BeforeNode(current_cursor),
            }));
        }

        // Take ownership of session state for execution
        let mut session_state = self
            .sessions
            .remove(session_id)
            .expect("session exists after initial lookup");

        // Execute one superstep; on error, record it in metadata and rethrow
        let step_report = match self.run_one_superstep(&mut session_state).await {
            Ok(rep) => rep,
            Err(cause) => {
                if let ExecutionError::Scheduler(
                    SchedulerError::MemberFailed { runs, .. }
                    | SchedulerError::GroupTimeout { runs, .. },
                ) = &cause
                {
                    session_state.metadata.node_runs.extend(runs.iter().cloned());
                }
                session_state
                    .metadata
                    .errors
                    .push(Self::error_event_for(session_id, &session_state, &cause));
                session_state.metadata.finish(RunStatus::Failed);
                let metadata = session_state.metadata.clone();
                // Save back to sessions map so callers can inspect accumulated errors
                self.sessions.insert(session_id.to_string(), session_state);
                // Re-persist if autosave
                if self.autosave
                    && let Some(cp) = &self.checkpointer
                    && let Some(s) = self.sessions.get(session_id)
                {
                    let _ = cp
                        .save(Checkpoint::from_session(session_id, s, Vec::new()))
                        .await;
                }
                return Err(RunError { cause, metadata });
            }
        };

        // Evaluate post-execution interrupts before reinserting, so the
        // paused report can carry the owned session state.
        if let Some(node) = step_report
            .ran_nodes
            .iter()
            .find(|n| options.interrupt_after.contains(n))
        {
            let persisted = session_state.clone();
            self.sessions.insert(session_id.to_string(), persisted);
            self.maybe_checkpoint(
                session_id,
                step_report.step,
                &step_report.barrier_outcome.updated_fields,
            )
            .await;
            return Ok(StepResult::Paused(PausedReport {
                session_state,
                reason: PausedReason::AfterNode(node.clone()),
            }));
        }
        if options.interrupt_each_step {
            let persisted = session_state.clone();
            self.sessions.insert(session_id.to_string(), persisted);
            self.maybe_checkpoint(
                session_id,
                step_report.step,
                &step_report.barrier_outcome.updated_fields,
            )
            .await;
            return Ok(StepResult::Paused(PausedReport {
                session_state,
                reason: PausedReason::AfterStep(step_report.step),
            }));
        }

        // Normal completion path: reinsert the owned session state directly
        self.sessions.insert(session_id.to_string(), session_state);
        self.maybe_checkpoint(
            session_id,
            step_report.step,
            &step_report.barrier_outcome.updated_fields,
        )
        .await;
        Ok(StepResult::Completed(step_report))
    }

    /// Execute the node or group under the cursor.
    ///
    /// Condition nodes never run work; they resolve routing inline and the
    /// barrier then sees an empty output set.
    async fn execute_cursor(
        &self,
        session_state: &mut SessionState,
        cursor: &NodeId,
        step: u64,
    ) -> Result<CursorOutcome, ExecutionError> {
        if let Some(group) = self.app.group(cursor) {
            let mut specs = Vec::with_capacity(group.members.len());
            for member in &group.members {
                let spec = self.app.nodes().get(member).cloned().ok_or_else(|| {
                    ExecutionError::MissingNode {
                        node: member.to_string(),
                    }
                })?;
                specs.push((member.clone(), spec));
            }
            let snapshot = session_state.state.snapshot();
            let report = session_state
                .scheduler
                .run_group(group, specs, snapshot, step, self.event_bus.get_sender())
                .await?;

            for (member, output) in report.run_ids.iter().zip(report.outputs.iter()) {
                if let Some(next) = &output.next {
                    tracing::warn!(
                        group = %group.name,
                        member = %member,
                        next = %next,
                        "explicit next from a group member is ignored; the group's edges route"
                    );
                }
            }
            session_state.metadata.node_runs.extend(report.runs);
            session_state.metadata.errors.extend(report.errors);
            return Ok(CursorOutcome {
                ran_nodes: report.run_ids,
                outputs: report.outputs,
                routed: None,
            });
        }

        let Some(spec) = self.app.nodes().get(cursor) else {
            return Err(ExecutionError::MissingNode {
                node: cursor.to_string(),
            });
        };

        if let NodeSpec::Condition(condition) = spec {
            let snapshot = session_state.state.snapshot();
            let (label, target) = condition.evaluate(&snapshot);
            let Some(target) = target else {
                session_state.metadata.node_runs.push(NodeRun {
                    node: cursor.clone(),
                    step,
                    status: RunStatus::Failed,
                    duration_ms: 0,
                    error: Some(format!("no route for label {label:?}")),
                });
                return Err(ExecutionError::Routing {
                    node: cursor.to_string(),
                    label,
                    expected: condition.labels(),
                });
            };
            tracing::debug!(step, node = %cursor, label = %label, target = %target, "condition routed");
            session_state.metadata.node_runs.push(NodeRun {
                node: cursor.clone(),
                step,
                status: RunStatus::Completed,
                duration_ms: 0,
                error: None,
            });
            return Ok(CursorOutcome {
                ran_nodes: vec![cursor.clone()],
                outputs: vec![],
                routed: Some(target.clone()),
            });
        }

        let snapshot = session_state.state.snapshot();
        let ctx = NodeContext {
            node_id: cursor.to_string(),
            step,
            event_bus_sender: self.event_bus.get_sender(),
        };
        let started = Instant::now();
        match spec.execute(snapshot, ctx).await {
            Ok(output) => {
                session_state.metadata.node_runs.push(NodeRun {
                    node: cursor.clone(),
                    step,
                    status: RunStatus::Completed,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: None,
                });
                Ok(CursorOutcome {
                    ran_nodes: vec![cursor.clone()],
                    outputs: vec![output],
                    routed: None,
                })
            }
            Err(source) => {
                session_state.metadata.node_runs.push(NodeRun {
                    node: cursor.clone(),
                    step,
                    status: RunStatus::Failed,
                    duration_ms: started.elapsed().as_millis() as u64,
                    error: Some(source.to_string()),
                });
                Err(ExecutionError::NodeRun {
                    node: cursor.to_string(),
                    step,
                    source,
                })
            }
        }
    }

    /// Apply barrier and update session state with the results.
    #[instrument(skip(self, session_state, outputs, ran), err)]
    async fn apply_barrier_and_update(
        &self,
        session_state: &mut SessionState,
        ran: &[NodeId],
        outputs: Vec<NodeOutput>,
    ) -> Result<BarrierOutcome, ExecutionError> {
        let mut update_state = session_state.state.clone();
        let outcome = self
            .app
            .apply_barrier(&mut update_state, ran, outputs)
            .await?;
        session_state.state = update_state;
        Ok(outcome)
    }

    /// Resolve where the cursor moves after `from` finished.
    ///
    /// Precedence: explicit next from the node's output, then guarded edges
    /// in declaration order, then the single unconditional fallback. When
    /// nothing matches, a terminal node completes the run and any other node
    /// is a routing dead end.
    fn resolve_route(
        &self,
        from: &NodeId,
        explicit_next: Option<&NodeId>,
        snapshot: &StateSnapshot,
        step: u64,
    ) -> Result<NodeId, ExecutionError> {
        if let Some(next) = explicit_next {
            if *next == NodeId::End {
                return Ok(NodeId::End);
            }
            let known =
                self.app.nodes().contains_key(next) || self.app.group(next).is_some();
            if !known || *next == NodeId::Start {
                return Err(ExecutionError::MissingNode {
                    node: next.to_string(),
                });
            }
            tracing::debug!(step, from = %from, to = %next, "explicit next taken");
            return Ok(next.clone());
        }

        if let Some(edges) = self.app.edges().get(from) {
            for edge in edges.iter().filter(|e| e.is_conditional()) {
                if let Some(guard) = edge.guard()
                    && guard(snapshot)
                {
                    tracing::debug!(step, from = %from, to = %edge.to(), "guarded edge taken");
                    return Ok(edge.to().clone());
                }
            }
            if let Some(fallback) = edges.iter().find(|e| !e.is_conditional()) {
                tracing::debug!(step, from = %from, to = %fallback.to(), "fallback edge taken");
                return Ok(fallback.to().clone());
            }
        }

        if self.app.is_terminal(from) {
            tracing::debug!(step, from = %from, "terminal node reached, run completes");
            return Ok(NodeId::End);
        }

        Err(ExecutionError::NoRoute {
            node: from.to_string(),
            step,
        })
    }

    /// Conditionally persist a checkpoint for the given session if autosave is enabled.
    async fn maybe_checkpoint(&self, session_id: &str, step: u64, updated_fields: &[String]) {
        let checkpoint_span = tracing::info_span!("checkpoint", step);
        checkpoint_span
            .in_scope(|| async {
                if self.autosave
                    && let Some(checkpointer) = &self.checkpointer
                    && let Some(session_state) = self.sessions.get(session_id)
                {
                    let _ = checkpointer
                        .save(Checkpoint::from_session(
                            session_id,
                            session_state,
                            updated_fields.to_vec(),
                        ))
                        .await;
                    tracing::debug!(session = %session_id, step, "checkpoint saved");
                }
            })
            .await;
    }

    /// Helper method that executes exactly one superstep on the given session state.
    ///
    /// Runs the cursor, applies the barrier, and routes the cursor; the
    /// caller persists and reinserts the session.
    #[instrument(skip(self, session_state), err)]
    async fn run_one_superstep(
        &self,
        session_state: &mut SessionState,
    ) -> Result<StepReport, ExecutionError> {
        let limit = self.app.runtime_config().max_iterations;
        if session_state.step >= u64::from(limit) {
            return Err(ExecutionError::MaxIterationsExceeded { limit });
        }

        session_state.step += 1;
        let step = session_state.step;
        if session_state.metadata.status == RunStatus::Idle {
            session_state.metadata.status = RunStatus::Running;
        }
        session_state.metadata.iterations += 1;

        let cursor = session_state.cursor.clone();
        tracing::debug!(step, cursor = %cursor, "starting superstep");

        // Phase 1: execute the node or group under the cursor
        let schedule_span = tracing::info_span!("schedule", step, cursor = %cursor);
        let executed = schedule_span
            .in_scope(|| self.execute_cursor(session_state, &cursor, step))
            .await?;
        let CursorOutcome {
            ran_nodes,
            outputs,
            routed,
        } = executed;

        // A group's members never steer routing; only a single node's
        // explicit next does.
        let explicit_next = if self.app.group(&cursor).is_some() {
            None
        } else {
            outputs.first().and_then(|o| o.next.clone())
        };

        // Phase 2: apply barrier and update state
        let errors_in_outputs = outputs
            .iter()
            .filter_map(|o| o.errors.as_ref())
            .map(|e| e.len())
            .sum::<usize>();
        let barrier_span =
            tracing::info_span!("barrier", step, ran = ran_nodes.len(), errors_in_outputs);
        let barrier_outcome = barrier_span
            .in_scope(|| self.apply_barrier_and_update(session_state, &ran_nodes, outputs))
            .await?;
        session_state
            .metadata
            .errors
            .extend(barrier_outcome.errors.iter().cloned());

        // Phase 3: route the cursor
        let route_span = tracing::info_span!("route", step, from = %cursor);
        let next_cursor = match routed {
            Some(target) => target,
            None => route_span.in_scope(|| {
                self.resolve_route(
                    &cursor,
                    explicit_next.as_ref(),
                    &session_state.state.snapshot(),
                    step,
                )
            })?,
        };

        tracing::debug!(
            step,
            updated_fields = ?barrier_outcome.updated_fields,
            error_count = barrier_outcome.errors.len(),
            "barrier applied"
        );
        tracing::debug!(step, next_cursor = %next_cursor, "cursor routed");

        session_state.cursor = next_cursor.clone();
        let completed = next_cursor == NodeId::End;
        if completed {
            session_state.metadata.finish(RunStatus::Completed);
        }

        Ok(StepReport {
            step,
            ran_nodes,
            barrier_outcome,
            next_cursor,
            state_versions: session_state.state.versions(),
            completed,
        })
    }

    /// Run until the cursor reaches End - the canonical execution method.
    #[instrument(skip(self), err)]
    pub async fn run_until_complete(
        &mut self,
        session_id: &str,
    ) -> Result<GraphState, RunError> {
        tracing::info!(session = %session_id, "run started");
        self.emit_diagnostic(format!("session={session_id} run started"));

        loop {
            // Check if we're done before trying to run
            let session_state = self.sessions.get(session_id).ok_or_else(|| {
                Self::fail(
                    ExecutionMetadata::new(session_id),
                    ExecutionError::SessionNotFound {
                        session_id: session_id.to_string(),
                    },
                )
            })?;

            if session_state.is_complete() {
                tracing::info!(
                    session = %session_id,
                    step = session_state.step,
                    "cursor reached End"
                );
                break;
            }

            let step_result = match self.run_step(session_id, StepOptions::default()).await {
                Ok(res) => res,
                Err(err) => {
                    let step = self.sessions.get(session_id).map(|s| s.step);
                    self.emit_diagnostic(match step {
                        Some(step) => format!(
                            "session={session_id} status=error step={step} error={}",
                            err.cause
                        ),
                        None => format!("session={session_id} status=error error={}", err.cause),
                    });
                    return Err(err);
                }
            };

            match step_result {
                StepResult::Completed(report) => {
                    if report.completed {
                        break;
                    }
                }
                StepResult::Paused(_) => {
                    // Default options never request a pause.
                    let metadata = self
                        .sessions
                        .get(session_id)
                        .map(|s| s.metadata.clone())
                        .unwrap_or_else(|| ExecutionMetadata::new(session_id));
                    return Err(Self::fail(metadata, ExecutionError::UnexpectedPause));
                }
            }
        }

        let (final_state, final_step) = {
            let session_state = self.sessions.get(session_id).ok_or_else(|| {
                Self::fail(
                    ExecutionMetadata::new(session_id),
                    ExecutionError::SessionNotFound {
                        session_id: session_id.to_string(),
                    },
                )
            })?;
            (session_state.state.clone(), session_state.step)
        };

        tracing::info!(session = %session_id, step = final_step, "run completed");
        self.emit_diagnostic(format!(
            "session={session_id} status=completed step={final_step}"
        ));
        Ok(final_state)
    }

    /// Get a snapshot of the current session state.
    #[must_use]
    pub fn get_session(&self, session_id: &str) -> Option<&SessionState> {
        self.sessions.get(session_id)
    }

    /// List all active session IDs.
    #[must_use]
    pub fn list_sessions(&self) -> Vec<&String> {
        self.sessions.keys().collect()
    }
}

impl AppRunner {
    /// Stamp metadata as failed and pair it with the cause.
    fn fail(mut metadata: ExecutionMetadata, cause: ExecutionError) -> RunError {
        metadata.finish(RunStatus::Failed);
        RunError { cause, metadata }
    }

    /// Translate a fatal cause into the error event recorded in metadata.
    fn error_event_for(
        session_id: &str,
        session_state: &SessionState,
        cause: &ExecutionError,
    ) -> ErrorEvent {
        match cause {
            ExecutionError::NodeRun { node, step, source } => {
                ErrorEvent::node(node.clone(), *step, ErrorChain::from_error(source))
            }
            ExecutionError::Scheduler(SchedulerError::MemberFailed {
                group,
                member,
                source,
                ..
            }) => ErrorEvent::group(
                group.clone(),
                session_state.step,
                ErrorChain::msg(format!("member {member} failed: {source}")),
            )
            .with_tag("parallel"),
            ExecutionError::Scheduler(SchedulerError::GroupTimeout {
                group,
                timeout_ms,
                join,
                ..
            }) => ErrorEvent::group(
                group.clone(),
                session_state.step,
                ErrorChain::msg(format!(
                    "timed out after {timeout_ms} ms waiting for join {join}"
                )),
            )
            .with_tag("timeout"),
            _ => ErrorEvent::runner(
                session_id,
                session_state.step,
                ErrorChain::msg(cause.to_string()),
            )
            .with_context(serde_json::json!({
                "cursor": session_state.cursor.encode()
            })),
        }
    }

    fn emit_diagnostic(&self, message: String) {
        if let Err(err) = self
            .event_bus
            .get_sender()
            .send(Event::diagnostic("runner", message))
        {
            tracing::debug!(error = %err, "failed to emit runner diagnostic");
        }
    }
}
