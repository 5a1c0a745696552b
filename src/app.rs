use rustc_hash::{FxHashMap, FxHashSet};
use serde_json::Value;
use tracing::instrument;

use crate::errors::{ErrorEvent, ErrorScope};
use crate::event_bus::{ChannelSink, Event, EventBus, EventSink};
use crate::graphs::{Edge, NodeSpec, ParallelGroup};
use crate::node::NodeOutput;
use crate::reducers::{ReducerError, ReducerRegistry};
use crate::runtimes::runner::RunError;
use crate::runtimes::{AppRunner, CheckpointerType, RuntimeConfig, SessionInit};
use crate::state::GraphState;
use crate::types::NodeId;
use crate::utils::id_generator::IdGenerator;

/// Orchestrates graph execution and applies reducers at barriers.
///
/// `App` is the central coordination point for workflow execution, managing:
/// - Node graph topology (nodes, edges, condition routes, parallel groups)
/// - State reduction through configurable reducers
/// - Runtime configuration and checkpointing
///
/// # Examples
///
/// ```rust,no_run
/// use stategraph::graphs::GraphBuilder;
/// use stategraph::state::GraphState;
/// use stategraph::types::NodeId;
/// use stategraph::node::{NodeHandler, NodeContext, NodeError, NodeOutput};
/// use async_trait::async_trait;
///
/// # struct MyNode;
/// # #[async_trait]
/// # impl NodeHandler for MyNode {
/// #     async fn run(&self, _: stategraph::state::StateSnapshot, _: NodeContext) -> Result<NodeOutput, NodeError> {
/// #         Ok(NodeOutput::default())
/// #     }
/// # }
/// #
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let app = GraphBuilder::new()
///     .add_node("process", MyNode)
///     .add_edge(NodeId::Start, "process")
///     .add_edge("process", NodeId::End)
///     .compile()?;
///
/// let initial_state = GraphState::new_with_input("Hello");
/// let final_state = app.invoke(initial_state).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct App {
    nodes: FxHashMap<NodeId, NodeSpec>,
    edges: FxHashMap<NodeId, Vec<Edge>>,
    groups: Vec<ParallelGroup>,
    terminal: FxHashSet<NodeId>,
    registry: ReducerRegistry,
    runtime_config: RuntimeConfig,
}

/// Result of applying node outputs at a superstep barrier.
///
/// The outcome aggregates field and error information in a deterministic
/// order so downstream consumers (runner, checkpointers, tests) observe
/// stable behaviour across executions.
#[derive(Debug, Clone, Default)]
pub struct BarrierOutcome {
    /// Fields whose value changed during the barrier, sorted by name.
    pub updated_fields: Vec<String>,
    /// Aggregated error records reported by nodes in the superstep.
    pub errors: Vec<ErrorEvent>,
}

impl App {
    /// Internal (crate) factory to build an App while keeping the topology private.
    pub(crate) fn from_parts(
        nodes: FxHashMap<NodeId, NodeSpec>,
        edges: FxHashMap<NodeId, Vec<Edge>>,
        groups: Vec<ParallelGroup>,
        terminal: FxHashSet<NodeId>,
        registry: ReducerRegistry,
        runtime_config: RuntimeConfig,
    ) -> Self {
        App {
            nodes,
            edges,
            groups,
            terminal,
            registry,
            runtime_config,
        }
    }

    /// Returns a reference to the nodes registry.
    ///
    /// Nodes are keyed by their `NodeId` and stored as the [`NodeSpec`]
    /// variant they were registered with (computation, tool, or condition).
    #[must_use]
    pub fn nodes(&self) -> &FxHashMap<NodeId, NodeSpec> {
        &self.nodes
    }

    /// Returns a reference to the static edges in this graph.
    ///
    /// Each entry maps a source to its outgoing edges in declaration order;
    /// guarded edges precede routing fallbacks only by virtue of the runner's
    /// evaluation rules, not by position.
    #[must_use]
    pub fn edges(&self) -> &FxHashMap<NodeId, Vec<Edge>> {
        &self.edges
    }

    /// Returns the parallel groups declared on this graph.
    #[must_use]
    pub fn groups(&self) -> &[ParallelGroup] {
        &self.groups
    }

    /// Looks up a parallel group by its routable id.
    #[must_use]
    pub fn group(&self, id: &NodeId) -> Option<&ParallelGroup> {
        self.groups.iter().find(|g| g.node_id() == *id)
    }

    /// True when `id` was marked terminal: reaching it completes the run
    /// without requiring an edge to `End`.
    #[must_use]
    pub fn is_terminal(&self, id: &NodeId) -> bool {
        self.terminal.contains(id)
    }

    /// Returns the reducer registry used at barriers.
    #[must_use]
    pub fn registry(&self) -> &ReducerRegistry {
        &self.registry
    }

    /// Returns a reference to the runtime configuration.
    #[must_use]
    pub fn runtime_config(&self) -> &RuntimeConfig {
        &self.runtime_config
    }

    fn resolve_checkpointer(&self, override_config: Option<CheckpointerType>) -> CheckpointerType {
        override_config
            .or_else(|| self.runtime_config.checkpointer.clone())
            .unwrap_or(CheckpointerType::InMemory)
    }

    /// Internal helper that centralises runner setup for the public `invoke*` helpers.
    ///
    /// - `R` represents any auxiliary handle the caller wants to extract alongside
    ///   the run result (for example, an event receiver when wiring a channel).
    /// - `F` is a closure that is invoked exactly once to construct the `EventBus`
    ///   together with that auxiliary handle. Using `FnOnce` lets the closure move
    ///   ownership of channels or sink vectors.
    async fn invoke_with_bus_builder<R, F>(
        &self,
        initial_state: GraphState,
        autosave: bool,
        checkpointer_override: Option<CheckpointerType>,
        build_event_bus: F,
    ) -> (Result<GraphState, RunError>, R)
    where
        F: FnOnce() -> (EventBus, R),
    {
        let (event_bus, output) = build_event_bus();
        let checkpointer_type = self.resolve_checkpointer(checkpointer_override);

        let runner = AppRunner::with_options_and_bus(
            self.clone(),
            checkpointer_type,
            autosave,
            event_bus,
            true,
        )
        .await;

        let session_id = self.next_session_id();
        let result = Self::run_session(runner, session_id, initial_state).await;

        (result, output)
    }

    /// Execute the entire workflow until completion.
    ///
    /// This is the primary entry point for simple workflow execution. It
    /// creates an [`AppRunner`] with the runtime-configured event bus (stdout
    /// sink by default), starts a session, and drives supersteps until the
    /// run reaches `End`, a terminal node, or fails.
    ///
    /// The session id comes from the runtime configuration when set, and is
    /// generated otherwise. When a checkpointer holds earlier state for that
    /// session, execution resumes after the last checkpointed step instead of
    /// re-running it.
    ///
    /// # Parameters
    /// * `initial_state` - The starting state for workflow execution
    ///
    /// # Returns
    /// * `Ok(GraphState)` - The final state after workflow completion
    /// * `Err(RunError)` - The failure cause together with the execution
    ///   metadata accumulated up to the failure
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use stategraph::state::GraphState;
    /// # use stategraph::app::App;
    /// # async fn example(app: App) -> Result<(), Box<dyn std::error::Error>> {
    /// let initial = GraphState::new_with_input("Start workflow");
    /// let final_state = app.invoke(initial).await?;
    /// println!("Workflow completed with {} fields", final_state.len());
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, initial_state), err)]
    pub async fn invoke(&self, initial_state: GraphState) -> Result<GraphState, RunError> {
        self.invoke_with_bus_builder(
            initial_state,
            true,
            self.runtime_config.checkpointer.clone(),
            || (self.runtime_config.event_bus.build_event_bus(), ()),
        )
        .await
        .0
    }

    /// Execute the workflow while streaming events to a channel.
    ///
    /// Appends a [`ChannelSink`] to the runtime-configured sinks, so any
    /// existing logging destinations remain active while the caller consumes
    /// the live feed. Autosave is disabled for this variant; pair it with an
    /// explicit [`AppRunner`] when checkpoint-per-step behaviour matters.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use stategraph::state::GraphState;
    /// # use stategraph::app::App;
    /// # async fn example(app: App) -> Result<(), Box<dyn std::error::Error>> {
    /// let (result, mut events) = app
    ///     .invoke_with_channel(GraphState::new_with_input("Process this"))
    ///     .await;
    ///
    /// tokio::spawn(async move {
    ///     while let Some(event) = events.recv().await {
    ///         println!("Event: {event}");
    ///     }
    /// });
    ///
    /// let final_state = result?;
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, initial_state))]
    pub async fn invoke_with_channel(
        &self,
        initial_state: GraphState,
    ) -> (
        Result<GraphState, RunError>,
        tokio::sync::mpsc::UnboundedReceiver<Event>,
    ) {
        self.invoke_with_bus_builder(
            initial_state,
            false,
            self.runtime_config.checkpointer.clone(),
            || {
                let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
                let event_bus = self.runtime_config.event_bus.build_event_bus();
                event_bus.add_sink(ChannelSink::new(tx));
                (event_bus, rx)
            },
        )
        .await
    }

    /// Execute the workflow with additional custom event sinks.
    ///
    /// Sinks configured on the `RuntimeConfig` remain active; the provided
    /// collection is appended so callers can layer extra destinations without
    /// rebuilding the app.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use stategraph::event_bus::MemorySink;
    /// use stategraph::state::GraphState;
    /// # use stategraph::app::App;
    /// # async fn example(app: App) -> Result<(), Box<dyn std::error::Error>> {
    /// let captured = MemorySink::new();
    /// let final_state = app
    ///     .invoke_with_sinks(
    ///         GraphState::new_with_input("Process data"),
    ///         vec![Box::new(captured.clone())],
    ///     )
    ///     .await?;
    /// println!("saw {} events", captured.len());
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, initial_state, sinks), err)]
    pub async fn invoke_with_sinks(
        &self,
        initial_state: GraphState,
        sinks: Vec<Box<dyn EventSink>>,
    ) -> Result<GraphState, RunError> {
        self.invoke_with_bus_builder(
            initial_state,
            false,
            self.runtime_config.checkpointer.clone(),
            move || {
                let event_bus = self.runtime_config.event_bus.build_event_bus();
                for sink in sinks {
                    event_bus.add_boxed_sink(sink);
                }
                (event_bus, ())
            },
        )
        .await
        .0
    }

    /// Generate the session identifier for the next invocation.
    ///
    /// Prefers an explicit session id from the runtime configuration and
    /// falls back to a randomly generated identifier when none is supplied.
    fn next_session_id(&self) -> String {
        self.runtime_config
            .session_id
            .clone()
            .unwrap_or_else(|| IdGenerator::new().generate_run_id())
    }

    /// Drive a workflow session to completion, resuming from checkpoints when available.
    async fn run_session(
        mut runner: AppRunner,
        session_id: String,
        initial_state: GraphState,
    ) -> Result<GraphState, RunError> {
        let init_state = runner
            .create_session(session_id.clone(), initial_state)
            .await?;

        if let SessionInit::Resumed { checkpoint_step } = init_state {
            tracing::info!(
                session = %session_id,
                checkpoint_step,
                "Resuming session from checkpoint"
            );
        }

        runner.run_until_complete(&session_id).await
    }

    /// Merge node outputs into the shared state at a superstep barrier.
    ///
    /// All outputs produced in one superstep are applied through the reducer
    /// registry in a deterministic order: outputs in `run_ids` order (for a
    /// parallel group, that is member declaration order), fields within each
    /// output sorted by name. A field's version bumps at most once per
    /// barrier, and only when the merged value actually differs from the
    /// value before the barrier.
    ///
    /// Error records reported by nodes are aggregated into the returned
    /// [`BarrierOutcome`] in scope order (node before group before runner)
    /// rather than written into the state.
    ///
    /// # Parameters
    /// * `state` - Mutable reference to the current graph state
    /// * `run_ids` - Node ids that executed in this superstep, declaration order
    /// * `outputs` - One output per executed node, parallel to `run_ids`
    #[instrument(skip(self, state, run_ids, outputs), err)]
    pub async fn apply_barrier(
        &self,
        state: &mut GraphState,
        run_ids: &[NodeId],
        outputs: Vec<NodeOutput>,
    ) -> Result<BarrierOutcome, ReducerError> {
        let mut before: FxHashMap<String, (Option<Value>, u32)> = FxHashMap::default();
        let mut touched: Vec<String> = Vec::new();
        let mut errors_all: Vec<ErrorEvent> = Vec::new();

        for (i, output) in outputs.iter().enumerate() {
            let fallback = NodeId::Named("?".to_string());
            let nid = run_ids.get(i).unwrap_or(&fallback);

            if let Some(errs) = &output.errors
                && !errs.is_empty()
            {
                tracing::debug!(node = %nid, count = errs.len(), "node reported errors");
                errors_all.extend(errs.clone());
            }

            let Some(update) = &output.update else {
                continue;
            };
            if update.is_empty() {
                continue;
            }
            tracing::debug!(node = %nid, fields = update.len(), "node produced updates");

            // Sort keys so the merge order is stable across runs.
            let mut pairs: Vec<(&String, &Value)> = update.iter().collect();
            pairs.sort_by(|(left, _), (right, _)| left.cmp(right));
            for (field, value) in pairs {
                if !before.contains_key(field.as_str()) {
                    before.insert(
                        field.clone(),
                        (state.get(field).cloned(), state.version(field)),
                    );
                    touched.push(field.clone());
                }
                let merged = self.registry.apply_field(field, state.get(field), value)?;
                state.write_raw(field, merged);
            }
        }

        fn scope_sort_key(scope: &ErrorScope) -> (u8, &str, u64) {
            match scope {
                ErrorScope::Node { node, step } => (0, node.as_str(), *step),
                ErrorScope::Group { group, step } => (1, group.as_str(), *step),
                ErrorScope::Runner { session, step } => (2, session.as_str(), *step),
                ErrorScope::App => (3, "", 0),
            }
        }

        // Sort aggregated errors so downstream consumers observe a stable order.
        errors_all.sort_by(|a, b| {
            let key_a = scope_sort_key(&a.scope);
            let key_b = scope_sort_key(&b.scope);
            key_a
                .cmp(&key_b)
                .then_with(|| a.when.cmp(&b.when))
                .then_with(|| a.error.message.cmp(&b.error.message))
        });

        // Bump versions once per barrier, and only on real change.
        touched.sort();
        let mut updated: Vec<String> = Vec::new();
        for field in touched {
            let (old_value, old_version) = before.remove(&field).unwrap_or((None, 0));
            if state.get(&field) != old_value.as_ref() {
                state.set_version(&field, old_version.saturating_add(1));
                tracing::info!(
                    target: "stategraph::app",
                    field = %field,
                    before_version = old_version,
                    after_version = state.version(&field),
                    "field updated"
                );
                updated.push(field);
            }
        }

        Ok(BarrierOutcome {
            updated_fields: updated,
            errors: errors_all,
        })
    }
}
