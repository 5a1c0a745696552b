//! Conversational agent wrapper over a compiled workflow graph.
//!
//! An [`Agent`] turns an [`App`] into a request/response surface: each call
//! to [`Agent::run`] records the request in session [`memory`](crate::memory),
//! invokes the graph, extracts the response from a configured state field,
//! and records the answer. With state preservation enabled, the final state
//! of one run seeds the next, so multi-turn flows can build on earlier work
//! without re-deriving it.
//!
//! The agent sits strictly above the engine. Nodes never see memory unless
//! the graph is built to read it, and clearing preserved state
//! ([`Agent::clear_state`]) never touches memory; the two lifetimes are
//! independent by contract.

use std::path::PathBuf;
use std::sync::Arc;

use miette::Diagnostic;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::instrument;

use crate::app::App;
use crate::memory::{AgentMemory, MemoryError, MemoryRecord};
use crate::runtimes::{AppRunner, CheckpointerType, RunError};
use crate::state::{GraphState, INPUT_FIELD};
use crate::utils::id_generator::IdGenerator;

/// State field the agent reads the response from unless overridden.
pub const RESPONSE_FIELD: &str = "response";

/// Errors raised by the agent wrapper.
#[derive(Debug, Error, Diagnostic)]
pub enum AgentError {
    #[error(transparent)]
    #[diagnostic(code(stategraph::agent::run))]
    Run(#[from] RunError),

    #[error(transparent)]
    #[diagnostic(code(stategraph::agent::memory))]
    Memory(#[from] MemoryError),

    #[error("state has no {key:?} field to answer from")]
    #[diagnostic(
        code(stategraph::agent::missing_response),
        help("Point with_response_key at the field your terminal node writes.")
    )]
    MissingResponse { key: String },
}

/// A conversational wrapper around one compiled graph.
///
/// # Examples
///
/// ```rust,no_run
/// # use stategraph::app::App;
/// use stategraph::agent::Agent;
/// # async fn example(app: App) -> Result<(), Box<dyn std::error::Error>> {
///
/// let mut agent = Agent::builder(app)
///     .with_session_id("support-1742")
///     .preserve_state(true)
///     .build()?;
///
/// let first = agent.run("What plans do you offer?").await?;
/// let second = agent.run("And the cheapest of those?").await?;
/// println!("{first}\n{second}");
///
/// // Two requests and two responses were remembered.
/// assert_eq!(agent.memory().len(), 4);
/// # Ok(())
/// # }
/// ```
pub struct Agent {
    app: Arc<App>,
    session_id: String,
    response_key: String,
    preserve_state: bool,
    checkpointer: CheckpointerType,
    memory: AgentMemory,
    last_state: Option<GraphState>,
    turns: u64,
}

impl Agent {
    /// Start configuring an agent for the given graph.
    #[must_use]
    pub fn builder(app: App) -> AgentBuilder {
        Self::builder_from_arc(Arc::new(app))
    }

    /// Builder variant for an already shared graph.
    #[must_use]
    pub fn builder_from_arc(app: Arc<App>) -> AgentBuilder {
        AgentBuilder {
            app,
            session_id: None,
            response_key: RESPONSE_FIELD.to_string(),
            preserve_state: false,
            checkpointer: None,
            memory_dir: None,
        }
    }

    /// Handle one request: remember it, run the graph, remember and return
    /// the response.
    ///
    /// The request lands in the initial state's `input` field. When state
    /// preservation is on, the rest of the initial state is the final state
    /// of the previous run.
    #[instrument(skip(self, request), fields(session = %self.session_id), err)]
    pub async fn run(&mut self, request: impl Into<String>) -> Result<String, AgentError> {
        let request = request.into();
        self.memory.append(MemoryRecord::user(&request))?;

        let mut initial = self.base_state();
        initial.set(INPUT_FIELD, json!(request));

        let response = self.invoke_graph(initial).await?;
        self.memory.append(MemoryRecord::assistant(&response))?;
        Ok(response)
    }

    /// Run the graph again without a new request.
    ///
    /// Useful for "keep going" turns where the graph works from preserved
    /// state alone. No user record is appended; the response still is.
    #[instrument(skip(self), fields(session = %self.session_id), err)]
    pub async fn run_again(&mut self) -> Result<String, AgentError> {
        let initial = self.base_state();
        let response = self.invoke_graph(initial).await?;
        self.memory.append(MemoryRecord::assistant(&response))?;
        Ok(response)
    }

    /// Forget preserved state and reset the turn counter.
    ///
    /// Memory is untouched; use [`clear_memory`](Self::clear_memory) for
    /// that.
    pub fn clear_state(&mut self) {
        self.last_state = None;
        self.turns = 0;
    }

    /// Drop all memory records for this session.
    pub fn clear_memory(&mut self) -> Result<(), MemoryError> {
        self.memory.clear()
    }

    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Completed run attempts since construction or the last
    /// [`clear_state`](Self::clear_state).
    #[must_use]
    pub fn turns(&self) -> u64 {
        self.turns
    }

    #[must_use]
    pub fn memory(&self) -> &AgentMemory {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut AgentMemory {
        &mut self.memory
    }

    /// Final state of the most recent run, when preservation is enabled.
    #[must_use]
    pub fn last_state(&self) -> Option<&GraphState> {
        self.last_state.as_ref()
    }

    fn base_state(&self) -> GraphState {
        if self.preserve_state {
            self.last_state.clone().unwrap_or_default()
        } else {
            GraphState::new()
        }
    }

    async fn invoke_graph(&mut self, initial: GraphState) -> Result<String, AgentError> {
        self.turns += 1;
        // A fresh runner session per turn; the agent's session id scopes
        // memory, not checkpoints, so a completed turn is never resumed.
        let run_id = IdGenerator::new().generate_run_id();
        let mut runner =
            AppRunner::with_options_arc(self.app.clone(), self.checkpointer, true).await;
        runner.create_session(run_id.clone(), initial).await?;
        let final_state = runner.run_until_complete(&run_id).await?;

        let response = self.extract_response(&final_state)?;
        if self.preserve_state {
            self.last_state = Some(final_state);
        }
        Ok(response)
    }

    fn extract_response(&self, state: &GraphState) -> Result<String, AgentError> {
        match state.get(&self.response_key) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(other) => Ok(other.to_string()),
            None => Err(AgentError::MissingResponse {
                key: self.response_key.clone(),
            }),
        }
    }
}

/// Configures and constructs an [`Agent`].
pub struct AgentBuilder {
    app: Arc<App>,
    session_id: Option<String>,
    response_key: String,
    preserve_state: bool,
    checkpointer: Option<CheckpointerType>,
    memory_dir: Option<PathBuf>,
}

impl AgentBuilder {
    /// Scope memory (and generated ids) to an explicit session id instead
    /// of a generated one.
    #[must_use]
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Read responses from this state field instead of `"response"`.
    #[must_use]
    pub fn with_response_key(mut self, key: impl Into<String>) -> Self {
        self.response_key = key.into();
        self
    }

    /// Carry each run's final state into the next run's initial state.
    #[must_use]
    pub fn preserve_state(mut self, preserve: bool) -> Self {
        self.preserve_state = preserve;
        self
    }

    /// Checkpointer for the per-turn runner sessions. Defaults to the
    /// graph's configured checkpointer, then to in-memory.
    #[must_use]
    pub fn with_checkpointer(mut self, checkpointer: CheckpointerType) -> Self {
        self.checkpointer = Some(checkpointer);
        self
    }

    /// Persist memory as JSONL under this directory, reloading any existing
    /// records for the session id.
    #[must_use]
    pub fn with_memory_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.memory_dir = Some(dir.into());
        self
    }

    /// Build the agent, loading persistent memory when configured.
    pub fn build(self) -> Result<Agent, AgentError> {
        let session_id = self
            .session_id
            .unwrap_or_else(|| IdGenerator::new().generate_session_id());
        let memory = match self.memory_dir {
            Some(dir) => AgentMemory::persistent(&session_id, dir)?,
            None => AgentMemory::in_memory(&session_id),
        };
        let checkpointer = self
            .checkpointer
            .or_else(|| self.app.runtime_config().checkpointer.clone())
            .unwrap_or(CheckpointerType::InMemory);
        Ok(Agent {
            app: self.app,
            session_id,
            response_key: self.response_key,
            preserve_state: self.preserve_state,
            checkpointer,
            memory,
            last_state: None,
            turns: 0,
        })
    }
}
