//! Checkpoint persistence for resumable runs.
//!
//! After every merge barrier the runner snapshots the session into a
//! [`Checkpoint`]: the post-merge state, the step number, and the cursor
//! that routing already resolved. Resuming a session restores that snapshot
//! and continues at the stored cursor, so no node is re-executed and none is
//! skipped.
//!
//! Two backends ship with the crate: [`InMemoryCheckpointer`] for tests and
//! ephemeral runs, and `SQLiteCheckpointer` (behind the `sqlite` feature)
//! for durable history.

use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use thiserror::Error;

use crate::runtimes::execution::ExecutionMetadata;
use crate::runtimes::session::SessionState;
use crate::schedulers::Scheduler;
use crate::state::GraphState;
use crate::types::NodeId;

/// Which checkpoint backend a runner should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointerType {
    /// Keep checkpoints in process memory. Lost on drop.
    InMemory,
    /// Persist checkpoints to a SQLite database.
    #[cfg(feature = "sqlite")]
    SQLite,
}

/// One persisted snapshot of a session.
///
/// The `cursor` is the node the session will execute next, resolved by
/// routing before the checkpoint was written.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    pub session_id: String,
    /// Step this snapshot was taken after. Step 0 is the initial checkpoint
    /// written at session creation.
    pub step: u64,
    /// Post-merge state as of `step`.
    pub state: GraphState,
    /// Node to execute next when resuming from this snapshot.
    pub cursor: NodeId,
    /// Fields the barrier changed at this step. Informational; empty for
    /// the initial checkpoint.
    pub updated_fields: Vec<String>,
    /// Scheduler concurrency limit the session was running with.
    pub concurrency_limit: usize,
    pub created_at: DateTime<Utc>,
}

impl Checkpoint {
    /// Snapshot a session, recording which fields the last barrier changed.
    #[must_use]
    pub fn from_session(
        session_id: impl Into<String>,
        session: &SessionState,
        updated_fields: Vec<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            step: session.step,
            state: session.state.clone(),
            cursor: session.cursor.clone(),
            updated_fields,
            concurrency_limit: session.scheduler.concurrency_limit(),
            created_at: Utc::now(),
        }
    }
}

/// Rebuild an in-memory session from a stored checkpoint.
///
/// The restored session carries fresh [`ExecutionMetadata`]; the step
/// counter and cursor continue where the checkpoint left off.
#[must_use]
pub fn restore_session_state(checkpoint: &Checkpoint) -> SessionState {
    SessionState {
        state: checkpoint.state.clone(),
        step: checkpoint.step,
        cursor: checkpoint.cursor.clone(),
        scheduler: Scheduler::new(checkpoint.concurrency_limit),
        metadata: ExecutionMetadata::new(checkpoint.session_id.clone()),
    }
}

/// Errors surfaced by checkpoint backends.
#[derive(Debug, Error, Diagnostic)]
pub enum CheckpointerError {
    #[error("checkpoint backend error: {message}")]
    #[diagnostic(code(stategraph::checkpointer::backend))]
    Backend { message: String },

    #[error("failed to encode {what}: {message}")]
    #[diagnostic(code(stategraph::checkpointer::serialization))]
    Serialization { what: &'static str, message: String },

    #[error("stored checkpoint for session {session_id} is missing {what}")]
    #[diagnostic(
        code(stategraph::checkpointer::corrupt_row),
        help("The history row predates this schema or was edited by hand.")
    )]
    CorruptRow {
        session_id: String,
        what: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, CheckpointerError>;

/// Persistence backend for session snapshots.
///
/// Implementations must keep at most one checkpoint per `(session, step)`
/// pair; saving the same step twice replaces the earlier row.
#[async_trait]
pub trait Checkpointer: Send + Sync {
    /// Persist one snapshot. Replaces any existing snapshot for the same
    /// session and step.
    async fn save(&self, checkpoint: Checkpoint) -> Result<()>;

    /// Load the most recent snapshot for a session, if any.
    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>>;

    /// All known session ids, in no particular order.
    async fn list_sessions(&self) -> Result<Vec<String>>;

    /// Full snapshot history for a session, ordered by ascending step.
    async fn list_checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>>;
}

/// Process-local checkpoint store backed by a map of session histories.
///
/// # Examples
///
/// ```rust,no_run
/// use stategraph::runtimes::{Checkpoint, Checkpointer, InMemoryCheckpointer};
/// use stategraph::state::GraphState;
/// use stategraph::types::NodeId;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let store = InMemoryCheckpointer::new();
/// let checkpoint = Checkpoint {
///     session_id: "sess-1".into(),
///     step: 1,
///     state: GraphState::new_with_input("hi"),
///     cursor: NodeId::from("summarize"),
///     updated_fields: vec!["input".into()],
///     concurrency_limit: 4,
///     created_at: chrono::Utc::now(),
/// };
/// store.save(checkpoint).await?;
///
/// let latest = store.load_latest("sess-1").await?;
/// assert_eq!(latest.map(|c| c.step), Some(1));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct InMemoryCheckpointer {
    sessions: Mutex<FxHashMap<String, Vec<Checkpoint>>>,
}

impl InMemoryCheckpointer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, FxHashMap<String, Vec<Checkpoint>>>> {
        self.sessions.lock().map_err(|_| CheckpointerError::Backend {
            message: "checkpoint store poisoned".into(),
        })
    }
}

#[async_trait]
impl Checkpointer for InMemoryCheckpointer {
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        let mut sessions = self.lock()?;
        let history = sessions.entry(checkpoint.session_id.clone()).or_default();
        history.retain(|existing| existing.step != checkpoint.step);
        history.push(checkpoint);
        history.sort_by_key(|c| c.step);
        Ok(())
    }

    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>> {
        let sessions = self.lock()?;
        Ok(sessions
            .get(session_id)
            .and_then(|history| history.last().cloned()))
    }

    async fn list_sessions(&self) -> Result<Vec<String>> {
        let sessions = self.lock()?;
        Ok(sessions.keys().cloned().collect())
    }

    async fn list_checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>> {
        let sessions = self.lock()?;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checkpoint(session: &str, step: u64) -> Checkpoint {
        Checkpoint {
            session_id: session.to_string(),
            step,
            state: GraphState::new(),
            cursor: NodeId::from("next"),
            updated_fields: vec![],
            concurrency_limit: 4,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn save_replaces_same_step() {
        let store = InMemoryCheckpointer::new();
        store.save(checkpoint("s", 1)).await.unwrap();

        let mut replacement = checkpoint("s", 1);
        replacement.cursor = NodeId::from("other");
        store.save(replacement).await.unwrap();

        let history = store.list_checkpoints("s").await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].cursor, NodeId::from("other"));
    }

    #[tokio::test]
    async fn history_stays_sorted_by_step() {
        let store = InMemoryCheckpointer::new();
        store.save(checkpoint("s", 3)).await.unwrap();
        store.save(checkpoint("s", 1)).await.unwrap();
        store.save(checkpoint("s", 2)).await.unwrap();

        let steps: Vec<u64> = store
            .list_checkpoints("s")
            .await
            .unwrap()
            .iter()
            .map(|c| c.step)
            .collect();
        assert_eq!(steps, vec![1, 2, 3]);

        let latest = store.load_latest("s").await.unwrap().unwrap();
        assert_eq!(latest.step, 3);
    }

    #[tokio::test]
    async fn load_latest_missing_session_is_none() {
        let store = InMemoryCheckpointer::new();
        assert!(store.load_latest("absent").await.unwrap().is_none());
    }

    #[test]
    fn restore_rebuilds_cursor_and_step() {
        let mut cp = checkpoint("s", 7);
        cp.cursor = NodeId::from("resume_here");
        cp.concurrency_limit = 2;

        let session = restore_session_state(&cp);
        assert_eq!(session.step, 7);
        assert_eq!(session.cursor, NodeId::from("resume_here"));
        assert_eq!(session.scheduler.concurrency_limit(), 2);
        assert_eq!(session.metadata.session_id, "s");
    }
}
