/*!
SQLite Checkpointer

This module provides the `SQLiteCheckpointer` async implementation of the
`Checkpointer` trait defined in `runtimes/checkpointer.rs`.

## Features

- **Complete Step History**: Stores every checkpoint with cursor and merged fields
- **Pagination Support**: Efficient querying of large checkpoint histories
- **Serde Integration**: Uses persistence models for consistent serialization

## Behavior

- Uses serde-based persistence models (see `runtimes::persistence`) for
  encoding `GraphState` and the cursor.
- When the `sqlite-migrations` feature is enabled (default), embedded
  migrations (`sqlx::migrate!("./migrations")`) are executed on connect;
  disabling the feature assumes external migration orchestration.

## Design Goals

- Keep this module focused on database I/O; pure serialization lives in
  the persistence module.
- Provide efficient querying with filtering and pagination support.
- Keep the denormalized `sessions` row authoritative for resume so
  `load_latest` is a single-row read.

## Database Schema

The checkpoint data maps to database tables as follows:

- `sessions.id` ← `checkpoint.session_id`
- `sessions.concurrency_limit` ← `checkpoint.concurrency_limit`
- `sessions.last_step` / `last_state_json` / `last_cursor` ← latest checkpoint
- `steps.session_id` ← `checkpoint.session_id`
- `steps.step` ← `checkpoint.step`
- `steps.state_json` ← serialized `GraphState`
- `steps.cursor` ← encoded `NodeId` to execute next
- `steps.updated_fields_json` ← JSON array of fields the barrier changed

## NodeId Encoding

Cursors are encoded as strings for storage:
- `Start` → `"Start"`
- `End` → `"End"`
- `Named(name)` → `"Named:<name>"`
*/

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool, sqlite::SqliteRow};
use tracing::instrument;

use crate::{
    runtimes::checkpointer::{Checkpoint, Checkpointer, CheckpointerError, Result},
    runtimes::persistence::PersistedState,
    state::GraphState,
    types::NodeId,
};

use super::checkpointer_sqlite_helpers::{deserialize_json, require_json_field, serialize_json};

/// Query parameters for filtering step history.
#[derive(Debug, Clone, Default)]
pub struct StepQuery {
    /// Maximum number of results to return (capped at 1000)
    pub limit: Option<u32>,
    /// Number of results to skip (for pagination)
    pub offset: Option<u32>,
    /// Filter by minimum step number (inclusive)
    pub min_step: Option<u64>,
    /// Filter by maximum step number (inclusive)
    pub max_step: Option<u64>,
    /// Only return steps whose barrier changed the given field
    pub updated_field: Option<String>,
}

/// Pagination information for query results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    /// Total number of matching records
    pub total_count: u64,
    /// Number of records returned in this page
    pub page_size: u32,
    /// Zero-based offset of the first record in this page
    pub offset: u32,
    /// Whether there are more records after this page
    pub has_next_page: bool,
}

/// Paginated query result for step history.
#[derive(Debug, Clone)]
pub struct StepQueryResult {
    /// The matching checkpoints
    pub checkpoints: Vec<Checkpoint>,
    /// Pagination metadata
    pub page_info: PageInfo,
}

/// SQLite-backed checkpointer with full step history.
///
/// Provides durable checkpoint storage with querying capabilities
/// including pagination and filtering by step range or merged field.
///
/// # Storage Growth
///
/// This backend stores complete step history. Storage grows roughly with:
/// `(sessions × steps_per_session × state_size)`.
///
/// For long-running applications, plan periodic cleanup to control database size:
///
/// ```bash
/// # Delete checkpoints older than 30 days
/// sqlite3 stategraph.db "DELETE FROM steps WHERE created_at < datetime('now', '-30 days')"
///
/// # Reclaim space
/// sqlite3 stategraph.db "VACUUM"
/// ```
///
/// Alternatively, delete entire sessions when runs complete or expire. The
/// schema includes timestamps (`created_at` on steps, `updated_at` on
/// sessions) to facilitate time-based policies.
pub struct SQLiteCheckpointer {
    /// Shared SQLite connection pool for concurrent checkpoint operations
    pool: Arc<SqlitePool>,
}

impl std::fmt::Debug for SQLiteCheckpointer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SQLiteCheckpointer").finish()
    }
}

impl SQLiteCheckpointer {
    /// Connect (or create) a SQLite database at `database_url`.
    /// Example URL: "sqlite://stategraph.db"
    ///
    /// Returns a configured `SQLiteCheckpointer` ready for use.
    #[must_use = "checkpointer must be used to persist state"]
    #[instrument(skip(database_url))]
    pub async fn connect(database_url: &str) -> std::result::Result<Self, CheckpointerError> {
        let pool =
            SqlitePool::connect(database_url)
                .await
                .map_err(|e| CheckpointerError::Backend {
                    message: format!("connect error: {e}"),
                })?;
        // Run embedded migrations only if the feature is enabled (idempotent).
        #[cfg(feature = "sqlite-migrations")]
        {
            if let Err(e) = sqlx::migrate!("./migrations").run(&pool).await {
                return Err(CheckpointerError::Backend {
                    message: format!("migration failure: {e}"),
                });
            }
        }
        #[cfg(not(feature = "sqlite-migrations"))]
        {
            // Feature disabled: assume external migration orchestration already applied schema.
        }
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait::async_trait]
impl Checkpointer for SQLiteCheckpointer {
    #[instrument(skip(self, checkpoint), err)]
    async fn save(&self, checkpoint: Checkpoint) -> Result<()> {
        // Serialize using persistence module (serde-based)
        let persisted_state = PersistedState::from(&checkpoint.state);
        let state_json = serialize_json(&persisted_state, "state")?;
        let cursor = checkpoint.cursor.encode();
        let updated_fields_json = serialize_json(&checkpoint.updated_fields, "updated_fields")?;
        let created_at = checkpoint.created_at.to_rfc3339();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| CheckpointerError::Backend {
                message: format!("tx begin: {e}"),
            })?;

        // Ensure session row
        sqlx::query(
            r#"
            INSERT OR IGNORE INTO sessions (id, concurrency_limit)
            VALUES (?1, ?2)
        "#,
        )
        .bind(&checkpoint.session_id)
        .bind(checkpoint.concurrency_limit as i64)
        .execute(&mut *tx)
        .await
        .map_err(|e| CheckpointerError::Backend {
            message: format!("insert session: {e}"),
        })?;

        // Insert or replace step row (allows idempotent re-save of same step)
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO steps (
                session_id,
                step,
                state_json,
                cursor,
                updated_fields_json,
                created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
        )
        .bind(&checkpoint.session_id)
        .bind(checkpoint.step as i64)
        .bind(&state_json)
        .bind(&cursor)
        .bind(&updated_fields_json)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| CheckpointerError::Backend {
            message: format!("insert step: {e}"),
        })?;

        // Refresh the denormalized latest-row projection. The step guard
        // keeps a re-save of an older step from rolling the session back.
        sqlx::query(
            r#"
            UPDATE sessions SET
                last_step = ?2,
                last_state_json = ?3,
                last_cursor = ?4,
                concurrency_limit = ?5,
                updated_at = ?6
            WHERE id = ?1 AND last_step <= ?2
        "#,
        )
        .bind(&checkpoint.session_id)
        .bind(checkpoint.step as i64)
        .bind(&state_json)
        .bind(&cursor)
        .bind(checkpoint.concurrency_limit as i64)
        .bind(&created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| CheckpointerError::Backend {
            message: format!("update session: {e}"),
        })?;

        tx.commit().await.map_err(|e| CheckpointerError::Backend {
            message: format!("tx commit: {e}"),
        })?;

        Ok(())
    }

    #[instrument(skip(self, session_id), err)]
    async fn load_latest(&self, session_id: &str) -> Result<Option<Checkpoint>> {
        let row_opt: Option<SqliteRow> = sqlx::query(
            r#"
            SELECT
                s.id,
                s.last_step,
                s.last_state_json,
                s.last_cursor,
                s.concurrency_limit,
                s.updated_at
            FROM sessions s
            WHERE s.id = ?1
            "#,
        )
        .bind(session_id)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| CheckpointerError::Backend {
            message: format!("select latest: {e}"),
        })?;

        let row = match row_opt {
            Some(r) => r,
            None => return Ok(None),
        };

        let last_step: i64 = row.get("last_step");
        let state_json: Option<String> =
            row.try_get("last_state_json")
                .map_err(|e| CheckpointerError::Backend {
                    message: format!("last_state_json read: {e}"),
                })?;
        let cursor_enc: Option<String> =
            row.try_get("last_cursor")
                .map_err(|e| CheckpointerError::Backend {
                    message: format!("last_cursor read: {e}"),
                })?;
        let concurrency_limit: i64 = row.get("concurrency_limit");
        let updated_at_str: String = row.get("updated_at");

        if state_json.is_none() {
            // Session row exists but no checkpoint has been persisted yet.
            return Ok(None);
        }

        let state_payload = require_json_field(state_json, session_id, "last_state_json")?;
        let cursor_payload = require_json_field(cursor_enc, session_id, "last_cursor")?;

        let persisted_state: PersistedState = deserialize_json(&state_payload, "state")?;
        let state = GraphState::try_from(persisted_state).map_err(|e| CheckpointerError::Backend {
            message: format!("state convert: {e}"),
        })?;
        let cursor = NodeId::decode(&cursor_payload);

        let created_at = DateTime::parse_from_rfc3339(&updated_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());

        Ok(Some(Checkpoint {
            session_id: session_id.to_string(),
            step: last_step as u64,
            state,
            cursor,
            // The denormalized session row carries no per-step fields; use
            // query_steps for full rows.
            updated_fields: vec![],
            concurrency_limit: concurrency_limit as usize,
            created_at,
        }))
    }

    #[instrument(skip(self), err)]
    async fn list_sessions(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT id FROM sessions
            ORDER BY updated_at DESC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| CheckpointerError::Backend {
            message: format!("list sessions: {e}"),
        })?;

        Ok(rows.into_iter().map(|r| r.get::<String, _>("id")).collect())
    }

    #[instrument(skip(self), err)]
    async fn list_checkpoints(&self, session_id: &str) -> Result<Vec<Checkpoint>> {
        let rows = sqlx::query(
            r#"
            SELECT
                st.session_id, st.step, st.state_json, st.cursor,
                st.updated_fields_json, st.created_at,
                se.concurrency_limit
            FROM steps st
            JOIN sessions se ON se.id = st.session_id
            WHERE st.session_id = ?1
            ORDER BY st.step ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| CheckpointerError::Backend {
            message: format!("list checkpoints: {e}"),
        })?;

        rows.iter()
            .map(|row| row_to_checkpoint(session_id, row))
            .collect()
    }
}

// Extended SQLiteCheckpointer methods (not part of base Checkpointer trait)
impl SQLiteCheckpointer {
    /// Query step history with filtering and pagination.
    ///
    /// Supports filtering by step range and by which field the barrier
    /// changed, with pagination for efficient access to large histories.
    /// Results come back newest step first.
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use stategraph::runtimes::checkpointer_sqlite::{SQLiteCheckpointer, StepQuery};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let checkpointer = SQLiteCheckpointer::connect("sqlite://app.db").await?;
    ///
    /// // Recent steps in which the barrier touched "summary"
    /// let query = StepQuery {
    ///     limit: Some(10),
    ///     min_step: Some(5),
    ///     updated_field: Some("summary".into()),
    ///     ..Default::default()
    /// };
    ///
    /// let result = checkpointer.query_steps("session1", query).await?;
    /// println!("found {} steps", result.page_info.page_size);
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self), err)]
    pub async fn query_steps(&self, session_id: &str, query: StepQuery) -> Result<StepQueryResult> {
        // Build WHERE clause conditions
        let mut conditions = vec!["st.session_id = ?1".to_string()];
        let mut param_count = 1;

        if query.min_step.is_some() {
            param_count += 1;
            conditions.push(format!("st.step >= ?{param_count}"));
        }
        if query.max_step.is_some() {
            param_count += 1;
            conditions.push(format!("st.step <= ?{param_count}"));
        }
        if query.updated_field.is_some() {
            param_count += 1;
            conditions.push(format!("st.updated_fields_json LIKE ?{param_count}"));
        }

        let where_clause = conditions.join(" AND ");

        // Count total matching records
        let count_sql = format!("SELECT COUNT(*) as total FROM steps st WHERE {where_clause}");

        let limit = query.limit.unwrap_or(100).min(1000); // Cap at 1000
        let offset = query.offset.unwrap_or(0);

        // Query with pagination
        let select_sql = format!(
            r#"SELECT
                st.session_id, st.step, st.state_json, st.cursor,
                st.updated_fields_json, st.created_at,
                se.concurrency_limit
               FROM steps st
               JOIN sessions se ON se.id = st.session_id
               WHERE {where_clause}
               ORDER BY st.step DESC
               LIMIT {limit} OFFSET {offset}"#
        );

        // The quoted LIKE pattern matches a whole element of the JSON
        // array, not a substring of some longer field name.
        let field_pattern = query
            .updated_field
            .as_ref()
            .map(|field| format!("%\"{field}\"%"));

        // Execute count query
        let mut count_query = sqlx::query(&count_sql).bind(session_id);
        if let Some(min_step) = query.min_step {
            count_query = count_query.bind(min_step as i64);
        }
        if let Some(max_step) = query.max_step {
            count_query = count_query.bind(max_step as i64);
        }
        if let Some(pattern) = &field_pattern {
            count_query = count_query.bind(pattern);
        }

        let total_count: i64 = count_query
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| CheckpointerError::Backend {
                message: format!("count query: {e}"),
            })?
            .get("total");

        // Execute select query
        let mut select_query = sqlx::query(&select_sql).bind(session_id);
        if let Some(min_step) = query.min_step {
            select_query = select_query.bind(min_step as i64);
        }
        if let Some(max_step) = query.max_step {
            select_query = select_query.bind(max_step as i64);
        }
        if let Some(pattern) = &field_pattern {
            select_query = select_query.bind(pattern);
        }

        let rows =
            select_query
                .fetch_all(&*self.pool)
                .await
                .map_err(|e| CheckpointerError::Backend {
                    message: format!("select query: {e}"),
                })?;

        // Convert rows to checkpoints
        let checkpoints = rows
            .iter()
            .map(|row| row_to_checkpoint(session_id, row))
            .collect::<Result<Vec<_>>>()?;

        let page_info = PageInfo {
            total_count: total_count as u64,
            page_size: checkpoints.len() as u32,
            offset,
            has_next_page: (offset + limit) < total_count as u32,
        };

        Ok(StepQueryResult {
            checkpoints,
            page_info,
        })
    }
}

/// Helper to convert a joined steps/sessions row to a Checkpoint.
fn row_to_checkpoint(session_id: &str, row: &SqliteRow) -> Result<Checkpoint> {
    let step: i64 = row.get("step");
    let state_json: String = row.get("state_json");
    let cursor_enc: String = row.get("cursor");
    let updated_fields_json: String = row.get("updated_fields_json");
    let concurrency_limit: i64 = row.get("concurrency_limit");
    let created_at_str: String = row.get("created_at");

    // Deserialize using persistence models
    let persisted_state: PersistedState = deserialize_json(&state_json, "state")?;
    let state = GraphState::try_from(persisted_state).map_err(|e| CheckpointerError::Backend {
        message: format!("state convert: {e}"),
    })?;
    let cursor = NodeId::decode(&cursor_enc);
    let updated_fields: Vec<String> = deserialize_json(&updated_fields_json, "updated_fields")?;

    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now());

    Ok(Checkpoint {
        session_id: session_id.to_string(),
        step: step as u64,
        state,
        cursor,
        updated_fields,
        concurrency_limit: concurrency_limit as usize,
        created_at,
    })
}
