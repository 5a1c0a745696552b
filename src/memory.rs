//! Conversational memory for the agent wrapper.
//!
//! Memory lives above the graph: it records what was asked and answered
//! across top-level runs, scoped by session id. It is deliberately not part
//! of [`GraphState`](crate::state::GraphState) — nodes never see it unless
//! the agent threads it into the initial state.
//!
//! Two storage modes:
//!
//! - [`AgentMemory::in_memory`] keeps records only for the process lifetime.
//! - [`AgentMemory::persistent`] additionally appends each record to a
//!   per-session JSONL file (one JSON object per line) with a
//!   `<session>.meta.json` sidecar for session metadata, and reloads both
//!   on construction so a session survives restarts.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use miette::Diagnostic;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::utils::id_generator::IdGenerator;

/// Errors raised by memory persistence.
#[derive(Debug, Error, Diagnostic)]
pub enum MemoryError {
    #[error("memory io failed for {path}: {source}")]
    #[diagnostic(code(stategraph::memory::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corrupt memory record at {path}:{line}: {source}")]
    #[diagnostic(
        code(stategraph::memory::corrupt_record),
        help("Records are one JSON object per line; repair or delete the offending line.")
    )]
    CorruptRecord {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("memory serialization failed: {source}")]
    #[diagnostic(code(stategraph::memory::serde))]
    Serde {
        #[from]
        source: serde_json::Error,
    },
}

/// One remembered exchange entry: who said what, and when.
///
/// # Examples
///
/// ```
/// use stategraph::memory::MemoryRecord;
///
/// let asked = MemoryRecord::user("What moved the market today?");
/// let answered = MemoryRecord::assistant("Tech earnings beat expectations.");
///
/// assert!(asked.has_role(MemoryRecord::USER));
/// assert!(asked.id.starts_with("mem-"));
/// assert_eq!(answered.content, "Tech earnings beat expectations.");
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Unique record id, `mem-` prefixed.
    pub id: String,
    /// Who produced the entry (e.g. "user", "assistant", "system").
    ///
    /// Use the constants on [`MemoryRecord`] for standardized values.
    pub role: String,
    /// The text content of the entry.
    pub content: String,
    /// When the entry was recorded.
    pub when: DateTime<Utc>,
}

impl MemoryRecord {
    /// User request entry role.
    pub const USER: &'static str = "user";
    /// Agent response entry role.
    pub const ASSISTANT: &'static str = "assistant";
    /// Instruction or bookkeeping entry role.
    pub const SYSTEM: &'static str = "system";

    /// Creates a new record with the specified role and content.
    ///
    /// The id and timestamp are generated; use struct construction directly
    /// when replaying records with known ids.
    #[must_use]
    pub fn new(role: &str, content: &str) -> Self {
        Self {
            id: IdGenerator::new().generate_record_id(),
            role: role.to_string(),
            content: content.to_string(),
            when: Utc::now(),
        }
    }

    /// Creates a user record with the specified content.
    #[must_use]
    pub fn user(content: &str) -> Self {
        Self::new(Self::USER, content)
    }

    /// Creates an assistant record with the specified content.
    #[must_use]
    pub fn assistant(content: &str) -> Self {
        Self::new(Self::ASSISTANT, content)
    }

    /// Creates a system record with the specified content.
    #[must_use]
    pub fn system(content: &str) -> Self {
        Self::new(Self::SYSTEM, content)
    }

    /// Returns true if this record has the specified role.
    #[must_use]
    pub fn has_role(&self, role: &str) -> bool {
        self.role == role
    }
}

/// Aggregate numbers over a session's memory.
///
/// Serializable so callers can surface it as-is (dashboards, debug
/// endpoints).
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub total_records: usize,
    pub by_role: FxHashMap<String, usize>,
    pub first_record_at: Option<DateTime<Utc>>,
    pub last_record_at: Option<DateTime<Utc>>,
}

/// Append-only memory for one session.
///
/// Records keep insertion order. All reads are served from the in-memory
/// vector; persistence (when enabled) is write-through per append.
///
/// # Examples
///
/// ```
/// use stategraph::memory::{AgentMemory, MemoryRecord};
///
/// let mut memory = AgentMemory::in_memory("session-42");
/// memory.append(MemoryRecord::user("ping")).unwrap();
/// memory.append(MemoryRecord::assistant("pong")).unwrap();
///
/// assert_eq!(memory.len(), 2);
/// assert_eq!(memory.get_recent(1)[0].content, "pong");
/// assert_eq!(memory.search("ping").len(), 1);
///
/// let stats = memory.statistics();
/// assert_eq!(stats.total_records, 2);
/// assert_eq!(stats.by_role.get("user"), Some(&1));
/// ```
#[derive(Clone, Debug)]
pub struct AgentMemory {
    session_id: String,
    records: Vec<MemoryRecord>,
    metadata: FxHashMap<String, Value>,
    storage_dir: Option<PathBuf>,
}

impl AgentMemory {
    /// Volatile memory; nothing touches disk.
    #[must_use]
    pub fn in_memory(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            records: Vec::new(),
            metadata: FxHashMap::default(),
            storage_dir: None,
        }
    }

    /// Disk-backed memory under `dir`, reloading any records and metadata
    /// previously stored for this session id.
    pub fn persistent(
        session_id: impl Into<String>,
        dir: impl Into<PathBuf>,
    ) -> Result<Self, MemoryError> {
        let session_id = session_id.into();
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| MemoryError::Io {
            path: dir.clone(),
            source,
        })?;

        let mut memory = Self {
            session_id,
            records: Vec::new(),
            metadata: FxHashMap::default(),
            storage_dir: Some(dir),
        };
        memory.load_records()?;
        memory.load_metadata()?;
        Ok(memory)
    }

    /// Session id this memory is scoped to.
    #[must_use]
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Append one record, writing it through to disk in persistent mode.
    pub fn append(&mut self, record: MemoryRecord) -> Result<(), MemoryError> {
        if let Some(path) = self.records_path() {
            let line = serde_json::to_string(&record)?;
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|source| MemoryError::Io {
                    path: path.clone(),
                    source,
                })?;
            writeln!(file, "{line}").map_err(|source| MemoryError::Io { path, source })?;
        }
        self.records.push(record);
        Ok(())
    }

    /// The most recent `n` records, oldest first.
    #[must_use]
    pub fn get_recent(&self, n: usize) -> &[MemoryRecord] {
        let start = self.records.len().saturating_sub(n);
        &self.records[start..]
    }

    /// Case-insensitive substring search over record contents.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&MemoryRecord> {
        let needle = query.to_lowercase();
        self.records
            .iter()
            .filter(|r| r.content.to_lowercase().contains(&needle))
            .collect()
    }

    /// All records, oldest first.
    #[must_use]
    pub fn records(&self) -> &[MemoryRecord] {
        &self.records
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Set one session metadata entry, rewriting the sidecar in persistent
    /// mode.
    pub fn set_metadata(
        &mut self,
        key: impl Into<String>,
        value: Value,
    ) -> Result<(), MemoryError> {
        self.metadata.insert(key.into(), value);
        if let Some(path) = self.meta_path() {
            let payload = serde_json::to_string_pretty(&self.metadata)?;
            fs::write(&path, payload).map_err(|source| MemoryError::Io { path, source })?;
        }
        Ok(())
    }

    /// Read one session metadata entry.
    #[must_use]
    pub fn metadata(&self, key: &str) -> Option<&Value> {
        self.metadata.get(key)
    }

    /// Aggregate counts and timestamps over the stored records.
    #[must_use]
    pub fn statistics(&self) -> MemoryStats {
        let mut by_role: FxHashMap<String, usize> = FxHashMap::default();
        for record in &self.records {
            *by_role.entry(record.role.clone()).or_default() += 1;
        }
        MemoryStats {
            total_records: self.records.len(),
            by_role,
            first_record_at: self.records.first().map(|r| r.when),
            last_record_at: self.records.last().map(|r| r.when),
        }
    }

    /// Drop every record, truncating the on-disk file in persistent mode.
    /// Session metadata is kept.
    pub fn clear(&mut self) -> Result<(), MemoryError> {
        self.records.clear();
        if let Some(path) = self.records_path()
            && path.exists()
        {
            fs::write(&path, "").map_err(|source| MemoryError::Io { path, source })?;
        }
        Ok(())
    }

    fn records_path(&self) -> Option<PathBuf> {
        self.storage_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.jsonl", self.session_id)))
    }

    fn meta_path(&self) -> Option<PathBuf> {
        self.storage_dir
            .as_ref()
            .map(|dir| dir.join(format!("{}.meta.json", self.session_id)))
    }

    fn load_records(&mut self) -> Result<(), MemoryError> {
        let Some(path) = self.records_path() else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let file = fs::File::open(&path).map_err(|source| MemoryError::Io {
            path: path.clone(),
            source,
        })?;
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|source| MemoryError::Io {
                path: path.clone(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let record =
                serde_json::from_str(&line).map_err(|source| MemoryError::CorruptRecord {
                    path: path.clone(),
                    line: index + 1,
                    source,
                })?;
            self.records.push(record);
        }
        Ok(())
    }

    fn load_metadata(&mut self) -> Result<(), MemoryError> {
        let Some(path) = self.meta_path() else {
            return Ok(());
        };
        if !path.exists() {
            return Ok(());
        }
        let payload = fs::read_to_string(&path).map_err(|source| MemoryError::Io {
            path: path.clone(),
            source,
        })?;
        self.metadata = serde_json::from_str(&payload)?;
        Ok(())
    }
}
