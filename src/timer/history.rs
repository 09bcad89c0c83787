use std::sync::Mutex;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FocusSession, PhaseKind};

/// A completed work phase as handed to the history store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct WorkPhaseRecord {
    pub id: String,
    pub habit_id: Option<String>,
    pub name: String,
    pub duration_seconds: u64,
    pub session_index: u32,
    pub total_sessions: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl WorkPhaseRecord {
    /// `None` for breaks, which are never recorded.
    pub fn from_finished(session: &FocusSession, finished_at: DateTime<Utc>) -> Option<Self> {
        if session.phase_kind != PhaseKind::Work {
            return None;
        }

        Some(Self {
            id: session.id.clone(),
            habit_id: session.habit_id.clone(),
            name: session.name.clone(),
            duration_seconds: session.phase_duration_seconds,
            session_index: session.session_index,
            total_sessions: session.total_sessions,
            started_at: session.started_at,
            finished_at,
        })
    }
}

/// Append-only store of completed work phases.
///
/// `append` is fire-and-forget from the engine's point of view: an error is
/// logged and the phase transition goes ahead regardless. Implementations
/// that do slow I/O should hand the write off rather than block the caller.
pub trait HistorySink: Send + Sync {
    fn append(&self, record: WorkPhaseRecord) -> Result<()>;
}

/// Keeps records in memory; used where nothing needs to outlive the process.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    records: Mutex<Vec<WorkPhaseRecord>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<WorkPhaseRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl HistorySink for MemoryHistory {
    fn append(&self, record: WorkPhaseRecord) -> Result<()> {
        match self.records.lock() {
            Ok(mut guard) => guard.push(record),
            Err(poisoned) => poisoned.into_inner().push(record),
        }
        Ok(())
    }
}
