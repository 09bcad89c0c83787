//! Persisted focus history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::WorkPhaseRecord;

/// One row of `focus_history`: a completed work phase.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: String,
    pub habit_id: Option<String>,
    pub name: String,
    pub duration_seconds: u64,
    pub session_index: u32,
    pub total_sessions: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl From<WorkPhaseRecord> for HistoryEntry {
    fn from(record: WorkPhaseRecord) -> Self {
        Self {
            id: record.id,
            habit_id: record.habit_id,
            name: record.name,
            duration_seconds: record.duration_seconds,
            session_index: record.session_index,
            total_sessions: record.total_sessions,
            started_at: record.started_at,
            finished_at: record.finished_at,
            created_at: record.finished_at,
        }
    }
}
