use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::EngineError;

pub const DEFAULT_SESSION_NAME: &str = "Focus Session";

/// Longest work or break phase a cycle may request.
pub const MAX_PHASE_SECONDS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PhaseKind {
    #[default]
    Work,
    Break,
}

impl PhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PhaseKind::Work => "work",
            PhaseKind::Break => "break",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionStatus {
    #[default]
    Running,
    Paused,
    Finished,
    Cancelled,
}

/// Parameters of a `start_cycle` intent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CycleRequest {
    pub habit_id: Option<String>,
    pub name: String,
    pub work_duration_seconds: u64,
    pub break_duration_seconds: u64,
    pub total_sessions: u32,
}

impl CycleRequest {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.total_sessions < 1 {
            return Err(EngineError::InvalidArgument(
                "total_sessions must be at least 1".into(),
            ));
        }
        if self.work_duration_seconds == 0 {
            return Err(EngineError::InvalidArgument(
                "work_duration_seconds must be greater than zero".into(),
            ));
        }
        if self.break_duration_seconds == 0 {
            return Err(EngineError::InvalidArgument(
                "break_duration_seconds must be greater than zero".into(),
            ));
        }
        if self.work_duration_seconds > MAX_PHASE_SECONDS
            || self.break_duration_seconds > MAX_PHASE_SECONDS
        {
            return Err(EngineError::InvalidArgument(format!(
                "phase durations must not exceed {MAX_PHASE_SECONDS} seconds"
            )));
        }
        Ok(())
    }
}

/// One work or break phase of a cycle. Each phase transition produces a new
/// value with a fresh `id`; callers only ever see clones.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: String,
    pub habit_id: Option<String>,
    pub name: String,
    pub phase_kind: PhaseKind,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub phase_duration_seconds: u64,
    pub remaining_seconds: u64,
    pub session_index: u32,
    pub total_sessions: u32,
    pub work_duration_seconds: u64,
    pub break_duration_seconds: u64,
}

impl FocusSession {
    pub fn first_phase(request: &CycleRequest, now: DateTime<Utc>) -> Self {
        let name = match request.name.trim() {
            "" => DEFAULT_SESSION_NAME.to_string(),
            trimmed => trimmed.to_string(),
        };

        Self {
            id: Uuid::new_v4().to_string(),
            habit_id: request.habit_id.clone(),
            name,
            phase_kind: PhaseKind::Work,
            status: SessionStatus::Running,
            started_at: now,
            phase_duration_seconds: request.work_duration_seconds,
            remaining_seconds: request.work_duration_seconds,
            session_index: 1,
            total_sessions: request.total_sessions,
            work_duration_seconds: request.work_duration_seconds,
            break_duration_seconds: request.break_duration_seconds,
        }
    }

    /// The phase that follows this one, or `None` when this was the last work
    /// phase of the cycle.
    pub fn next_phase(&self, now: DateTime<Utc>) -> Option<FocusSession> {
        let (phase_kind, session_index, duration) = match self.phase_kind {
            PhaseKind::Work if self.session_index < self.total_sessions => (
                PhaseKind::Break,
                self.session_index,
                self.break_duration_seconds,
            ),
            PhaseKind::Work => return None,
            PhaseKind::Break => (
                PhaseKind::Work,
                self.session_index + 1,
                self.work_duration_seconds,
            ),
        };

        Some(Self {
            id: Uuid::new_v4().to_string(),
            habit_id: self.habit_id.clone(),
            name: self.name.clone(),
            phase_kind,
            status: SessionStatus::Running,
            started_at: now,
            phase_duration_seconds: duration,
            remaining_seconds: duration,
            session_index,
            total_sessions: self.total_sessions,
            work_duration_seconds: self.work_duration_seconds,
            break_duration_seconds: self.break_duration_seconds,
        })
    }
}

/// The engine's private view of the active phase: the public session plus the
/// absolute deadline that all remaining-time readings derive from.
#[derive(Debug, Clone)]
pub(crate) struct PhaseState {
    pub session: FocusSession,
    deadline: DateTime<Utc>,
    /// Frozen remaining time while paused; last computed value while running.
    remaining_ms: i64,
    /// Whether `SESSION_STARTED` has been published for this phase.
    pub announced: bool,
}

impl PhaseState {
    pub fn begin(session: FocusSession, now: DateTime<Utc>, announced: bool) -> Self {
        let remaining_ms = seconds_to_ms(session.phase_duration_seconds);
        Self {
            deadline: deadline_after(now, remaining_ms),
            remaining_ms,
            session,
            announced,
        }
    }

    pub fn deadline(&self) -> DateTime<Utc> {
        self.deadline
    }

    pub fn remaining_ms(&self, now: DateTime<Utc>) -> i64 {
        match self.session.status {
            SessionStatus::Running => (self.deadline - now).num_milliseconds().max(0),
            SessionStatus::Paused => self.remaining_ms,
            SessionStatus::Finished | SessionStatus::Cancelled => 0,
        }
    }

    /// Recomputes remaining time from the deadline and caches it on the
    /// session. Returns the remaining milliseconds.
    pub fn refresh(&mut self, now: DateTime<Utc>) -> i64 {
        let remaining = self.remaining_ms(now);
        self.remaining_ms = remaining;
        self.session.remaining_seconds = whole_seconds(remaining);
        remaining
    }

    pub fn pause(&mut self, now: DateTime<Utc>) {
        self.refresh(now);
        self.session.status = SessionStatus::Paused;
    }

    pub fn resume(&mut self, now: DateTime<Utc>) {
        self.deadline = deadline_after(now, self.remaining_ms);
        self.session.started_at = now;
        self.session.status = SessionStatus::Running;
    }

    pub fn finish(&mut self) {
        self.remaining_ms = 0;
        self.session.remaining_seconds = 0;
        self.session.status = SessionStatus::Finished;
    }

    pub fn cancel(&mut self, now: DateTime<Utc>) {
        self.refresh(now);
        self.session.status = SessionStatus::Cancelled;
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> FocusSession {
        let mut session = self.session.clone();
        session.remaining_seconds = whole_seconds(self.remaining_ms(now));
        session
    }
}

/// `now + ms`, saturating at the latest representable instant.
fn deadline_after(now: DateTime<Utc>, ms: i64) -> DateTime<Utc> {
    TimeDelta::try_milliseconds(ms)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn seconds_to_ms(seconds: u64) -> i64 {
    i64::try_from(seconds.saturating_mul(1_000)).unwrap_or(i64::MAX)
}

/// Rounds up so a phase never reads 0 before its deadline has passed.
pub(crate) fn whole_seconds(ms: i64) -> u64 {
    if ms <= 0 {
        0
    } else {
        (ms as u64).div_ceil(1_000)
    }
}
