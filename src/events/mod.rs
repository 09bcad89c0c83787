//! Event catalogue and the synchronous dispatcher that fans events out to
//! subscribers.

mod dispatcher;

pub use dispatcher::{Dispatcher, PublishReport, Subscription};

use serde::Serialize;

use crate::{reminders::ReminderNotice, timer::FocusSession};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventName {
    SessionStarted,
    SessionTick,
    SessionPaused,
    SessionResumed,
    SessionPhaseCompleted,
    CycleFinished,
    SessionCancelled,
    ReminderDue,
}

impl EventName {
    pub const ALL: [EventName; 8] = [
        EventName::SessionStarted,
        EventName::SessionTick,
        EventName::SessionPaused,
        EventName::SessionResumed,
        EventName::SessionPhaseCompleted,
        EventName::CycleFinished,
        EventName::SessionCancelled,
        EventName::ReminderDue,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventName::SessionStarted => "SESSION_STARTED",
            EventName::SessionTick => "SESSION_TICK",
            EventName::SessionPaused => "SESSION_PAUSED",
            EventName::SessionResumed => "SESSION_RESUMED",
            EventName::SessionPhaseCompleted => "SESSION_PHASE_COMPLETED",
            EventName::CycleFinished => "CYCLE_FINISHED",
            EventName::SessionCancelled => "SESSION_CANCELLED",
            EventName::ReminderDue => "REMINDER_DUE",
        }
    }
}

impl std::fmt::Display for EventName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    SessionStarted(FocusSession),
    SessionTick(FocusSession),
    SessionPaused(FocusSession),
    SessionResumed(FocusSession),
    /// Carries the phase that just finished; the cycle continues.
    SessionPhaseCompleted(FocusSession),
    /// Carries the last work phase of the cycle.
    CycleFinished(FocusSession),
    SessionCancelled(FocusSession),
    ReminderDue(ReminderNotice),
}

impl Event {
    pub fn name(&self) -> EventName {
        match self {
            Event::SessionStarted(_) => EventName::SessionStarted,
            Event::SessionTick(_) => EventName::SessionTick,
            Event::SessionPaused(_) => EventName::SessionPaused,
            Event::SessionResumed(_) => EventName::SessionResumed,
            Event::SessionPhaseCompleted(_) => EventName::SessionPhaseCompleted,
            Event::CycleFinished(_) => EventName::CycleFinished,
            Event::SessionCancelled(_) => EventName::SessionCancelled,
            Event::ReminderDue(_) => EventName::ReminderDue,
        }
    }

    pub fn session(&self) -> Option<&FocusSession> {
        match self {
            Event::SessionStarted(session)
            | Event::SessionTick(session)
            | Event::SessionPaused(session)
            | Event::SessionResumed(session)
            | Event::SessionPhaseCompleted(session)
            | Event::CycleFinished(session)
            | Event::SessionCancelled(session) => Some(session),
            Event::ReminderDue(_) => None,
        }
    }
}
