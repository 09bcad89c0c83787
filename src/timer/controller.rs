use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use log::error;
use tokio::time::Duration;

use crate::{
    clock::{Clock, TimerHandle},
    events::{Dispatcher, Event},
};

use super::{
    state::PhaseState, CycleRequest, EngineError, FocusSession, HistorySink, SessionStatus,
    WorkPhaseRecord,
};

// Set to false to silence per-phase and per-tick logging from the engine
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info, log_warn};

const TICK_INTERVAL: Duration = Duration::from_secs(1);
/// One tick between a phase finishing and the next phase being announced.
const PHASE_GRACE_DELAY: Duration = Duration::from_secs(1);

#[derive(Default)]
struct EngineState {
    active: Option<PhaseState>,
    /// At most one armed timer: the per-second ticker or the grace one-shot.
    timer: Option<TimerHandle>,
}

struct EngineInner {
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
    history: Arc<dyn HistorySink>,
    state: Mutex<EngineState>,
    tick_interval: Duration,
    grace_delay: Duration,
    tick_log_every: u64,
}

/// Owns the single active focus cycle.
///
/// Every public call takes the state lock, mutates, releases it and only then
/// publishes, so subscribers are free to call back into the engine.
///
/// Event order per session holds when intents and timer callbacks share one
/// thread, i.e. a current-thread tokio runtime. On a multi-thread runtime an
/// intent can publish between a tick's unlock and its publish.
#[derive(Clone)]
pub struct FocusEngine {
    inner: Arc<EngineInner>,
}

impl FocusEngine {
    pub fn new(
        clock: Arc<dyn Clock>,
        dispatcher: Dispatcher,
        history: Arc<dyn HistorySink>,
    ) -> Self {
        let debug_mode = std::env::var("ODAKLA_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        Self {
            inner: Arc::new(EngineInner {
                clock,
                dispatcher,
                history,
                state: Mutex::new(EngineState::default()),
                tick_interval: TICK_INTERVAL,
                grace_delay: PHASE_GRACE_DELAY,
                tick_log_every: if debug_mode { 1 } else { 60 },
            }),
        }
    }

    /// Starts a new cycle with its first work phase. An already active cycle
    /// is cancelled first and its `SESSION_CANCELLED` published.
    pub fn start_cycle(&self, request: CycleRequest) -> Result<FocusSession, EngineError> {
        request.validate()?;

        let (session, events) = {
            let mut guard = self.inner.lock_state();
            let state = &mut *guard;
            let now = self.inner.clock.now();
            let mut events = Vec::new();

            if let Some(replaced) = self.inner.cancel_active(state, now, &mut events) {
                log_warn!(
                    "Starting a new cycle while session {} was active; cancelled it",
                    replaced.id
                );
            }

            let session = FocusSession::first_phase(&request, now);
            state.timer = Some(self.inner.arm_ticker(&session.id));
            state.active = Some(PhaseState::begin(session.clone(), now, true));
            events.push(Event::SessionStarted(session.clone()));
            (session, events)
        };

        log_info!(
            "Cycle '{}' started: {} x {}s work, {}s breaks",
            session.name,
            session.total_sessions,
            session.work_duration_seconds,
            session.break_duration_seconds
        );
        self.inner.publish_all(events);
        Ok(session)
    }

    pub fn pause(&self) {
        let events = {
            let mut guard = self.inner.lock_state();
            let state = &mut *guard;
            let Some(phase) = state.active.as_mut() else {
                return;
            };
            if phase.session.status != SessionStatus::Running {
                return;
            }

            let mut events: Vec<Event> = take_announcement(phase).into_iter().collect();
            phase.pause(self.inner.clock.now());
            events.push(Event::SessionPaused(phase.session.clone()));
            disarm(&mut state.timer);
            events
        };

        self.inner.publish_all(events);
    }

    pub fn resume(&self) {
        let events = {
            let mut guard = self.inner.lock_state();
            let state = &mut *guard;
            let Some(phase) = state.active.as_mut() else {
                return;
            };
            if phase.session.status != SessionStatus::Paused {
                return;
            }

            let mut events: Vec<Event> = take_announcement(phase).into_iter().collect();
            phase.resume(self.inner.clock.now());
            events.push(Event::SessionResumed(phase.session.clone()));
            let session_id = phase.session.id.clone();
            state.timer = Some(self.inner.arm_ticker(&session_id));
            events
        };

        self.inner.publish_all(events);
    }

    pub fn cancel(&self) {
        let events = {
            let mut guard = self.inner.lock_state();
            let now = self.inner.clock.now();
            let mut events = Vec::new();
            match self.inner.cancel_active(&mut guard, now, &mut events) {
                Some(cancelled) => log_info!("Session {} cancelled", cancelled.id),
                None => return,
            }
            events
        };

        self.inner.publish_all(events);
    }

    /// Snapshot of the active phase with remaining time recomputed now.
    pub fn active_session(&self) -> Option<FocusSession> {
        let guard = self.inner.lock_state();
        let now = self.inner.clock.now();
        guard.active.as_ref().map(|phase| phase.snapshot(now))
    }

    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        let guard = self.inner.lock_state();
        guard
            .active
            .as_ref()
            .filter(|phase| phase.session.status == SessionStatus::Running)
            .map(PhaseState::deadline)
    }
}

impl EngineInner {
    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn arm_ticker(self: &Arc<Self>, session_id: &str) -> TimerHandle {
        let engine = Arc::downgrade(self);
        let session_id = session_id.to_string();
        self.clock.schedule_repeating(
            self.tick_interval,
            self.tick_interval,
            Box::new(move || {
                if let Some(engine) = engine.upgrade() {
                    engine.on_tick(&session_id);
                }
            }),
        )
    }

    fn arm_grace(self: &Arc<Self>, session_id: &str) -> TimerHandle {
        let engine = Arc::downgrade(self);
        let session_id = session_id.to_string();
        self.clock.schedule(
            self.grace_delay,
            Box::new(move || {
                if let Some(engine) = engine.upgrade() {
                    engine.on_grace_elapsed(&session_id);
                }
            }),
        )
    }

    fn cancel_active(
        &self,
        state: &mut EngineState,
        now: DateTime<Utc>,
        events: &mut Vec<Event>,
    ) -> Option<FocusSession> {
        let mut phase = state.active.take()?;
        disarm(&mut state.timer);
        events.extend(take_announcement(&mut phase));
        phase.cancel(now);
        events.push(Event::SessionCancelled(phase.session.clone()));
        Some(phase.session)
    }

    fn on_tick(self: &Arc<Self>, session_id: &str) {
        let now = self.clock.now();
        let (events, record) = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            let Some(phase) = state.active.as_mut() else {
                return;
            };
            // A tick that raced a cancel or a transition belongs to a stale phase.
            if phase.session.id != session_id || phase.session.status != SessionStatus::Running {
                return;
            }

            if phase.refresh(now) > 0 {
                let remaining = phase.session.remaining_seconds;
                if remaining % self.tick_log_every == 0 {
                    log_debug!(
                        "{} phase {} of '{}': {}s left",
                        phase.session.phase_kind.as_str(),
                        phase.session.session_index,
                        phase.session.name,
                        remaining
                    );
                }
                (vec![Event::SessionTick(phase.session.clone())], None)
            } else {
                self.complete_phase(state, now)
            }
        };

        if let Some(record) = record {
            self.persist(record);
        }
        self.publish_all(events);
    }

    fn complete_phase(
        self: &Arc<Self>,
        state: &mut EngineState,
        now: DateTime<Utc>,
    ) -> (Vec<Event>, Option<WorkPhaseRecord>) {
        let Some(mut finished) = state.active.take() else {
            return (Vec::new(), None);
        };
        disarm(&mut state.timer);
        finished.finish();

        let record = WorkPhaseRecord::from_finished(&finished.session, now);
        let events = match finished.session.next_phase(now) {
            Some(next) => {
                log_info!(
                    "{} phase {}/{} of '{}' finished; {} phase next",
                    finished.session.phase_kind.as_str(),
                    finished.session.session_index,
                    finished.session.total_sessions,
                    finished.session.name,
                    next.phase_kind.as_str()
                );
                state.timer = Some(self.arm_grace(&next.id));
                state.active = Some(PhaseState::begin(next, now, false));
                vec![Event::SessionPhaseCompleted(finished.session)]
            }
            None => {
                log_info!(
                    "Cycle '{}' finished after {} work phases",
                    finished.session.name,
                    finished.session.total_sessions
                );
                vec![Event::CycleFinished(finished.session)]
            }
        };

        (events, record)
    }

    fn on_grace_elapsed(self: &Arc<Self>, session_id: &str) {
        let events: Vec<Event> = {
            let mut guard = self.lock_state();
            let state = &mut *guard;
            let Some(phase) = state.active.as_mut() else {
                return;
            };
            if phase.session.id != session_id || phase.session.status != SessionStatus::Running {
                return;
            }

            let announcement = take_announcement(phase);
            state.timer = Some(self.arm_ticker(session_id));
            announcement.into_iter().collect()
        };

        self.publish_all(events);
    }

    fn persist(&self, record: WorkPhaseRecord) {
        let record_id = record.id.clone();
        if let Err(err) = self.history.append(record) {
            error!("Failed to record work phase {record_id}: {err:#}");
        }
    }

    fn publish_all(&self, events: Vec<Event>) {
        for event in events {
            self.dispatcher.publish(&event);
        }
    }
}

/// `SESSION_STARTED` for a phase still inside its grace delay. Any intent
/// that lands in that gap flushes the announcement first so subscribers never
/// see a pause or cancel for a phase that was never started.
fn take_announcement(phase: &mut PhaseState) -> Option<Event> {
    if phase.announced {
        return None;
    }
    phase.announced = true;
    Some(Event::SessionStarted(phase.session.clone()))
}

fn disarm(timer: &mut Option<TimerHandle>) {
    if let Some(mut handle) = timer.take() {
        handle.cancel();
    }
}
