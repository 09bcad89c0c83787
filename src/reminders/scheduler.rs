use std::{
    collections::HashSet,
    sync::{Arc, Mutex, MutexGuard},
};

use chrono::{DateTime, TimeDelta, Utc};
use tokio::time::Duration;

use crate::{
    clock::{Clock, TimerHandle},
    events::{Dispatcher, Event},
};

use super::{PendingReminder, ReminderNotice};

// Set to false to silence reminder poll logging
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

pub const POLL_INTERVAL: Duration = Duration::from_secs(10);
/// How late a reminder may be checked and still count as due.
pub const GRACE_WINDOW: Duration = Duration::from_secs(300);

type Fetch = Arc<dyn Fn() -> Vec<PendingReminder> + Send + Sync + 'static>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct NotifiedKey {
    task_id: String,
    reminder_at: DateTime<Utc>,
}

/// Keys of reminders already notified. A key is kept only while its
/// reminder is still inside the grace window; past that it can never be due
/// again, so dropping it cannot cause a repeat.
#[derive(Debug, Default)]
struct NotifiedSet {
    keys: HashSet<NotifiedKey>,
}

impl NotifiedSet {
    fn evict_expired(&mut self, now: DateTime<Utc>, grace: TimeDelta) {
        self.keys.retain(|key| now - key.reminder_at < grace);
    }

    /// Returns false when the key was already present.
    fn insert(&mut self, key: NotifiedKey) -> bool {
        self.keys.insert(key)
    }

    fn len(&self) -> usize {
        self.keys.len()
    }
}

#[derive(Default)]
struct SchedulerState {
    fetch: Option<Fetch>,
    notified: NotifiedSet,
    timer: Option<TimerHandle>,
}

struct SchedulerInner {
    clock: Arc<dyn Clock>,
    dispatcher: Dispatcher,
    poll_interval: Duration,
    grace_window: TimeDelta,
    state: Mutex<SchedulerState>,
}

/// Polls a fresh reminder snapshot every [`POLL_INTERVAL`] and publishes
/// `REMINDER_DUE` for reminders that came due within the last
/// [`GRACE_WINDOW`]. Each `(task, reminder time)` pair is announced once.
#[derive(Clone)]
pub struct ReminderScheduler {
    inner: Arc<SchedulerInner>,
}

impl ReminderScheduler {
    pub fn new(clock: Arc<dyn Clock>, dispatcher: Dispatcher) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                clock,
                dispatcher,
                poll_interval: POLL_INTERVAL,
                grace_window: TimeDelta::seconds(GRACE_WINDOW.as_secs() as i64),
                state: Mutex::new(SchedulerState::default()),
            }),
        }
    }

    /// Arms the recurring poll, replacing any poll armed earlier. `fetch` is
    /// called on every poll and must return quickly.
    pub fn start<F>(&self, fetch: F)
    where
        F: Fn() -> Vec<PendingReminder> + Send + Sync + 'static,
    {
        let mut state = self.inner.lock_state();
        if let Some(mut previous) = state.timer.take() {
            previous.cancel();
        }
        state.fetch = Some(Arc::new(fetch));

        let scheduler = Arc::downgrade(&self.inner);
        state.timer = Some(self.inner.clock.schedule_repeating(
            self.inner.poll_interval,
            self.inner.poll_interval,
            Box::new(move || {
                if let Some(scheduler) = scheduler.upgrade() {
                    scheduler.poll();
                }
            }),
        ));

        log_info!(
            "Reminder checks active every {}s",
            self.inner.poll_interval.as_secs()
        );
    }

    pub fn stop(&self) {
        let mut state = self.inner.lock_state();
        state.fetch = None;
        if let Some(mut timer) = state.timer.take() {
            timer.cancel();
            log_info!("Reminder checks stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner
            .lock_state()
            .timer
            .as_ref()
            .is_some_and(TimerHandle::is_active)
    }

    /// Runs one poll against the fetch callback given to `start`. Returns the
    /// number of reminders announced; 0 when not started.
    pub fn poll_once(&self) -> usize {
        self.inner.poll()
    }

    /// Runs the due check against an explicit snapshot.
    pub fn check(&self, reminders: &[PendingReminder]) -> usize {
        self.inner.check(reminders)
    }

    pub fn notified_count(&self) -> usize {
        self.inner.lock_state().notified.len()
    }
}

impl SchedulerInner {
    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn poll(&self) -> usize {
        // The callback is foreign code; never run it under our lock.
        let fetch = self.lock_state().fetch.clone();
        match fetch {
            Some(fetch) => self.check(&fetch()),
            None => 0,
        }
    }

    fn check(&self, reminders: &[PendingReminder]) -> usize {
        let now = self.clock.now();

        let due: Vec<ReminderNotice> = {
            let mut state = self.lock_state();
            state.notified.evict_expired(now, self.grace_window);

            reminders
                .iter()
                .filter(|reminder| !reminder.completed)
                .filter_map(|reminder| {
                    let reminder_at = reminder.reminder_at?;
                    let lateness = now - reminder_at;
                    if lateness < TimeDelta::zero() || lateness >= self.grace_window {
                        return None;
                    }

                    let fresh = state.notified.insert(NotifiedKey {
                        task_id: reminder.task_id.clone(),
                        reminder_at,
                    });
                    fresh.then(|| ReminderNotice {
                        task_id: reminder.task_id.clone(),
                        title: reminder.title.clone(),
                        reminder_at,
                    })
                })
                .collect()
        };

        log_debug!(
            "Reminder poll at {now}: {} snapshot entries, {} due",
            reminders.len(),
            due.len()
        );

        for notice in &due {
            log_info!("Reminder due for task {}: {}", notice.task_id, notice.title);
            self.dispatcher.publish(&Event::ReminderDue(notice.clone()));
        }

        due.len()
    }
}
