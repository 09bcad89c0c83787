//! Time source and cancellable timers shared by the focus engine and the
//! reminder scheduler.
//!
//! Timers are tokio tasks, so tests drive them with paused tokio time
//! (`#[tokio::test(start_paused = true)]`). [`VirtualClock`] derives its
//! wall-clock reading from the same paused time source, which keeps the
//! deadline arithmetic and the timers in lockstep.

use std::sync::Mutex;

use chrono::{DateTime, TimeDelta, Utc};
use tokio::{
    task::JoinHandle,
    time::{self, Duration, Instant, MissedTickBehavior},
};

pub type Callback = Box<dyn FnOnce() + Send + 'static>;
pub type RepeatingCallback = Box<dyn FnMut() + Send + 'static>;

/// A scheduled callback. Cancelling is idempotent, and dropping the handle
/// cancels it as well.
#[derive(Debug)]
pub struct TimerHandle {
    task: Option<JoinHandle<()>>,
}

impl TimerHandle {
    fn new(task: JoinHandle<()>) -> Self {
        Self { task: Some(task) }
    }

    pub fn cancel(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }
}

impl Drop for TimerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> DateTime<Utc>;

    /// Runs `callback` once after `delay`. Must be called inside a tokio runtime.
    fn schedule(&self, delay: Duration, callback: Callback) -> TimerHandle {
        let task = tokio::spawn(async move {
            time::sleep(delay).await;
            callback();
        });
        TimerHandle::new(task)
    }

    /// Runs `callback` after `delay` and then every `period` until cancelled.
    /// Ticks missed while the process was suspended are skipped, not replayed.
    fn schedule_repeating(
        &self,
        delay: Duration,
        period: Duration,
        mut callback: RepeatingCallback,
    ) -> TimerHandle {
        let task = tokio::spawn(async move {
            let mut interval = time::interval_at(Instant::now() + delay, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                callback();
            }
        });
        TimerHandle::new(task)
    }
}

/// The local wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Wall-clock time that advances with tokio's clock instead of the system's.
#[derive(Debug, Clone, Copy)]
pub struct VirtualClock {
    origin: DateTime<Utc>,
    anchor: Instant,
}

impl VirtualClock {
    pub fn starting_at(origin: DateTime<Utc>) -> Self {
        Self {
            origin,
            anchor: Instant::now(),
        }
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.anchor.elapsed();
        self.origin + TimeDelta::from_std(elapsed).unwrap_or(TimeDelta::MAX)
    }
}

/// Hand-set wall time. Timers scheduled through it still run on tokio time,
/// so this suits code that only reads the clock.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = now;
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut guard = self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
