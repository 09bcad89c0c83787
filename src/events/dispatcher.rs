use std::{
    any::Any,
    collections::HashMap,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, Weak,
    },
};

use anyhow::Result;
use log::error;

use super::{Event, EventName};

type Handler = Arc<dyn Fn(&Event) -> Result<()> + Send + Sync + 'static>;

#[derive(Clone)]
struct Registration {
    id: u64,
    handler: Handler,
    active: Arc<AtomicBool>,
}

#[derive(Default)]
struct DispatcherInner {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<EventName, Vec<Registration>>>,
}

impl DispatcherInner {
    fn handlers(&self) -> MutexGuard<'_, HashMap<EventName, Vec<Registration>>> {
        match self.handlers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Outcome of one `publish` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Synchronous publish/subscribe registry keyed by [`EventName`].
///
/// Handlers run on the publisher's thread, in subscription order, and
/// `publish` returns once all of them have run. A handler that returns an
/// error or panics is logged and skipped; the rest still receive the event.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, name: EventName, handler: F) -> Subscription
    where
        F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let active = Arc::new(AtomicBool::new(true));

        self.inner
            .handlers()
            .entry(name)
            .or_default()
            .push(Registration {
                id,
                handler: Arc::new(handler),
                active: active.clone(),
            });

        Subscription {
            name,
            id,
            active,
            registry: Arc::downgrade(&self.inner),
        }
    }

    pub fn publish(&self, event: &Event) -> PublishReport {
        let name = event.name();
        // Snapshot so handlers may subscribe or unsubscribe while we deliver.
        let registrations = match self.inner.handlers().get(&name) {
            Some(list) => list.clone(),
            None => return PublishReport::default(),
        };

        let mut report = PublishReport::default();
        for registration in registrations {
            if !registration.active.load(Ordering::Acquire) {
                continue;
            }

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| (registration.handler)(event)));
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    report.failed += 1;
                    error!("{name} handler #{} failed: {err:#}", registration.id);
                }
                Err(payload) => {
                    report.failed += 1;
                    error!(
                        "{name} handler #{} panicked: {}",
                        registration.id,
                        panic_message(payload.as_ref())
                    );
                }
            }
        }

        report
    }

    pub fn subscriber_count(&self, name: EventName) -> usize {
        self.inner.handlers().get(&name).map_or(0, Vec::len)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

/// Handle returned by [`Dispatcher::subscribe`]. Dropping it leaves the
/// handler registered; call [`Subscription::unsubscribe`] to remove it.
#[derive(Debug)]
pub struct Subscription {
    name: EventName,
    id: u64,
    active: Arc<AtomicBool>,
    registry: Weak<DispatcherInner>,
}

impl Subscription {
    /// Removes exactly this registration. The handler sees no further events,
    /// including the rest of a publish that is currently in flight.
    pub fn unsubscribe(&self) {
        self.active.store(false, Ordering::Release);

        if let Some(registry) = self.registry.upgrade() {
            let mut handlers = registry.handlers();
            if let Some(list) = handlers.get_mut(&self.name) {
                list.retain(|registration| registration.id != self.id);
                if list.is_empty() {
                    handlers.remove(&self.name);
                }
            }
        }
    }
}
