//! Turns dispatcher events into user-facing alerts.
//!
//! The engine and scheduler only decide when something is worth telling the
//! user; this module decides the wording and hands it to a
//! [`NotificationSink`], which owns the actual sound and system notification.

pub mod commands;

use std::sync::Arc;

use anyhow::Result;
use log::info;
use serde::Serialize;

use crate::{
    events::{Dispatcher, Event, EventName, Subscription},
    settings::SettingsStore,
    timer::PhaseKind,
};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    /// Lets the sink collapse repeats, e.g. one alert per task.
    pub tag: Option<String>,
    pub play_sound: bool,
}

pub trait NotificationSink: Send + Sync {
    fn deliver(&self, notification: &Notification) -> Result<()>;
}

/// Writes alerts to the log and rings the terminal bell unless muted.
#[derive(Debug, Default)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn deliver(&self, notification: &Notification) -> Result<()> {
        info!("🔔 {}: {}", notification.title, notification.body);
        if notification.play_sound {
            eprint!("\x07");
        }
        Ok(())
    }
}

/// The alert for `event`, or `None` for events that stay silent.
pub fn notification_for(event: &Event) -> Option<Notification> {
    let (title, body, tag) = match event {
        Event::SessionStarted(session) => match session.phase_kind {
            PhaseKind::Break => (
                "Break time! ☕".to_string(),
                "Take a short break to rest your mind.".to_string(),
                None,
            ),
            PhaseKind::Work if session.session_index == 1 => (
                "Focus started! 🚀".to_string(),
                format!("Deep work on {} begins now.", session.name),
                None,
            ),
            PhaseKind::Work => (
                "Break's over, back to it! 🔥".to_string(),
                format!(
                    "{}: session {} of {}.",
                    session.name, session.session_index, session.total_sessions
                ),
                None,
            ),
        },
        Event::CycleFinished(session) => (
            "Cycle complete! 🎉".to_string(),
            format!(
                "You finished all {} focus sessions of {}.",
                session.total_sessions, session.name
            ),
            None,
        ),
        Event::ReminderDue(notice) => (
            "Odakla reminder ⏰".to_string(),
            notice.title.clone(),
            Some(notice.task_id.clone()),
        ),
        _ => return None,
    };

    Some(Notification {
        title,
        body,
        tag,
        play_sound: true,
    })
}

/// Subscribes `sink` to every event that produces an alert. The sound flag
/// follows the persisted mute setting at delivery time.
pub fn attach(
    dispatcher: &Dispatcher,
    sink: Arc<dyn NotificationSink>,
    settings: Arc<SettingsStore>,
) -> Vec<Subscription> {
    [
        EventName::SessionStarted,
        EventName::CycleFinished,
        EventName::ReminderDue,
    ]
    .into_iter()
    .map(|name| {
        let sink = sink.clone();
        let settings = settings.clone();
        dispatcher.subscribe(name, move |event| {
            let Some(mut notification) = notification_for(event) else {
                return Ok(());
            };
            notification.play_sound = !settings.is_muted();
            sink.deliver(&notification)
        })
    })
    .collect()
}
