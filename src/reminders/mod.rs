//! Reminder catch-up: a level-triggered poll over the caller's task list.

pub mod commands;
mod scheduler;

pub use scheduler::{ReminderScheduler, GRACE_WINDOW, POLL_INTERVAL};

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize};

/// Offset-less layouts written by `datetime-local` form inputs.
const LOCAL_FORMATS: [&str; 3] = ["%Y-%m-%dT%H:%M", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Read-only view of a task that may carry a reminder.
///
/// Deserializes straight from the app's task records, which name the id
/// field `id`; unknown fields are ignored. `reminderAt` may be RFC 3339 or a
/// local time without offset; empty and null both mean "no reminder".
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PendingReminder {
    #[serde(rename = "id", alias = "taskId")]
    pub task_id: String,
    #[serde(default, deserialize_with = "deserialize_reminder_at")]
    pub reminder_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed: bool,
    pub title: String,
}

/// Payload of `REMINDER_DUE`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReminderNotice {
    pub task_id: String,
    pub title: String,
    pub reminder_at: DateTime<Utc>,
}

/// Parses an RFC 3339 timestamp, or a local wall-clock time in the system
/// time zone.
pub fn parse_reminder_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    LOCAL_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
}

fn deserialize_reminder_at<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(value) => parse_reminder_time(value)
            .map(Some)
            .ok_or_else(|| de::Error::custom(format!("unrecognised reminder time {value:?}"))),
    }
}
