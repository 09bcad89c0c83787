//! `odakla remind`: watches a task file and alerts when reminders come due.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use anyhow::{Context, Result};
use clap::Args;
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::SystemClock,
    notify::{self, LogSink},
    AppState,
};

use super::{PendingReminder, ReminderScheduler, POLL_INTERVAL};

#[derive(Debug, Args)]
pub struct RemindArgs {
    /// JSON array of tasks (`id`, `title`, `reminderAt`, `completed`).
    #[arg(long, value_name = "FILE")]
    pub tasks: PathBuf,
}

/// Reads the task file. A record that does not parse is logged and skipped;
/// only an unreadable file or a non-array document is an error.
pub fn load_tasks(path: &Path) -> Result<Vec<PendingReminder>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("failed to read tasks from {}", path.display()))?;
    let records: Vec<serde_json::Value> = serde_json::from_str(&contents)
        .with_context(|| format!("failed to parse tasks in {}", path.display()))?;

    Ok(records
        .into_iter()
        .enumerate()
        .filter_map(|(index, record)| {
            serde_json::from_value(record)
                .map_err(|err| warn!("Skipping task #{index} in {}: {err}", path.display()))
                .ok()
        })
        .collect())
}

/// Runs until Ctrl-C. The file is re-read on every poll interval so edits
/// made while running are picked up; a file that fails to load keeps the
/// last good snapshot.
pub async fn execute(args: RemindArgs, state: &AppState) -> Result<()> {
    let snapshot = Arc::new(RwLock::new(load_tasks(&args.tasks)?));
    let shutdown = CancellationToken::new();

    let reloader = {
        let snapshot = snapshot.clone();
        let shutdown = shutdown.clone();
        let path = args.tasks.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            interval.tick().await;
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = interval.tick() => match load_tasks(&path) {
                        Ok(tasks) => {
                            *snapshot.write().unwrap_or_else(PoisonError::into_inner) = tasks;
                        }
                        Err(err) => warn!("Keeping previous reminders: {err:#}"),
                    },
                }
            }
        })
    };

    let _alerts = notify::attach(
        &state.dispatcher,
        Arc::new(LogSink),
        state.settings.clone(),
    );

    let scheduler = ReminderScheduler::new(Arc::new(SystemClock), state.dispatcher.clone());
    {
        let snapshot = snapshot.clone();
        scheduler.start(move || {
            snapshot
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        });
    }

    let announced = scheduler.poll_once();
    info!(
        "Watching {} for reminders ({} due now)",
        args.tasks.display(),
        announced
    );

    let signal = tokio::signal::ctrl_c().await;
    scheduler.stop();
    shutdown.cancel();
    reloader.await.context("reminder reload task panicked")?;
    signal.context("failed to listen for Ctrl-C")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_task_records_with_extra_fields() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tasks.json");
        fs::write(
            &path,
            r#"[
                {"id": "t1", "title": "Call mom", "reminderAt": "2026-03-02T09:00:00Z", "priority": 2},
                {"id": "t2", "title": "Someday", "completed": true}
            ]"#,
        )
        .expect("write");

        let tasks = load_tasks(&path).expect("tasks");
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].task_id, "t1");
        assert!(tasks[0].reminder_at.is_some());
        assert!(!tasks[0].completed);
        assert!(tasks[1].reminder_at.is_none());
        assert!(tasks[1].completed);
    }

    #[test]
    fn form_input_reminders_load_and_bad_records_are_skipped() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("tasks.json");
        fs::write(
            &path,
            r#"[
                {"id": "local", "title": "Stretch", "reminderAt": "2026-03-02T09:00"},
                {"id": "blank", "title": "Inbox zero", "reminderAt": ""},
                {"id": "utc", "title": "Standup", "reminderAt": "2026-03-02T09:00:00Z"},
                {"id": "broken", "title": "Typo", "reminderAt": "tomorrow-ish"},
                {"title": "No id"}
            ]"#,
        )
        .expect("write");

        let tasks = load_tasks(&path).expect("tasks");
        let ids: Vec<&str> = tasks.iter().map(|task| task.task_id.as_str()).collect();
        assert_eq!(ids, vec!["local", "blank", "utc"]);
        assert!(tasks[0].reminder_at.is_some());
        assert!(tasks[1].reminder_at.is_none());
        assert!(tasks[2].reminder_at.is_some());
    }

    #[test]
    fn unreadable_file_is_an_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        assert!(load_tasks(&dir.path().join("missing.json")).is_err());

        let path = dir.path().join("tasks.json");
        fs::write(&path, "not json").expect("write");
        assert!(load_tasks(&path).is_err());
    }
}
