//! `odakla focus` and `odakla history`.

use std::{
    io::{self, Write},
    sync::Arc,
};

use anyhow::{Context, Result};
use chrono::{Local, TimeZone, Utc};
use clap::Args;
use log::warn;
use tokio::sync::mpsc;

use crate::{
    clock::SystemClock,
    events::{Event, EventName},
    notify::{self, LogSink},
    settings::{FocusDefaults, SettingsStore},
    AppState,
};

use super::{CycleRequest, FocusEngine, FocusSession, PhaseKind};

#[derive(Debug, Args)]
pub struct FocusArgs {
    /// Label shown in alerts and stored with each completed phase.
    #[arg(long)]
    pub name: Option<String>,

    /// Habit this cycle counts towards.
    #[arg(long)]
    pub habit_id: Option<String>,

    /// Work phase length in minutes.
    #[arg(long, value_name = "MINUTES")]
    pub work: Option<u64>,

    /// Break length in minutes.
    #[arg(long = "break", value_name = "MINUTES")]
    pub break_minutes: Option<u64>,

    /// Number of work phases in the cycle.
    #[arg(long)]
    pub sessions: Option<u32>,

    /// Store the resulting values as the new defaults.
    #[arg(long)]
    pub save_defaults: bool,
}

impl FocusArgs {
    fn merged_with(&self, mut defaults: FocusDefaults) -> FocusDefaults {
        if let Some(name) = &self.name {
            defaults.name = name.clone();
        }
        if let Some(work) = self.work {
            defaults.work_minutes = work;
        }
        if let Some(rest) = self.break_minutes {
            defaults.break_minutes = rest;
        }
        if let Some(sessions) = self.sessions {
            defaults.sessions = sessions;
        }
        defaults
    }

    /// Merges flags over the stored defaults and validates the result. With
    /// `--save-defaults` only a valid request is written back.
    fn prepare_request(&self, settings: &SettingsStore) -> Result<CycleRequest> {
        let defaults = self.merged_with(settings.focus_defaults());
        let request = defaults.to_request(self.habit_id.clone());
        request.validate()?;

        if self.save_defaults {
            settings
                .update_focus_defaults(defaults)
                .context("failed to save focus defaults")?;
        }
        Ok(request)
    }
}

/// Runs one cycle in the foreground until it finishes or Ctrl-C cancels it.
pub async fn execute(args: FocusArgs, state: &AppState) -> Result<()> {
    let request = args.prepare_request(&state.settings)?;

    let engine = FocusEngine::new(
        Arc::new(SystemClock),
        state.dispatcher.clone(),
        Arc::new(state.db.clone()),
    );

    let _alerts = notify::attach(
        &state.dispatcher,
        Arc::new(LogSink),
        state.settings.clone(),
    );

    let _progress = state
        .dispatcher
        .subscribe(EventName::SessionTick, |event| {
            if let Some(session) = event.session() {
                print!("\r{}", progress_line(session));
                io::stdout().flush()?;
            }
            Ok(())
        });

    let (done_tx, mut done_rx) = mpsc::unbounded_channel::<Event>();
    let _terminal: Vec<_> = [EventName::CycleFinished, EventName::SessionCancelled]
        .into_iter()
        .map(|name| {
            let done_tx = done_tx.clone();
            state.dispatcher.subscribe(name, move |event| {
                // The receiver only goes away once we have stopped waiting.
                let _ = done_tx.send(event.clone());
                Ok(())
            })
        })
        .collect();

    let session = engine.start_cycle(request)?;
    println!(
        "Started {} ({} x {} min, {} min breaks)",
        session.name,
        session.total_sessions,
        session.work_duration_seconds / 60,
        session.break_duration_seconds / 60
    );

    tokio::select! {
        finished = done_rx.recv() => {
            println!();
            match finished {
                Some(Event::CycleFinished(session)) => {
                    println!(
                        "Cycle complete: {} focus sessions of {}",
                        session.total_sessions, session.name
                    );
                }
                Some(other) => warn!("Cycle ended with {}", other.name()),
                None => warn!("Event channel closed before the cycle ended"),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            engine.cancel();
            println!();
            println!("Cycle cancelled");
        }
    }

    Ok(())
}

fn progress_line(session: &FocusSession) -> String {
    let label = match session.phase_kind {
        PhaseKind::Work => "Focus",
        PhaseKind::Break => "Break",
    };
    format!(
        "{label} {}/{}  {:02}:{:02} left ",
        session.session_index,
        session.total_sessions,
        session.remaining_seconds / 60,
        session.remaining_seconds % 60
    )
}

#[derive(Debug, Args)]
pub struct HistoryArgs {
    /// Number of entries to show, newest first.
    #[arg(long, default_value = "20")]
    pub limit: usize,
}

/// Prints recent completed work phases and today's focused total.
pub async fn execute_history(args: HistoryArgs, state: &AppState) -> Result<()> {
    let entries = state.db.list_history(args.limit).await?;
    if entries.is_empty() {
        println!("No focus history yet");
        return Ok(());
    }

    for entry in &entries {
        let finished = entry.finished_at.with_timezone(&Local);
        let habit = entry.habit_id.as_deref().unwrap_or("-");
        println!(
            "{}  {:>3} min  {}/{}  {}  [{}]",
            finished.format("%Y-%m-%d %H:%M"),
            entry.duration_seconds / 60,
            entry.session_index,
            entry.total_sessions,
            entry.name,
            habit
        );
    }

    let midnight = Local::now()
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .and_then(|naive| Local.from_local_datetime(&naive).earliest())
        .map(|local| local.with_timezone(&Utc))
        .context("failed to resolve local midnight")?;
    let today = state.db.focus_seconds_since(midnight).await?;
    println!("Focused today: {} min", today / 60);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::EngineError;
    use chrono::DateTime;

    fn args(work: Option<u64>, save_defaults: bool) -> FocusArgs {
        FocusArgs {
            name: None,
            habit_id: Some("habit-1".into()),
            work,
            break_minutes: None,
            sessions: None,
            save_defaults,
        }
    }

    #[test]
    fn invalid_flags_are_never_saved_as_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let settings = SettingsStore::new(dir.path().join("settings.json")).expect("settings");

        let err = args(Some(0), true)
            .prepare_request(&settings)
            .expect_err("zero-minute work phase rejected");
        assert!(matches!(
            err.downcast_ref::<EngineError>(),
            Some(EngineError::InvalidArgument(_))
        ));
        assert_eq!(settings.focus_defaults(), FocusDefaults::default());

        let reopened = SettingsStore::new(dir.path().join("settings.json")).expect("settings");
        let request = args(None, false)
            .prepare_request(&reopened)
            .expect("stored defaults still valid");
        assert_eq!(request.work_duration_seconds, 1_500);
    }

    #[test]
    fn valid_flags_are_saved_when_requested() {
        let dir = tempfile::tempdir().expect("temp dir");
        let settings = SettingsStore::new(dir.path().join("settings.json")).expect("settings");

        let request = args(Some(50), true)
            .prepare_request(&settings)
            .expect("valid request");
        assert_eq!(request.work_duration_seconds, 3_000);
        assert_eq!(request.habit_id.as_deref(), Some("habit-1"));
        assert_eq!(settings.focus_defaults().work_minutes, 50);

        args(Some(10), false)
            .prepare_request(&settings)
            .expect("valid request");
        assert_eq!(settings.focus_defaults().work_minutes, 50);
    }

    #[test]
    fn flags_override_stored_defaults() {
        let args = FocusArgs {
            name: Some("Deep Work".into()),
            habit_id: None,
            work: Some(50),
            break_minutes: None,
            sessions: Some(3),
            save_defaults: false,
        };

        let merged = args.merged_with(FocusDefaults::default());
        assert_eq!(merged.name, "Deep Work");
        assert_eq!(merged.work_minutes, 50);
        assert_eq!(merged.break_minutes, 5);
        assert_eq!(merged.sessions, 3);
    }

    #[test]
    fn progress_line_shows_minutes_and_seconds() {
        let now = DateTime::parse_from_rfc3339("2026-03-02T09:00:00Z")
            .expect("valid datetime")
            .with_timezone(&Utc);
        let mut session = FocusSession::first_phase(
            &CycleRequest {
                habit_id: None,
                name: "Deep Work".into(),
                work_duration_seconds: 1_500,
                break_duration_seconds: 300,
                total_sessions: 2,
            },
            now,
        );
        session.remaining_seconds = 754;

        assert_eq!(progress_line(&session), "Focus 1/2  12:34 left ");
    }
}
