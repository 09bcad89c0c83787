use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

use crate::timer::{CycleRequest, DEFAULT_SESSION_NAME};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct NotificationSettings {
    pub muted: bool,
}

/// Defaults for cycles started without explicit durations, in minutes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct FocusDefaults {
    pub name: String,
    pub work_minutes: u64,
    pub break_minutes: u64,
    pub sessions: u32,
}

impl Default for FocusDefaults {
    fn default() -> Self {
        Self {
            name: DEFAULT_SESSION_NAME.into(),
            work_minutes: 25,
            break_minutes: 5,
            sessions: 1,
        }
    }
}

impl FocusDefaults {
    pub fn to_request(&self, habit_id: Option<String>) -> CycleRequest {
        CycleRequest {
            habit_id,
            name: self.name.clone(),
            work_duration_seconds: self.work_minutes.saturating_mul(60),
            break_duration_seconds: self.break_minutes.saturating_mul(60),
            total_sessions: self.sessions,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UserSettings {
    notifications: NotificationSettings,
    focus: FocusDefaults,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    /// Loads `path`, falling back to defaults when the file is missing or
    /// unreadable as JSON.
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_else(|err| {
                log::warn!(
                    "Ignoring malformed settings at {}: {err}",
                    path.display()
                );
                UserSettings::default()
            })
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn is_muted(&self) -> bool {
        self.read(|data| data.notifications.muted)
    }

    pub fn set_muted(&self, muted: bool) -> Result<()> {
        self.update(|data| data.notifications.muted = muted)
    }

    /// Flips the mute flag and returns the new value.
    pub fn toggle_muted(&self) -> Result<bool> {
        let muted = !self.is_muted();
        self.set_muted(muted)?;
        Ok(muted)
    }

    pub fn focus_defaults(&self) -> FocusDefaults {
        self.read(|data| data.focus.clone())
    }

    pub fn update_focus_defaults(&self, defaults: FocusDefaults) -> Result<()> {
        self.update(|data| data.focus = defaults)
    }

    fn read<T>(&self, f: impl FnOnce(&UserSettings) -> T) -> T {
        let guard = self.data.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    fn update(&self, f: impl FnOnce(&mut UserSettings)) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard);
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let store = SettingsStore::new(dir.path().join("settings.json")).expect("store");

        assert!(!store.is_muted());
        assert_eq!(store.focus_defaults(), FocusDefaults::default());
    }

    #[test]
    fn mute_flag_survives_restart() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("settings.json");

        let store = SettingsStore::new(path.clone()).expect("store");
        assert!(store.toggle_muted().expect("toggle"));

        let reopened = SettingsStore::new(path).expect("store");
        assert!(reopened.is_muted());
        assert!(!reopened.toggle_muted().expect("toggle"));

        let third = SettingsStore::new(dir.path().join("settings.json")).expect("store");
        assert!(!third.is_muted());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").expect("write");

        let store = SettingsStore::new(path).expect("store");
        assert!(!store.is_muted());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "focus": { "workMinutes": 50 } }"#).expect("write");

        let store = SettingsStore::new(path).expect("store");
        let defaults = store.focus_defaults();
        assert_eq!(defaults.work_minutes, 50);
        assert_eq!(defaults.break_minutes, 5);
        assert_eq!(defaults.name, DEFAULT_SESSION_NAME);
    }

    #[test]
    fn focus_defaults_convert_minutes_to_seconds() {
        let request = FocusDefaults {
            name: "Deep Work".into(),
            work_minutes: 25,
            break_minutes: 5,
            sessions: 2,
        }
        .to_request(Some("habit-1".into()));

        assert_eq!(request.work_duration_seconds, 1_500);
        assert_eq!(request.break_duration_seconds, 300);
        assert_eq!(request.total_sessions, 2);
        assert_eq!(request.habit_id.as_deref(), Some("habit-1"));
    }
}
