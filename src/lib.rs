pub mod clock;
pub mod db;
pub mod events;
pub mod notify;
pub mod reminders;
pub mod settings;
pub mod timer;
pub mod utils;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Parser, Subcommand};
use db::Database;
use events::Dispatcher;
use settings::SettingsStore;

#[derive(Debug, Parser)]
#[command(name = "odakla", version, about = "Focus cycles and task reminders")]
pub struct Cli {
    /// Directory holding the history database and settings.
    #[arg(long, env = "ODAKLA_DATA_DIR", default_value = ".odakla")]
    pub data_dir: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run a work/break cycle in the foreground.
    Focus(timer::commands::FocusArgs),
    /// Watch a task file and alert when reminders come due.
    Remind(reminders::commands::RemindArgs),
    /// Show completed work phases.
    History(timer::commands::HistoryArgs),
    /// Mute or unmute alert sounds; toggles when no state is given.
    Mute(notify::commands::MuteArgs),
}

/// Everything a command needs, opened once per invocation.
pub struct AppState {
    pub db: Database,
    pub settings: Arc<SettingsStore>,
    pub dispatcher: Dispatcher,
}

impl AppState {
    pub fn open(data_dir: PathBuf) -> anyhow::Result<Self> {
        std::fs::create_dir_all(&data_dir).with_context(|| {
            format!("failed to create data directory {}", data_dir.display())
        })?;

        let db = Database::new(data_dir.join("odakla.sqlite3"))?;
        let settings = SettingsStore::new(data_dir.join("settings.json"))?;

        Ok(Self {
            db,
            settings: Arc::new(settings),
            dispatcher: Dispatcher::new(),
        })
    }
}

/// Timers, signal handling and engine calls all share one thread, so each
/// engine intent publishes its events before the next timer callback runs.
fn build_runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")
}

pub fn run() -> anyhow::Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    let cli = Cli::parse();
    let state = AppState::open(cli.data_dir)?;

    let runtime = build_runtime()?;
    runtime.block_on(async {
        match cli.command {
            Commands::Focus(args) => timer::commands::execute(args, &state).await,
            Commands::Remind(args) => reminders::commands::execute(args, &state).await,
            Commands::History(args) => timer::commands::execute_history(args, &state).await,
            Commands::Mute(args) => notify::commands::execute(args, &state),
        }
    })
}
