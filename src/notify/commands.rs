use anyhow::Result;
use clap::{Args, ValueEnum};

use crate::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MuteState {
    On,
    Off,
}

#[derive(Debug, Args)]
pub struct MuteArgs {
    /// Set the mute flag explicitly instead of toggling it.
    #[arg(value_enum)]
    pub state: Option<MuteState>,
}

/// Sets or toggles alert sounds and prints the resulting state.
pub fn execute(args: MuteArgs, state: &AppState) -> Result<()> {
    let muted = match args.state {
        Some(MuteState::On) => {
            state.settings.set_muted(true)?;
            true
        }
        Some(MuteState::Off) => {
            state.settings.set_muted(false)?;
            false
        }
        None => state.settings.toggle_muted()?,
    };

    println!("Alert sounds {}", if muted { "muted" } else { "on" });
    Ok(())
}
