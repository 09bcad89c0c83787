pub mod commands;
pub mod controller;
mod error;
mod history;
pub mod state;

pub use controller::FocusEngine;
pub use error::EngineError;
pub use history::{HistorySink, MemoryHistory, WorkPhaseRecord};
pub use state::{
    CycleRequest, FocusSession, PhaseKind, SessionStatus, DEFAULT_SESSION_NAME, MAX_PHASE_SECONDS,
};
