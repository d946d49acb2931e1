//! Runset lifecycle errors.

use super::state::RunSetState;
use crate::connection::ConnectionError;
use std::path::PathBuf;
use thiserror::Error;

/// A lifecycle transition that could not complete.
///
/// Every variant except [`InvalidState`](Self::InvalidState),
/// [`MissingComponent`](Self::MissingComponent) and
/// [`WrongRunNumber`](Self::WrongRunNumber) leaves the runset in
/// [`RunSetState::Error`]; its components then need to be cycled.
#[derive(Debug, Error)]
pub enum RunSetError {
    /// The transition is not allowed from the current state.
    #[error("Runset #{id} cannot {action} while {state}")]
    InvalidState {
        id: u32,
        action: &'static str,
        state: RunSetState,
    },

    /// Components did not answer before any command was sent.
    #[error("Missing components: {}", .0.join(", "))]
    MissingComponent(Vec<String>),

    /// The runset was built for a different first run.
    #[error("Runset was built for run {planned}, not run {requested}")]
    WrongRunNumber { planned: u32, requested: u32 },

    #[error("Could not configure runset: {}", .0.join("; "))]
    ConfigurationFailed(Vec<String>),

    #[error("Could not start run: {}", .0.join("; "))]
    StartFailed(Vec<String>),

    /// Components still running after the forced stop.
    #[error("Components did not stop: {}", .0.join(", "))]
    StopTimeout(Vec<String>),

    #[error("Could not switch runs: {}", .0.join("; "))]
    SwitchFailed(Vec<String>),

    #[error("Subrun failed: {}", .0.join("; "))]
    SubrunFailed(Vec<String>),

    #[error("Could not reset: {}", .0.join(", "))]
    ResetFailed(Vec<String>),

    #[error("Cannot create run directory {path}: {source}")]
    RunDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Connection(#[from] ConnectionError),
}
