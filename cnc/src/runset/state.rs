//! Runset lifecycle states.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunSetState {
    /// Built but not configured.
    Idle,
    /// Connected and configured; a run may start.
    Ready,
    Starting,
    Running,
    Stopping,
    Resetting,
    /// A transition failed; components must be cycled.
    Error,
    Destroyed,
}

impl RunSetState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunSetState::Idle => "idle",
            RunSetState::Ready => "ready",
            RunSetState::Starting => "starting",
            RunSetState::Running => "running",
            RunSetState::Stopping => "stopping",
            RunSetState::Resetting => "resetting",
            RunSetState::Error => "error",
            RunSetState::Destroyed => "destroyed",
        }
    }
}

impl fmt::Display for RunSetState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
