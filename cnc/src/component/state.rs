//! Component lifecycle states as reported by `getState`.

use std::fmt;

/// State reported by (or inferred for) one component.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ComponentState {
    Idle,
    Connecting,
    Connected,
    Configuring,
    Ready,
    Starting,
    Running,
    Stopping,
    ForcingStop,
    Resetting,
    Destroyed,
    Error,
    /// Did not answer recently.
    Missing,
    /// Did not answer for `MAX_DEAD_COUNT` consecutive polls.
    Dead,
    /// Answered too slowly during a lifecycle wait.
    Hanging,
    /// Anything the remote side reports that this crate does not model.
    Other(String),
}

impl ComponentState {
    pub fn parse(s: &str) -> Self {
        match s {
            "idle" => ComponentState::Idle,
            "connecting" => ComponentState::Connecting,
            "connected" => ComponentState::Connected,
            "configuring" => ComponentState::Configuring,
            "ready" => ComponentState::Ready,
            "starting" => ComponentState::Starting,
            "running" => ComponentState::Running,
            "stopping" => ComponentState::Stopping,
            "forcingStop" => ComponentState::ForcingStop,
            "resetting" => ComponentState::Resetting,
            "destroyed" => ComponentState::Destroyed,
            "error" => ComponentState::Error,
            "MIA" => ComponentState::Missing,
            "DEAD" => ComponentState::Dead,
            "hanging" => ComponentState::Hanging,
            other => ComponentState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ComponentState::Idle => "idle",
            ComponentState::Connecting => "connecting",
            ComponentState::Connected => "connected",
            ComponentState::Configuring => "configuring",
            ComponentState::Ready => "ready",
            ComponentState::Starting => "starting",
            ComponentState::Running => "running",
            ComponentState::Stopping => "stopping",
            ComponentState::ForcingStop => "forcingStop",
            ComponentState::Resetting => "resetting",
            ComponentState::Destroyed => "destroyed",
            ComponentState::Error => "error",
            ComponentState::Missing => "MIA",
            ComponentState::Dead => "DEAD",
            ComponentState::Hanging => "hanging",
            ComponentState::Other(s) => s,
        }
    }

    /// True if the component did not answer its last poll.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, ComponentState::Missing | ComponentState::Dead)
    }

    /// States in which a component may be told to exit.
    pub fn allows_terminate(&self) -> bool {
        matches!(
            self,
            ComponentState::Idle
                | ComponentState::Ready
                | ComponentState::Missing
                | ComponentState::Dead
        )
    }
}

impl fmt::Display for ComponentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
