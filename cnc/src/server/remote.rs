//! Boundary to the tooling that launches and kills component processes.

use crate::component::ComponentSummary;
use thiserror::Error;

/// A process-manager request that could not be carried out.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("Remote process manager failed: {message}")]
pub struct RemoteError {
    message: String,
}

impl RemoteError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Starts and stops component processes on cluster hosts.
pub trait RemoteProcessManager: Send + Sync {
    /// Kills and relaunches each component in place.
    fn cycle_components(&self, components: &[ComponentSummary]) -> Result<(), RemoteError>;

    fn kill_components(&self, components: &[ComponentSummary]) -> Result<(), RemoteError>;
}

/// Process manager for setups where components are launched by hand.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualProcessManager;

impl RemoteProcessManager for ManualProcessManager {
    fn cycle_components(&self, components: &[ComponentSummary]) -> Result<(), RemoteError> {
        Err(RemoteError::new(format!(
            "cannot cycle {} component(s) without a launcher",
            components.len()
        )))
    }

    fn kill_components(&self, components: &[ComponentSummary]) -> Result<(), RemoteError> {
        Err(RemoteError::new(format!(
            "cannot kill {} component(s) without a launcher",
            components.len()
        )))
    }
}
