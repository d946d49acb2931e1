//! Timeouts and paths a runset works with.

use crate::component::DEFAULT_RPC_TIMEOUT_SECS;
use crate::tasks::TaskSettings;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_START_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_STOP_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_RESET_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 100;

/// Runset behaviour shared by every runset a server builds.
#[derive(Debug, Clone)]
pub struct RunSetSettings {
    /// Bound on a single component call.
    pub rpc_timeout: Duration,
    /// How long components may take to reach `ready` or `running`.
    pub start_timeout: Duration,
    /// How long components may take to leave `running`, per attempt.
    pub stop_timeout: Duration,
    pub reset_timeout: Duration,
    /// Delay between state polls while waiting on components.
    pub poll_interval: Duration,
    /// Parent of the per-run `run<N>` directories.
    pub daq_data_dir: Option<PathBuf>,
    /// Where run summaries are queued for archival.
    pub spade_dir: Option<PathBuf>,
    pub tasks: TaskSettings,
}

impl Default for RunSetSettings {
    fn default() -> Self {
        Self {
            rpc_timeout: Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS),
            start_timeout: Duration::from_secs(DEFAULT_START_TIMEOUT_SECS),
            stop_timeout: Duration::from_secs(DEFAULT_STOP_TIMEOUT_SECS),
            reset_timeout: Duration::from_secs(DEFAULT_RESET_TIMEOUT_SECS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            daq_data_dir: None,
            spade_dir: None,
            tasks: TaskSettings::default(),
        }
    }
}

impl RunSetSettings {
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    pub fn with_stop_timeout(mut self, timeout: Duration) -> Self {
        self.stop_timeout = timeout;
        self
    }

    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_daq_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.daq_data_dir = Some(dir.into());
        self
    }

    pub fn with_spade_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.spade_dir = Some(dir.into());
        self
    }

    pub fn with_tasks(mut self, tasks: TaskSettings) -> Self {
        self.tasks = tasks;
        self
    }

    /// Directory holding the logs and summary of run `run_number`.
    pub fn run_dir(&self, run_number: u32) -> Option<PathBuf> {
        self.daq_data_dir
            .as_ref()
            .map(|dir| dir.join(format!("run{}", run_number)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = RunSetSettings::default();
        assert_eq!(settings.rpc_timeout, Duration::from_secs(120));
        assert_eq!(settings.stop_timeout, Duration::from_secs(60));
        assert!(settings.run_dir(12).is_none());
    }

    #[test]
    fn test_run_dir() {
        let settings = RunSetSettings::default().with_daq_data_dir("/mnt/data/pdaqlocal");
        assert_eq!(
            settings.run_dir(123456),
            Some(PathBuf::from("/mnt/data/pdaqlocal/run123456"))
        );
    }
}
