//! Settings structs for each section of `cncserver.ini`.

use super::file::config_directory;
use crate::component::DEFAULT_RPC_TIMEOUT_SECS;
use crate::logging::DEFAULT_LOG_FILE;
use crate::moni::MoniTarget;
use crate::runset::{
    RunOptions, RunSetSettings, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RESET_TIMEOUT_SECS,
    DEFAULT_START_TIMEOUT_SECS, DEFAULT_STOP_TIMEOUT_SECS,
};
use crate::tasks::settings::{
    DEFAULT_ACTIVE_DOMS_DETAIL_PERIOD_SECS, DEFAULT_ACTIVE_DOMS_PERIOD_SECS,
    DEFAULT_DISK_FLOOR, DEFAULT_HEALTH_METER_FULL, DEFAULT_MAX_WORKER_HANGS,
    DEFAULT_MONITOR_PERIOD_SECS, DEFAULT_RADAR_DURATION_SECS, DEFAULT_RADAR_PERIOD_SECS,
    DEFAULT_RADAR_SAMPLES, DEFAULT_RATE_PERIOD_SECS, DEFAULT_TRIGGER_COUNT_PERIOD_SECS,
    DEFAULT_WATCHDOG_PERIOD_SECS,
};
use crate::tasks::{default_radar_doms, RadarDomSpec, TaskSettings};
use std::path::PathBuf;
use std::time::Duration;

/// Complete control-server configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CncConfig {
    pub paths: PathSettings,
    pub rpc: RpcSettings,
    pub runset: RunSetSection,
    pub tasks: TaskSection,
    pub moni: MoniSettings,
}

/// `[paths]`
#[derive(Debug, Clone, PartialEq)]
pub struct PathSettings {
    /// Directory holding run configurations
    pub run_config_dir: Option<PathBuf>,
    /// Directory for the server's own log file
    pub log_dir: PathBuf,
    /// Parent of the per-run directories
    pub daq_data_dir: Option<PathBuf>,
    /// Archive drop box for run summaries
    pub spade_dir: Option<PathBuf>,
}

impl Default for PathSettings {
    fn default() -> Self {
        Self {
            run_config_dir: None,
            log_dir: config_directory().join("logs"),
            daq_data_dir: None,
            spade_dir: None,
        }
    }
}

/// `[rpc]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RpcSettings {
    /// Bound on a single component call, in seconds
    pub timeout: u64,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_RPC_TIMEOUT_SECS,
        }
    }
}

/// `[runset]`, all in seconds except the poll interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSetSection {
    pub start_timeout: u64,
    pub stop_timeout: u64,
    pub reset_timeout: u64,
    pub poll_interval_ms: u64,
}

impl Default for RunSetSection {
    fn default() -> Self {
        Self {
            start_timeout: DEFAULT_START_TIMEOUT_SECS,
            stop_timeout: DEFAULT_STOP_TIMEOUT_SECS,
            reset_timeout: DEFAULT_RESET_TIMEOUT_SECS,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
        }
    }
}

/// `[tasks]`, periods in seconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSection {
    pub rate_period: u64,
    pub monitor_period: u64,
    pub watchdog_period: u64,
    pub active_doms_period: u64,
    pub active_doms_detail_period: u64,
    pub trigger_count_period: u64,
    pub radar_period: u64,
    pub radar_samples: u32,
    pub radar_duration: u64,
    pub max_worker_hangs: u32,
    pub health_meter_full: u32,
    /// Smallest acceptable free disk space, in MB
    pub disk_floor: i64,
    pub radar_doms: Vec<RadarDomSpec>,
}

impl Default for TaskSection {
    fn default() -> Self {
        Self {
            rate_period: DEFAULT_RATE_PERIOD_SECS,
            monitor_period: DEFAULT_MONITOR_PERIOD_SECS,
            watchdog_period: DEFAULT_WATCHDOG_PERIOD_SECS,
            active_doms_period: DEFAULT_ACTIVE_DOMS_PERIOD_SECS,
            active_doms_detail_period: DEFAULT_ACTIVE_DOMS_DETAIL_PERIOD_SECS,
            trigger_count_period: DEFAULT_TRIGGER_COUNT_PERIOD_SECS,
            radar_period: DEFAULT_RADAR_PERIOD_SECS,
            radar_samples: DEFAULT_RADAR_SAMPLES,
            radar_duration: DEFAULT_RADAR_DURATION_SECS,
            max_worker_hangs: DEFAULT_MAX_WORKER_HANGS,
            health_meter_full: DEFAULT_HEALTH_METER_FULL,
            disk_floor: DEFAULT_DISK_FLOOR,
            radar_doms: default_radar_doms(),
        }
    }
}

/// `[moni]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MoniSettings {
    pub target: MoniTarget,
}

impl CncConfig {
    /// Path of the server's own log file.
    pub fn log_file(&self) -> PathBuf {
        self.paths.log_dir.join(DEFAULT_LOG_FILE)
    }

    /// Task periods and limits for every run.
    pub fn task_settings(&self) -> TaskSettings {
        let t = &self.tasks;
        TaskSettings::default()
            .with_rate_period(Duration::from_secs(t.rate_period))
            .with_monitor_period(Duration::from_secs(t.monitor_period))
            .with_watchdog_period(Duration::from_secs(t.watchdog_period))
            .with_active_doms_periods(
                Duration::from_secs(t.active_doms_period),
                Duration::from_secs(t.active_doms_detail_period),
            )
            .with_trigger_count_period(Duration::from_secs(t.trigger_count_period))
            .with_radar(
                Duration::from_secs(t.radar_period),
                t.radar_samples,
                Duration::from_secs(t.radar_duration),
            )
            .with_radar_doms(t.radar_doms.clone())
            .with_max_worker_hangs(t.max_worker_hangs)
            .with_health_meter_full(t.health_meter_full)
            .with_disk_floor(t.disk_floor)
    }

    /// Timeouts, directories and task settings for every runset.
    pub fn runset_settings(&self) -> RunSetSettings {
        let mut settings = RunSetSettings::default()
            .with_rpc_timeout(Duration::from_secs(self.rpc.timeout))
            .with_start_timeout(Duration::from_secs(self.runset.start_timeout))
            .with_stop_timeout(Duration::from_secs(self.runset.stop_timeout))
            .with_reset_timeout(Duration::from_secs(self.runset.reset_timeout))
            .with_poll_interval(Duration::from_millis(self.runset.poll_interval_ms))
            .with_tasks(self.task_settings());
        if let Some(dir) = &self.paths.daq_data_dir {
            settings = settings.with_daq_data_dir(dir);
        }
        if let Some(dir) = &self.paths.spade_dir {
            settings = settings.with_spade_dir(dir);
        }
        settings
    }

    /// Run options used when the control client sends none.
    pub fn default_run_options(&self) -> RunOptions {
        RunOptions::new().with_moni_target(self.moni.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CncConfig::default();

        assert_eq!(config.rpc.timeout, 120);
        assert_eq!(config.runset.stop_timeout, 60);
        assert_eq!(config.tasks.watchdog_period, 10);
        assert!(config.paths.log_dir.ends_with(".pdaq/logs"));
        assert!(config.log_file().ends_with("logs/cncserver.log"));
    }

    #[test]
    fn test_runset_settings_conversion() {
        let mut config = CncConfig::default();
        config.rpc.timeout = 7;
        config.runset.poll_interval_ms = 20;
        config.paths.daq_data_dir = Some(PathBuf::from("/mnt/data/pdaqlocal"));
        config.tasks.radar_samples = 0;

        let settings = config.runset_settings();
        assert_eq!(settings.rpc_timeout, Duration::from_secs(7));
        assert_eq!(settings.poll_interval, Duration::from_millis(20));
        assert_eq!(
            settings.run_dir(118_000),
            Some(PathBuf::from("/mnt/data/pdaqlocal/run118000"))
        );
        assert!(settings.spade_dir.is_none());
        assert_eq!(settings.tasks.radar_samples, 1);
    }

    #[test]
    fn test_default_run_options() {
        let mut config = CncConfig::default();
        config.moni.target = MoniTarget::File;

        let options = config.default_run_options();
        assert_eq!(options.moni_target, MoniTarget::File);
        assert!(!options.redirects_logging());
    }
}
