//! Periods and limits for the monitoring tasks.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_RATE_PERIOD_SECS: u64 = 60;
pub const DEFAULT_MONITOR_PERIOD_SECS: u64 = 100;
pub const DEFAULT_WATCHDOG_PERIOD_SECS: u64 = 10;
pub const DEFAULT_ACTIVE_DOMS_PERIOD_SECS: u64 = 60;
pub const DEFAULT_ACTIVE_DOMS_DETAIL_PERIOD_SECS: u64 = 600;
pub const DEFAULT_TRIGGER_COUNT_PERIOD_SECS: u64 = 600;
pub const DEFAULT_RADAR_PERIOD_SECS: u64 = 900;
pub const DEFAULT_RADAR_SAMPLES: u32 = 8;
pub const DEFAULT_RADAR_DURATION_SECS: u64 = 120;
pub const DEFAULT_MAX_WORKER_HANGS: u32 = 3;
pub const DEFAULT_HEALTH_METER_FULL: u32 = 9;
pub const DEFAULT_DISK_FLOOR: i64 = 1024;
pub const DEFAULT_TICK_MS: u64 = 250;

/// Sentinel DOM sampled by the radar task, given as `mbid@string`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RadarDomSpec {
    pub mbid: String,
    pub string: u32,
}

impl RadarDomSpec {
    pub fn new(mbid: impl Into<String>, string: u32) -> Self {
        Self {
            mbid: mbid.into(),
            string,
        }
    }
}

impl FromStr for RadarDomSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (mbid, string) = s
            .trim()
            .split_once('@')
            .ok_or_else(|| format!("expected mbid@string, got '{}'", s))?;
        if mbid.len() != 12 || !mbid.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(format!("'{}' is not a 12-digit mainboard ID", mbid));
        }
        let string = string
            .parse()
            .map_err(|_| format!("'{}' is not a string number", string))?;
        Ok(Self::new(mbid.to_lowercase(), string))
    }
}

impl fmt::Display for RadarDomSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.mbid, self.string)
    }
}

/// Radar sentinels watched when nothing else is configured.
pub fn default_radar_doms() -> Vec<RadarDomSpec> {
    vec![RadarDomSpec::new("48e492170268", 6)]
}

/// Task roster configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskSettings {
    /// Scheduler wake-up granularity.
    pub tick: Duration,
    pub rate_period: Duration,
    pub monitor_period: Duration,
    pub watchdog_period: Duration,
    pub active_doms_period: Duration,
    pub active_doms_detail_period: Duration,
    pub trigger_count_period: Duration,
    pub radar_period: Duration,
    pub radar_samples: u32,
    pub radar_duration: Duration,
    pub max_worker_hangs: u32,
    pub health_meter_full: u32,
    pub disk_floor: i64,
    pub radar_doms: Vec<RadarDomSpec>,
}

impl Default for TaskSettings {
    fn default() -> Self {
        Self {
            tick: Duration::from_millis(DEFAULT_TICK_MS),
            rate_period: Duration::from_secs(DEFAULT_RATE_PERIOD_SECS),
            monitor_period: Duration::from_secs(DEFAULT_MONITOR_PERIOD_SECS),
            watchdog_period: Duration::from_secs(DEFAULT_WATCHDOG_PERIOD_SECS),
            active_doms_period: Duration::from_secs(DEFAULT_ACTIVE_DOMS_PERIOD_SECS),
            active_doms_detail_period: Duration::from_secs(
                DEFAULT_ACTIVE_DOMS_DETAIL_PERIOD_SECS,
            ),
            trigger_count_period: Duration::from_secs(DEFAULT_TRIGGER_COUNT_PERIOD_SECS),
            radar_period: Duration::from_secs(DEFAULT_RADAR_PERIOD_SECS),
            radar_samples: DEFAULT_RADAR_SAMPLES,
            radar_duration: Duration::from_secs(DEFAULT_RADAR_DURATION_SECS),
            max_worker_hangs: DEFAULT_MAX_WORKER_HANGS,
            health_meter_full: DEFAULT_HEALTH_METER_FULL,
            disk_floor: DEFAULT_DISK_FLOOR,
            radar_doms: default_radar_doms(),
        }
    }
}

impl TaskSettings {
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    pub fn with_rate_period(mut self, period: Duration) -> Self {
        self.rate_period = period;
        self
    }

    pub fn with_monitor_period(mut self, period: Duration) -> Self {
        self.monitor_period = period;
        self
    }

    pub fn with_watchdog_period(mut self, period: Duration) -> Self {
        self.watchdog_period = period;
        self
    }

    pub fn with_active_doms_periods(mut self, period: Duration, detail: Duration) -> Self {
        self.active_doms_period = period;
        self.active_doms_detail_period = detail;
        self
    }

    pub fn with_trigger_count_period(mut self, period: Duration) -> Self {
        self.trigger_count_period = period;
        self
    }

    pub fn with_radar(mut self, period: Duration, samples: u32, duration: Duration) -> Self {
        self.radar_period = period;
        self.radar_samples = samples.max(1);
        self.radar_duration = duration;
        self
    }

    pub fn with_radar_doms(mut self, doms: Vec<RadarDomSpec>) -> Self {
        self.radar_doms = doms;
        self
    }

    pub fn with_max_worker_hangs(mut self, hangs: u32) -> Self {
        self.max_worker_hangs = hangs;
        self
    }

    pub fn with_health_meter_full(mut self, full: u32) -> Self {
        self.health_meter_full = full.max(1);
        self
    }

    pub fn with_disk_floor(mut self, floor: i64) -> Self {
        self.disk_floor = floor;
        self
    }
}
