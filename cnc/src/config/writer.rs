//! INI serialization: the commented text written to `cncserver.ini`.

use super::settings::CncConfig;
use std::path::Path;

/// Convert a `CncConfig` to a commented INI string for saving.
pub(super) fn to_config_string(config: &CncConfig) -> String {
    let optional = |p: &Option<std::path::PathBuf>| {
        p.as_deref().map(path_to_string).unwrap_or_default()
    };
    let radar_doms = config
        .tasks
        .radar_doms
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"[paths]
; Directory holding run configurations (<name>.json)
run_config_dir = {}
; Directory for the control server's own log file
log_dir = {}
; Parent of the per-run directories (run<N>/dash.log, run summaries)
; If empty, run logs go to the server log only
daq_data_dir = {}
; Drop box for archived run summaries. If empty, nothing is archived
spade_dir = {}

[rpc]
; Bound in seconds on a single component call (default: 120)
timeout = {}

[runset]
; Seconds components may take to become ready or running (default: 30)
start_timeout = {}
; Seconds components may take to stop, per attempt (default: 60)
stop_timeout = {}
; Seconds components may take to return to idle (default: 30)
reset_timeout = {}
; Delay between component state polls in milliseconds (default: 100)
poll_interval_ms = {}

[tasks]
; Periods in seconds
rate_period = {}
monitor_period = {}
watchdog_period = {}
active_doms_period = {}
active_doms_detail_period = {}
trigger_count_period = {}
radar_period = {}
; Radar sampling: samples per check spread over radar_duration seconds
radar_samples = {}
radar_duration = {}
; Consecutive hung checks before a slow task is disabled (default: 3)
max_worker_hangs = {}
; Watchdog checks in a row that may fail before the run is reported unhealthy (default: 9)
health_meter_full = {}
; Smallest acceptable free disk space in MB (default: 1024)
disk_floor = {}
; Sentinel DOMs for the radar task as mbid@string, comma separated
; Leave empty to disable radar sampling
radar_doms = {}

[moni]
; Where component MBean snapshots go: none, file, live or both (default: live)
target = {}
"#,
        optional(&config.paths.run_config_dir),
        path_to_string(&config.paths.log_dir),
        optional(&config.paths.daq_data_dir),
        optional(&config.paths.spade_dir),
        config.rpc.timeout,
        config.runset.start_timeout,
        config.runset.stop_timeout,
        config.runset.reset_timeout,
        config.runset.poll_interval_ms,
        config.tasks.rate_period,
        config.tasks.monitor_period,
        config.tasks.watchdog_period,
        config.tasks.active_doms_period,
        config.tasks.active_doms_detail_period,
        config.tasks.trigger_count_period,
        config.tasks.radar_period,
        config.tasks.radar_samples,
        config.tasks.radar_duration,
        config.tasks.max_worker_hangs,
        config.tasks.health_meter_full,
        config.tasks.disk_floor,
        radar_doms,
        config.moni.target.as_str(),
    )
}

fn path_to_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}
