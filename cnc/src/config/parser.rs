//! INI parsing: the single place where key names map to struct fields.

use super::file::ConfigFileError;
use super::settings::CncConfig;
use crate::tasks::RadarDomSpec;
use ini::{Ini, Properties};
use std::path::PathBuf;
use std::str::FromStr;

/// Parse an `Ini` object into a `CncConfig`.
///
/// Starts from `CncConfig::default()` and overlays any values found in the INI.
pub(super) fn parse_ini(ini: &Ini) -> Result<CncConfig, ConfigFileError> {
    let mut config = CncConfig::default();

    // [paths] section
    if let Some(section) = ini.section(Some("paths")) {
        config.paths.run_config_dir = optional_path(section, "run_config_dir");
        if let Some(dir) = optional_path(section, "log_dir") {
            config.paths.log_dir = dir;
        }
        config.paths.daq_data_dir = optional_path(section, "daq_data_dir");
        config.paths.spade_dir = optional_path(section, "spade_dir");
    }

    // [rpc] section
    if let Some(section) = ini.section(Some("rpc")) {
        if let Some(v) = section.get("timeout") {
            config.rpc.timeout = positive("rpc", "timeout", v, "seconds")?;
        }
    }

    // [runset] section
    if let Some(section) = ini.section(Some("runset")) {
        let r = &mut config.runset;
        for (key, field) in [
            ("start_timeout", &mut r.start_timeout),
            ("stop_timeout", &mut r.stop_timeout),
            ("reset_timeout", &mut r.reset_timeout),
        ] {
            if let Some(v) = section.get(key) {
                *field = positive("runset", key, v, "seconds")?;
            }
        }
        if let Some(v) = section.get("poll_interval_ms") {
            r.poll_interval_ms = positive("runset", "poll_interval_ms", v, "milliseconds")?;
        }
    }

    // [tasks] section
    if let Some(section) = ini.section(Some("tasks")) {
        let t = &mut config.tasks;
        for (key, field) in [
            ("rate_period", &mut t.rate_period),
            ("monitor_period", &mut t.monitor_period),
            ("watchdog_period", &mut t.watchdog_period),
            ("active_doms_period", &mut t.active_doms_period),
            ("active_doms_detail_period", &mut t.active_doms_detail_period),
            ("trigger_count_period", &mut t.trigger_count_period),
            ("radar_period", &mut t.radar_period),
            ("radar_duration", &mut t.radar_duration),
        ] {
            if let Some(v) = section.get(key) {
                *field = positive("tasks", key, v, "seconds")?;
            }
        }
        for (key, field) in [
            ("radar_samples", &mut t.radar_samples),
            ("max_worker_hangs", &mut t.max_worker_hangs),
            ("health_meter_full", &mut t.health_meter_full),
        ] {
            if let Some(v) = section.get(key) {
                *field = positive("tasks", key, v, "count")?;
            }
        }
        if let Some(v) = section.get("disk_floor") {
            t.disk_floor = v.trim().parse().map_err(|_| {
                invalid("tasks", "disk_floor", v, "must be an integer (MB)".to_string())
            })?;
        }
        if let Some(v) = section.get("radar_doms") {
            t.radar_doms = parse_radar_doms(v)?;
        }
    }

    // [moni] section
    if let Some(section) = ini.section(Some("moni")) {
        if let Some(v) = section.get("target") {
            config.moni.target = v.parse().map_err(|_| {
                let reason = "must be one of: none, file, live, both".to_string();
                invalid("moni", "target", v, reason)
            })?;
        }
    }

    Ok(config)
}

fn invalid(section: &str, key: &str, value: &str, reason: String) -> ConfigFileError {
    ConfigFileError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason,
    }
}

/// A strictly positive integer.
fn positive<T>(section: &str, key: &str, value: &str, unit: &str) -> Result<T, ConfigFileError>
where
    T: FromStr + PartialOrd + Default,
{
    match value.trim().parse::<T>() {
        Ok(n) if n > T::default() => Ok(n),
        _ => Err(invalid(
            section,
            key,
            value,
            format!("must be a positive integer ({})", unit),
        )),
    }
}

fn optional_path(section: &Properties, key: &str) -> Option<PathBuf> {
    let v = section.get(key)?.trim();
    if v.is_empty() {
        None
    } else {
        Some(expand_tilde(v))
    }
}

fn parse_radar_doms(value: &str) -> Result<Vec<RadarDomSpec>, ConfigFileError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map_err(|reason| invalid("tasks", "radar_doms", s, reason)))
        .collect()
}

/// Expand `~` at the start of a path to the home directory.
pub(super) fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moni::MoniTarget;

    fn parse(text: &str) -> Result<CncConfig, ConfigFileError> {
        CncConfig::from_ini_str(text)
    }

    #[test]
    fn test_parse_sections() {
        let config = parse(
            "[paths]\n\
             daq_data_dir = /mnt/data/pdaqlocal\n\
             spade_dir =\n\
             [rpc]\n\
             timeout = 30\n\
             [runset]\n\
             stop_timeout = 90\n\
             poll_interval_ms = 250\n\
             [tasks]\n\
             watchdog_period = 5\n\
             disk_floor = -1\n\
             radar_doms = 48e492170268@6, 0123456789ab@21\n\
             [moni]\n\
             target = BOTH\n",
        )
        .unwrap();

        assert_eq!(
            config.paths.daq_data_dir,
            Some(PathBuf::from("/mnt/data/pdaqlocal"))
        );
        assert!(config.paths.spade_dir.is_none());
        assert_eq!(config.rpc.timeout, 30);
        assert_eq!(config.runset.stop_timeout, 90);
        assert_eq!(config.runset.start_timeout, 30);
        assert_eq!(config.runset.poll_interval_ms, 250);
        assert_eq!(config.tasks.watchdog_period, 5);
        assert_eq!(config.tasks.disk_floor, -1);
        assert_eq!(
            config.tasks.radar_doms,
            vec![
                RadarDomSpec::new("48e492170268", 6),
                RadarDomSpec::new("0123456789ab", 21)
            ]
        );
        assert_eq!(config.moni.target, MoniTarget::Both);
    }

    #[test]
    fn test_rejects_zero_period() {
        let err = parse("[tasks]\nmonitor_period = 0\n").unwrap_err();
        match err {
            ConfigFileError::InvalidValue {
                section, key, value, ..
            } => {
                assert_eq!(section, "tasks");
                assert_eq!(key, "monitor_period");
                assert_eq!(value, "0");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(parse("[rpc]\ntimeout = soon\n").is_err());
        assert!(parse("[moni]\ntarget = printer\n").is_err());
        assert!(parse("[tasks]\nradar_doms = 48e492170268\n").is_err());
    }

    #[test]
    fn test_empty_radar_doms_disables_radar() {
        let config = parse("[tasks]\nradar_doms =\n").unwrap();
        assert!(config.tasks.radar_doms.is_empty());
    }

    #[test]
    fn test_expand_tilde() {
        assert_eq!(expand_tilde("/abs/path"), PathBuf::from("/abs/path"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde("~/pdaq"), home.join("pdaq"));
        }
    }
}
