//! Run and cluster configuration as seen by the control server.
//!
//! Parsing the detector's XML run configurations is not this crate's job.
//! A [`RunConfigSource`] hands the server an already-resolved
//! [`RunConfig`]: the components a run needs, the DOMs behind each hub and
//! optional per-run task periods. Two sources are provided: an in-memory
//! table and a directory of JSON documents.

use crate::component::ComponentName;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors resolving a run configuration.
#[derive(Debug, Error)]
pub enum RunConfigError {
    /// No configuration with this name exists.
    #[error("Run configuration \"{0}\" not found")]
    NotFound(String),

    /// The configuration exists but cannot be used.
    #[error("Run configuration \"{name}\" is invalid: {reason}")]
    Invalid { name: String, reason: String },

    #[error("Failed to read run configuration {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Everything the control server needs to know about one run configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    name: String,
    components: Vec<ComponentName>,
    hub_doms: BTreeMap<u32, Vec<String>>,
    monitor_period: Option<Duration>,
    watchdog_period: Option<Duration>,
}

impl RunConfig {
    pub fn new(name: impl Into<String>, components: Vec<ComponentName>) -> Self {
        Self {
            name: name.into(),
            components,
            hub_doms: BTreeMap::new(),
            monitor_period: None,
            watchdog_period: None,
        }
    }

    /// Records the mainboard IDs of the DOMs read out by hub `hub`.
    pub fn with_hub_doms(mut self, hub: u32, doms: Vec<String>) -> Self {
        self.hub_doms.insert(hub, doms);
        self
    }

    pub fn with_monitor_period(mut self, period: Duration) -> Self {
        self.monitor_period = Some(period);
        self
    }

    pub fn with_watchdog_period(mut self, period: Duration) -> Self {
        self.watchdog_period = Some(period);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn components(&self) -> &[ComponentName] {
        &self.components
    }

    pub fn has_component(&self, name: &ComponentName) -> bool {
        self.components.contains(name)
    }

    pub fn hub_doms(&self, hub: u32) -> &[String] {
        self.hub_doms.get(&hub).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn monitor_period(&self) -> Option<Duration> {
        self.monitor_period
    }

    pub fn watchdog_period(&self) -> Option<Duration> {
        self.watchdog_period
    }
}

/// Description of the cluster a run executes on.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterConfig {
    description: String,
    hosts: BTreeMap<ComponentName, String>,
}

impl ClusterConfig {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            hosts: BTreeMap::new(),
        }
    }

    /// Pins `component` to `host`.
    pub fn with_host(mut self, component: ComponentName, host: impl Into<String>) -> Self {
        self.hosts.insert(component, host.into());
        self
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    /// Host the component must run on, if the cluster pins it.
    pub fn host_for(&self, component: &ComponentName) -> Option<&str> {
        self.hosts.get(component).map(String::as_str)
    }
}

/// Provider of run configurations by name.
pub trait RunConfigSource: Send + Sync {
    fn load(&self, name: &str) -> Result<RunConfig, RunConfigError>;

    /// Names of every configuration this source can load.
    fn names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Configurations held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticRunConfigs {
    configs: BTreeMap<String, RunConfig>,
}

impl StaticRunConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: RunConfig) -> Self {
        self.configs.insert(config.name().to_string(), config);
        self
    }
}

impl RunConfigSource for StaticRunConfigs {
    fn load(&self, name: &str) -> Result<RunConfig, RunConfigError> {
        self.configs
            .get(name)
            .cloned()
            .ok_or_else(|| RunConfigError::NotFound(name.to_string()))
    }

    fn names(&self) -> Vec<String> {
        self.configs.keys().cloned().collect()
    }
}

#[derive(Debug, Deserialize)]
struct RunConfigDocument {
    components: Vec<String>,
    #[serde(default)]
    hub_doms: BTreeMap<u32, Vec<String>>,
    #[serde(default)]
    monitor_period_secs: Option<u64>,
    #[serde(default)]
    watchdog_period_secs: Option<u64>,
}

/// Configurations stored as `<dir>/<name>.json`.
///
/// ```json
/// {
///   "components": ["stringHub#21", "inIceTrigger", "eventBuilder"],
///   "hub_doms": { "21": ["48e492170268"] },
///   "monitor_period_secs": 30
/// }
/// ```
#[derive(Debug, Clone)]
pub struct JsonRunConfigs {
    dir: PathBuf,
}

impl JsonRunConfigs {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn parse(name: &str, text: &str) -> Result<RunConfig, RunConfigError> {
        let invalid = |reason: String| RunConfigError::Invalid {
            name: name.to_string(),
            reason,
        };
        let doc: RunConfigDocument =
            serde_json::from_str(text).map_err(|e| invalid(e.to_string()))?;

        let components = doc
            .components
            .iter()
            .map(|c| c.parse::<ComponentName>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(invalid)?;
        if components.is_empty() {
            return Err(invalid("no components listed".to_string()));
        }

        let mut config = RunConfig::new(name, components);
        for (hub, doms) in doc.hub_doms {
            config = config.with_hub_doms(hub, doms);
        }
        if let Some(secs) = doc.monitor_period_secs {
            config = config.with_monitor_period(Duration::from_secs(secs));
        }
        if let Some(secs) = doc.watchdog_period_secs {
            config = config.with_watchdog_period(Duration::from_secs(secs));
        }
        Ok(config)
    }
}

impl RunConfigSource for JsonRunConfigs {
    fn load(&self, name: &str) -> Result<RunConfig, RunConfigError> {
        let name = name.strip_suffix(".json").unwrap_or(name);
        let path = self.dir.join(format!("{}.json", name));
        if !path.is_file() {
            return Err(RunConfigError::NotFound(name.to_string()));
        }
        let text = fs::read_to_string(&path).map_err(|source| RunConfigError::Io {
            path: path.clone(),
            source,
        })?;
        Self::parse(name, &text)
    }

    fn names(&self) -> Vec<String> {
        let Ok(entries) = fs::read_dir(&self.dir) else {
            return Vec::new();
        };
        let mut names: Vec<String> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().into_owned()))
            .collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_static_source() {
        let source = StaticRunConfigs::new().with_config(RunConfig::new(
            "sim5",
            vec![ComponentName::new("eventBuilder", 0)],
        ));
        assert_eq!(source.load("sim5").unwrap().components().len(), 1);
        assert!(matches!(
            source.load("nope"),
            Err(RunConfigError::NotFound(n)) if n == "nope"
        ));
        assert_eq!(source.names(), vec!["sim5"]);
    }

    #[test]
    fn test_json_source() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("sim-5str.json"),
            r#"{"components": ["stringHub#21", "eventBuilder"],
                "hub_doms": {"21": ["48e492170268"]},
                "watchdog_period_secs": 5}"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.json"), r#"{"components": []}"#).unwrap();

        let source = JsonRunConfigs::new(dir.path());
        let config = source.load("sim-5str").unwrap();
        assert!(config.has_component(&ComponentName::new("stringHub", 21)));
        assert_eq!(config.hub_doms(21), ["48e492170268".to_string()]);
        assert!(config.hub_doms(1).is_empty());
        assert_eq!(config.watchdog_period(), Some(Duration::from_secs(5)));
        assert_eq!(config.monitor_period(), None);

        assert!(matches!(
            source.load("broken"),
            Err(RunConfigError::Invalid { .. })
        ));
        assert!(matches!(
            source.load("missing"),
            Err(RunConfigError::NotFound(_))
        ));
        assert_eq!(source.names(), vec!["broken", "sim-5str"]);
    }

    #[test]
    fn test_cluster_hosts() {
        let hub = ComponentName::new("stringHub", 21);
        let cluster = ClusterConfig::new("localhost").with_host(hub.clone(), "sps-ichub21");
        assert_eq!(cluster.host_for(&hub), Some("sps-ichub21"));
        assert_eq!(cluster.host_for(&ComponentName::new("eventBuilder", 0)), None);
        assert_eq!(cluster.description(), "localhost");
    }
}
