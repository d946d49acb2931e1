//! Components registered with the server and not bound to a runset.

use crate::component::{ComponentName, ComponentProxy};
use crate::run_config::{ClusterConfig, RunConfig};
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct ComponentRegistry {
    unused: BTreeMap<ComponentName, Arc<ComponentProxy>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `proxy`, returning the stale proxy it replaces, if any.
    pub fn insert(&mut self, proxy: Arc<ComponentProxy>) -> Option<Arc<ComponentProxy>> {
        self.unused.insert(proxy.name().clone(), proxy)
    }

    pub fn remove(&mut self, name: &ComponentName) -> Option<Arc<ComponentProxy>> {
        self.unused.remove(name)
    }

    pub fn get(&self, name: &ComponentName) -> Option<&Arc<ComponentProxy>> {
        self.unused.get(name)
    }

    pub fn len(&self) -> usize {
        self.unused.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unused.is_empty()
    }

    pub fn components(&self) -> Vec<Arc<ComponentProxy>> {
        self.unused.values().cloned().collect()
    }

    /// Removes every component `config` needs.
    ///
    /// A component pinned to a host by `cluster` only matches a proxy on
    /// that host. If anything is missing nothing is removed and the missing
    /// names are returned instead.
    pub fn take_for(
        &mut self,
        config: &RunConfig,
        cluster: &ClusterConfig,
    ) -> Result<Vec<Arc<ComponentProxy>>, Vec<String>> {
        let missing: Vec<String> = config
            .components()
            .iter()
            .filter_map(|name| {
                let wanted_host = cluster.host_for(name);
                match (self.unused.get(name), wanted_host) {
                    (None, _) => Some(name.full_name()),
                    (Some(proxy), Some(host)) if proxy.host() != host => {
                        Some(format!("{}@{}", name.full_name(), host))
                    }
                    _ => None,
                }
            })
            .collect();
        if !missing.is_empty() {
            return Err(missing);
        }

        Ok(config
            .components()
            .iter()
            .filter_map(|name| self.unused.remove(name))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockComponent;

    fn proxy(name: &str, num: u32, host: &str) -> Arc<ComponentProxy> {
        Arc::new(Arc::new(MockComponent::new(name, num).with_host(host)).proxy())
    }

    #[test]
    fn test_insert_replaces_stale_proxy() {
        let mut registry = ComponentRegistry::new();
        let first = proxy("eventBuilder", 0, "localhost");
        assert!(registry.insert(Arc::clone(&first)).is_none());

        let stale = registry.insert(proxy("eventBuilder", 0, "localhost")).unwrap();
        assert_eq!(stale.id(), first.id());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_take_for_is_all_or_nothing() {
        let mut registry = ComponentRegistry::new();
        registry.insert(proxy("eventBuilder", 0, "localhost"));
        registry.insert(proxy("stringHub", 21, "localhost"));

        let config = RunConfig::new(
            "sim",
            vec![
                ComponentName::new("eventBuilder", 0),
                ComponentName::new("stringHub", 21),
                ComponentName::new("globalTrigger", 0),
            ],
        );
        let missing = registry
            .take_for(&config, &ClusterConfig::default())
            .unwrap_err();
        assert_eq!(missing, vec!["globalTrigger".to_string()]);
        assert_eq!(registry.len(), 2);

        registry.insert(proxy("globalTrigger", 0, "localhost"));
        let taken = registry.take_for(&config, &ClusterConfig::default()).unwrap();
        assert_eq!(taken.len(), 3);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_take_for_checks_pinned_host() {
        let mut registry = ComponentRegistry::new();
        registry.insert(proxy("stringHub", 21, "localhost"));
        let hub = ComponentName::new("stringHub", 21);
        let config = RunConfig::new("sim", vec![hub.clone()]);
        let cluster = ClusterConfig::new("spts").with_host(hub, "ichub21");

        let missing = registry.take_for(&config, &cluster).unwrap_err();
        assert_eq!(missing, vec!["stringHub#21@ichub21".to_string()]);
        assert_eq!(registry.len(), 1);
    }
}
