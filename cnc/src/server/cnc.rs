//! The command-and-control server.

use super::error::CnCError;
use super::registry::ComponentRegistry;
use super::remote::RemoteProcessManager;
use crate::component::{list_component_ranges, ComponentProxy, ComponentState, ComponentSummary};
use crate::log::{Logger, TracingLogger};
use crate::moni::MoniSink;
use crate::run_config::{ClusterConfig, RunConfigSource};
use crate::runset::fanout::call_all;
use crate::runset::{RunOptions, RunSet, RunSetError, RunSetSettings, RunSetState, VersionInfo};
use crate::{log_error, log_info, log_warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Name the server gives itself when it stops a run.
pub const SERVER_CALLER: &str = "CnCServer";

/// Tracks registered components and the runsets built from them.
pub struct CnCServer {
    registry: Mutex<ComponentRegistry>,
    runsets: Mutex<BTreeMap<u32, Arc<RunSet>>>,
    next_runset_id: AtomicU32,
    configs: Arc<dyn RunConfigSource>,
    process_manager: Arc<dyn RemoteProcessManager>,
    cluster: ClusterConfig,
    settings: RunSetSettings,
    default_options: RunOptions,
    version: VersionInfo,
    moni: Option<Arc<dyn MoniSink>>,
    logger: Arc<dyn Logger>,
    dashlog: Option<Arc<dyn Logger>>,
}

impl CnCServer {
    pub fn new(
        configs: Arc<dyn RunConfigSource>,
        process_manager: Arc<dyn RemoteProcessManager>,
        settings: RunSetSettings,
    ) -> Self {
        Self {
            registry: Mutex::new(ComponentRegistry::new()),
            runsets: Mutex::new(BTreeMap::new()),
            next_runset_id: AtomicU32::new(1),
            configs,
            process_manager,
            cluster: ClusterConfig::new("localhost"),
            settings,
            default_options: RunOptions::new(),
            version: VersionInfo::current(),
            moni: None,
            logger: Arc::new(TracingLogger::with_source("CnCServer")),
            dashlog: None,
        }
    }

    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = cluster;
        self
    }

    pub fn with_version(mut self, version: VersionInfo) -> Self {
        self.version = version;
        self
    }

    /// Options a control-client start request is applied on top of.
    pub fn with_default_options(mut self, options: RunOptions) -> Self {
        self.default_options = options;
        self
    }

    pub fn with_moni(mut self, sink: Arc<dyn MoniSink>) -> Self {
        self.moni = Some(sink);
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Run log handed to every runset this server builds.
    pub fn with_dashlog(mut self, dashlog: Arc<dyn Logger>) -> Self {
        self.dashlog = Some(dashlog);
        self
    }

    pub fn cluster(&self) -> &ClusterConfig {
        &self.cluster
    }

    pub fn default_options(&self) -> RunOptions {
        self.default_options.clone()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Components
    // ─────────────────────────────────────────────────────────────────────

    /// Registers a component announced by its process.
    ///
    /// MBean information is loaded up front. A proxy already registered
    /// under the same name is replaced.
    pub fn add_component(&self, proxy: ComponentProxy) -> Arc<ComponentProxy> {
        if let Err(e) = proxy.preload_mbeans() {
            log_warn!(self.logger, "Cannot load MBeans for {}: {}", proxy.full_name(), e);
        }
        let proxy = Arc::new(proxy);
        if let Some(stale) = self.registry.lock().insert(Arc::clone(&proxy)) {
            log_info!(self.logger, "Replacing stale {}", stale);
        }
        log_info!(self.logger, "Registered {}", proxy);
        proxy
    }

    /// Number of registered components not bound to a runset.
    pub fn num_unused(&self) -> usize {
        self.registry.lock().len()
    }

    /// Listing rows for every unused component.
    pub async fn component_list(&self) -> Vec<ComponentSummary> {
        let comps = self.registry.lock().components();
        summarize(&comps, &self.settings).await
    }

    // ─────────────────────────────────────────────────────────────────────
    // Runsets
    // ─────────────────────────────────────────────────────────────────────

    /// Builds and configures a runset for the named run configuration.
    ///
    /// Fails without touching the registry if any required component is
    /// missing. If configuration fails the runset is returned at once.
    pub async fn make_runset(&self, config_name: &str) -> Result<Arc<RunSet>, CnCError> {
        self.build_runset(config_name, None).await
    }

    /// Like [`make_runset`](Self::make_runset), for a runset whose first
    /// run must be `run_number`.
    pub async fn make_runset_for_run(
        &self,
        config_name: &str,
        run_number: u32,
    ) -> Result<Arc<RunSet>, CnCError> {
        self.build_runset(config_name, Some(run_number)).await
    }

    async fn build_runset(
        &self,
        config_name: &str,
        planned_run: Option<u32>,
    ) -> Result<Arc<RunSet>, CnCError> {
        let config = self.configs.load(config_name)?;

        let comps = match self.registry.lock().take_for(&config, &self.cluster) {
            Ok(comps) => comps,
            Err(missing) => {
                log_error!(
                    self.logger,
                    "Cannot build runset for \"{}\": missing {}",
                    config.name(),
                    missing.join(", ")
                );
                return Err(CnCError::MissingComponent(missing));
            }
        };

        let id = self.next_runset_id.fetch_add(1, Ordering::SeqCst);
        let runset = match RunSet::new(id, config, comps.clone(), self.settings.clone()) {
            Ok(runset) => runset,
            Err(e) => {
                self.readmit(comps);
                return Err(e.into());
            }
        };
        let mut runset = runset.with_logger(Arc::clone(&self.logger));
        if let Some(run_number) = planned_run {
            runset = runset.with_planned_run(run_number);
        }
        if let Some(sink) = &self.moni {
            runset = runset.with_moni(Arc::clone(sink));
        }
        if let Some(dashlog) = &self.dashlog {
            runset = runset.with_dashlog(Arc::clone(dashlog));
        }
        let runset = Arc::new(runset);
        self.runsets.lock().insert(id, Arc::clone(&runset));
        log_info!(self.logger, "Built {}", runset);

        if let Err(e) = runset.configure().await {
            if let Err(ret) = self.return_runset(id).await {
                log_error!(self.logger, "Cannot return runset #{}: {}", id, ret);
            }
            return Err(e.into());
        }
        Ok(runset)
    }

    pub fn runset(&self, id: u32) -> Result<Arc<RunSet>, CnCError> {
        self.runsets
            .lock()
            .get(&id)
            .cloned()
            .ok_or(CnCError::UnknownRunSet(id))
    }

    pub fn runset_ids(&self) -> Vec<u32> {
        self.runsets.lock().keys().copied().collect()
    }

    pub fn num_sets(&self) -> usize {
        self.runsets.lock().len()
    }

    pub fn runset_state(&self, id: u32) -> Result<RunSetState, CnCError> {
        Ok(self.runset(id)?.state())
    }

    /// Listing rows for the components of runset `id`.
    pub async fn runset_list(&self, id: u32) -> Result<Vec<ComponentSummary>, CnCError> {
        Ok(self.runset(id)?.summaries().await)
    }

    pub async fn start_run(
        &self,
        id: u32,
        run_number: u32,
        options: RunOptions,
    ) -> Result<(), CnCError> {
        let runset = self.runset(id)?;
        runset
            .start_run(run_number, &self.cluster, options, &self.version)
            .await?;
        Ok(())
    }

    /// Stops the run on runset `id`; true if it ended with errors.
    pub async fn stop_run(&self, id: u32) -> Result<bool, CnCError> {
        Ok(self.runset(id)?.stop_run(SERVER_CALLER).await?)
    }

    /// Resets runset `id` and puts its components back in the unused pool.
    ///
    /// Components that do not reset are cycled through the process manager
    /// before being readmitted. If that fails too the call fails with
    /// [`RunSetError::ResetFailed`] and those components are dropped.
    pub async fn return_runset(&self, id: u32) -> Result<(), CnCError> {
        let runset = self.runset(id)?;
        if runset.is_running() {
            return Err(RunSetError::InvalidState {
                id,
                action: "be returned",
                state: runset.state(),
            }
            .into());
        }

        let unreset = runset.reset().await?;
        let mut cycle_error = None;
        if !unreset.is_empty() {
            log_warn!(
                self.logger,
                "Cycling components {}",
                list_component_ranges(unreset.iter().map(|c| c.name()))
            );
            let summaries = offline_summaries(&unreset);
            if let Err(e) = self.process_manager.cycle_components(&summaries) {
                log_error!(self.logger, "Cannot cycle components: {}", e);
                cycle_error = Some(e);
            }
        }

        let comps = runset.destroy().await?;
        self.runsets.lock().remove(&id);

        match cycle_error {
            None => {
                self.readmit(comps);
                log_info!(self.logger, "Returned runset #{}", id);
                Ok(())
            }
            Some(_) => {
                let failed: Vec<String> = unreset.iter().map(|c| c.full_name()).collect();
                let keep = comps
                    .into_iter()
                    .filter(|c| !unreset.iter().any(|u| Arc::ptr_eq(u, c)));
                self.readmit(keep);
                Err(RunSetError::ResetFailed(failed).into())
            }
        }
    }

    /// Stops runset `id` if it is running, then returns it.
    pub async fn break_runset(&self, id: u32) -> Result<(), CnCError> {
        let runset = self.runset(id)?;
        if runset.is_running() {
            match runset.stop_run("break").await {
                Ok(true) => log_warn!(self.logger, "Runset #{} stopped with errors", id),
                Ok(false) => {}
                Err(e) => log_error!(self.logger, "Cannot stop runset #{}: {}", id, e),
            }
        }
        self.return_runset(id).await
    }

    /// Breaks every runset and tells unused components to exit.
    pub async fn close(&self) -> Result<(), CnCError> {
        for id in self.runset_ids() {
            if let Err(e) = self.break_runset(id).await {
                log_error!(self.logger, "Cannot break runset #{}: {}", id, e);
            }
        }

        let comps = self.registry.lock().components();
        let outcomes = call_all(&comps, self.settings.rpc_timeout, |c| c.terminate()).await;
        let refused: Vec<Arc<ComponentProxy>> = outcomes
            .into_iter()
            .filter_map(|(comp, result)| {
                let e = result.err()?;
                log_warn!(self.logger, "Cannot terminate {}: {}", comp.full_name(), e);
                Some(comp)
            })
            .collect();
        if !refused.is_empty() {
            self.process_manager
                .kill_components(&offline_summaries(&refused))?;
        }
        log_info!(self.logger, "Closed server");
        Ok(())
    }

    fn readmit(&self, comps: impl IntoIterator<Item = Arc<ComponentProxy>>) {
        let mut registry = self.registry.lock();
        for comp in comps {
            registry.insert(comp);
        }
    }
}

/// Summaries without a state poll, for components that may be dead.
fn offline_summaries(comps: &[Arc<ComponentProxy>]) -> Vec<ComponentSummary> {
    comps
        .iter()
        .map(|c| ComponentSummary {
            id: c.id(),
            comp_name: c.name().name().to_string(),
            comp_num: c.name().num(),
            host: c.host().to_string(),
            rpc_port: c.port(),
            mbean_port: c.mbean_port(),
            state: ComponentState::Dead.to_string(),
        })
        .collect()
}

async fn summarize(
    comps: &[Arc<ComponentProxy>],
    settings: &RunSetSettings,
) -> Vec<ComponentSummary> {
    call_all(comps, settings.rpc_timeout, |c| Ok(c.summary()))
        .await
        .into_iter()
        .zip(offline_summaries(comps))
        .map(|((_, result), offline)| {
            result.unwrap_or(ComponentSummary {
                state: ComponentState::Hanging.to_string(),
                ..offline
            })
        })
        .collect()
}
