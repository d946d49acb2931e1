//! The runset lifecycle.
//!
//! A [`RunSet`] owns a fixed group of components for its whole life. Every
//! lifecycle call takes the runset's async lock, so configure, start, stop,
//! switch, subrun and reset never overlap. Component commands within one
//! tier go out concurrently; tiers are issued one after another in the
//! order computed by the [`ConnectionMap`].

use super::error::RunSetError;
use super::fanout::{call_all, failed_calls, failures, poll_states, wait_for_states};
use super::options::RunOptions;
use super::run_data::{ArchiveQueue, NoArchive, RunData, RunSummary, SpadeQueue};
use super::settings::RunSetSettings;
use super::state::RunSetState;
use super::stats::RunStats;
use super::version::VersionInfo;
use crate::component::{
    list_component_ranges, ComponentError, ComponentProxy, ComponentState, ComponentSummary,
};
use crate::connection::ConnectionMap;
use crate::log::{FileLogger, Logger, TracingLogger};
use crate::moni::{MoniSink, Priority};
use crate::run_config::{ClusterConfig, RunConfig};
use crate::tasks::{TaskContext, TaskManager};
use crate::time::ticks_to_datetime_this_year;
use crate::value::BeanValue;
use crate::{log_error, log_info, log_warn};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

pub const DASH_LOG_FILE: &str = "dash.log";

const STOPPED: [ComponentState; 2] = [ComponentState::Ready, ComponentState::Idle];

/// Components that failed a command, each with a problem line.
type Failures = Vec<(Arc<ComponentProxy>, String)>;

/// Bookkeeping for the run in progress.
struct ActiveRun {
    data: RunData,
    dashlog: Arc<dyn Logger>,
    tasks: TaskManager,
    stats: Arc<Mutex<RunStats>>,
    redirected_logging: bool,
}

/// A group of components driven through runs together.
pub struct RunSet {
    id: u32,
    run_config: RunConfig,
    components: Vec<Arc<ComponentProxy>>,
    conn_map: Arc<ConnectionMap>,
    settings: RunSetSettings,
    state: RwLock<RunSetState>,
    active: tokio::sync::Mutex<Option<ActiveRun>>,
    /// Components that failed configure, start or stop. Reset always
    /// reports them so they are cycled rather than reused.
    needs_cycling: Mutex<Vec<Arc<ComponentProxy>>>,
    /// Run number the runset was built for; cleared by the first start.
    planned_run: Mutex<Option<u32>>,
    run_number: Arc<AtomicU32>,
    moni: Option<Arc<dyn MoniSink>>,
    archive: Arc<dyn ArchiveQueue>,
    logger: Arc<dyn Logger>,
    dashlog: Option<Arc<dyn Logger>>,
}

impl RunSet {
    /// Wires the components together and fixes their command order.
    pub fn new(
        id: u32,
        run_config: RunConfig,
        components: Vec<Arc<ComponentProxy>>,
        settings: RunSetSettings,
    ) -> Result<Self, RunSetError> {
        let conn_map = ConnectionMap::build(&components)?;
        conn_map.assign_order();
        let components = conn_map.start_tiers().iter().flatten().cloned().collect();

        let archive: Arc<dyn ArchiveQueue> = match &settings.spade_dir {
            Some(dir) => Arc::new(SpadeQueue::new(dir)),
            None => Arc::new(NoArchive),
        };

        Ok(Self {
            id,
            run_config,
            components,
            conn_map: Arc::new(conn_map),
            settings,
            state: RwLock::new(RunSetState::Idle),
            active: tokio::sync::Mutex::new(None),
            needs_cycling: Mutex::new(Vec::new()),
            planned_run: Mutex::new(None),
            run_number: Arc::new(AtomicU32::new(0)),
            moni: None,
            archive,
            logger: Arc::new(TracingLogger::with_source(format!("runset-{}", id))),
            dashlog: None,
        })
    }

    /// Only `run_number` may be started first.
    pub fn with_planned_run(self, run_number: u32) -> Self {
        *self.planned_run.lock() = Some(run_number);
        self
    }

    pub fn with_moni(mut self, sink: Arc<dyn MoniSink>) -> Self {
        self.moni = Some(sink);
        self
    }

    pub fn with_archive(mut self, archive: Arc<dyn ArchiveQueue>) -> Self {
        self.archive = archive;
        self
    }

    /// Control log for lifecycle messages.
    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Run log used for every run instead of `<run dir>/dash.log`.
    pub fn with_dashlog(mut self, dashlog: Arc<dyn Logger>) -> Self {
        self.dashlog = Some(dashlog);
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> RunSetState {
        *self.state.read()
    }

    pub fn is_running(&self) -> bool {
        self.state() == RunSetState::Running
    }

    pub fn planned_run(&self) -> Option<u32> {
        *self.planned_run.lock()
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run_config
    }

    /// Components in start order.
    pub fn components(&self) -> &[Arc<ComponentProxy>] {
        &self.components
    }

    /// Components that failed a lifecycle command and will be reported by
    /// the next [`reset`](Self::reset).
    pub fn needs_cycling(&self) -> Vec<Arc<ComponentProxy>> {
        self.needs_cycling.lock().clone()
    }

    pub fn connection_map(&self) -> &ConnectionMap {
        &self.conn_map
    }

    /// Number of the current run, if one was started since the last reset.
    pub fn run_number(&self) -> Option<u32> {
        match self.run_number.load(Ordering::SeqCst) {
            0 => None,
            n => Some(n),
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────

    /// Connects and configures every component, then waits for all of them
    /// to report `ready`.
    pub async fn configure(&self) -> Result<(), RunSetError> {
        let _active = self.active.lock().await;
        self.require_state("configure", &[RunSetState::Idle])?;
        log_info!(
            self.logger,
            "Configuring runset #{} as \"{}\"",
            self.id,
            self.run_config.name()
        );

        let map = Arc::clone(&self.conn_map);
        let mut failed = self
            .command_tiers(self.conn_map.start_tiers(), move |c| {
                c.connect(map.connections_for(c.name()))
            })
            .await;

        if failed.is_empty() {
            let name = self.run_config.name().to_string();
            failed = self
                .command_tiers(self.conn_map.start_tiers(), move |c| {
                    c.configure(Some(name.as_str()))
                })
                .await;
        }

        if failed.is_empty() {
            let stragglers = wait_for_states(
                &self.components,
                &[ComponentState::Ready],
                self.settings.start_timeout,
                self.settings.poll_interval,
                self.settings.rpc_timeout,
            )
            .await;
            failed = state_failures(stragglers);
        }

        if !failed.is_empty() {
            let problems = self.mark_for_cycling(failed);
            for problem in &problems {
                log_error!(self.logger, "Configuration failed: {}", problem);
            }
            self.set_state(RunSetState::Error);
            return Err(RunSetError::ConfigurationFailed(problems));
        }

        self.set_state(RunSetState::Ready);
        Ok(())
    }

    /// Starts run `run_number`.
    ///
    /// Every component is polled first; if any fails to answer, no start
    /// command is sent and the runset stays ready. Non-hub tiers start
    /// first, hubs last.
    pub async fn start_run(
        &self,
        run_number: u32,
        cluster: &ClusterConfig,
        options: RunOptions,
        version: &VersionInfo,
    ) -> Result<(), RunSetError> {
        let mut active = self.active.lock().await;
        self.require_state("start a run", &[RunSetState::Ready])?;
        if let Some(planned) = self.planned_run() {
            if planned != run_number {
                return Err(RunSetError::WrongRunNumber {
                    planned,
                    requested: run_number,
                });
            }
        }

        let missing: Vec<String> = poll_states(&self.components, self.settings.rpc_timeout)
            .await
            .into_iter()
            .filter(|(_, state)| state.is_unreachable() || *state == ComponentState::Hanging)
            .map(|(comp, _)| format!("{} (ID#{})", comp.full_name(), comp.id()))
            .collect();
        if !missing.is_empty() {
            log_error!(
                self.logger,
                "Cannot start run {}: no answer from {}",
                run_number,
                missing.join(", ")
            );
            return Err(RunSetError::MissingComponent(missing));
        }

        let run_dir = self.settings.run_dir(run_number);
        if let Some(dir) = &run_dir {
            fs::create_dir_all(dir).map_err(|source| RunSetError::RunDirectory {
                path: dir.clone(),
                source,
            })?;
        }
        let dashlog = self.open_dashlog(run_dir.as_deref());

        log_info!(dashlog, "Version info: {}", version);
        log_info!(dashlog, "Run configuration: {}", self.run_config.name());
        log_info!(dashlog, "Cluster: {}", cluster.description());
        log_info!(
            self.logger,
            "Starting run #{} on \"{}\"",
            run_number,
            cluster.description()
        );

        self.set_state(RunSetState::Starting);
        self.run_number.store(run_number, Ordering::SeqCst);

        let redirected_logging = options.redirects_logging();
        if redirected_logging {
            self.redirect_logging(&options, dashlog.as_ref()).await;
        }

        log_info!(dashlog, "Starting run {}...", run_number);
        if let Err(e) = self.start_components(run_number).await {
            log_error!(dashlog, "{}", e);
            self.set_state(RunSetState::Error);
            return Err(e);
        }

        let stats = Arc::new(Mutex::new(RunStats::default()));
        if let Some(first_good) = self.forward_first_good_time(run_number, dashlog.as_ref()).await
        {
            stats.lock().first_good_time = Some(first_good);
        }

        let data = RunData::new(
            run_number,
            self.run_config.name(),
            cluster.description(),
            version.clone(),
            run_dir.clone(),
        );

        let mut ctx = TaskContext::new(self.components.clone(), Arc::clone(&dashlog))
            .with_moni_target(options.moni_target)
            .with_run_dir(run_dir)
            .with_run_number(Arc::clone(&self.run_number))
            .with_stats(Arc::clone(&stats));
        if let Some(sink) = &self.moni {
            ctx = ctx.with_moni(Arc::clone(sink), options.moni_target);
        }
        let mut task_settings = self.settings.tasks.clone();
        if let Some(period) = self.run_config.monitor_period() {
            task_settings = task_settings.with_monitor_period(period);
        }
        if let Some(period) = self.run_config.watchdog_period() {
            task_settings = task_settings.with_watchdog_period(period);
        }
        let mut tasks = TaskManager::for_run(ctx, &task_settings);
        tasks.start();

        self.send_moni(
            "runstart",
            BeanValue::map([
                ("runnum", BeanValue::from(run_number)),
                ("release", BeanValue::from(version.release.as_str())),
                ("revision", BeanValue::from(version.revision.as_str())),
                ("started", BeanValue::Bool(true)),
            ]),
        );

        *active = Some(ActiveRun {
            data,
            dashlog,
            tasks,
            stats,
            redirected_logging,
        });
        *self.planned_run.lock() = None;
        self.set_state(RunSetState::Running);
        Ok(())
    }

    /// Stops the current run on behalf of `caller`.
    ///
    /// Returns `Ok(true)` if the run ended with errors; the runset is then
    /// in [`RunSetState::Error`] and must be reset before reuse. Components
    /// still running after the forced stop yield
    /// [`RunSetError::StopTimeout`].
    pub async fn stop_run(&self, caller: &str) -> Result<bool, RunSetError> {
        let mut active = self.active.lock().await;
        self.require_state("stop the run", &[RunSetState::Running])?;
        let Some(mut run) = active.take() else {
            return Err(self.invalid_state("stop the run"));
        };

        self.set_state(RunSetState::Stopping);
        let dashlog = Arc::clone(&run.dashlog);
        let run_number = run.data.run_number;
        log_info!(dashlog, "Stopping the run ({})", caller);

        if let Some(last_good) = self.forward_last_good_time(run_number, dashlog.as_ref()).await {
            run.stats.lock().last_good_time = Some(last_good);
        }

        let mut had_error = false;
        for tier in self.conn_map.stop_tiers() {
            let outcomes = call_all(&tier, self.settings.rpc_timeout, |c| c.stop_run()).await;
            for failure in failures(&outcomes) {
                log_error!(dashlog, "Cannot stop {}", failure);
                had_error = true;
            }
        }

        let mut stuck = self.wait_stopped(&self.components).await;
        if !stuck.is_empty() {
            had_error = true;
            let names = describe_states(&stuck);
            log_warn!(dashlog, "Forcing stop of {}", names.join(", "));
            let comps: Vec<_> = stuck.into_iter().map(|(comp, _)| comp).collect();
            let outcomes = call_all(&comps, self.settings.rpc_timeout, |c| c.forced_stop()).await;
            for failure in failures(&outcomes) {
                log_error!(dashlog, "Cannot force stop of {}", failure);
            }
            stuck = self.wait_stopped(&comps).await;
        }

        run.tasks.stop().await;

        let stats = self.final_stats(&run).await;
        match stats.rate() {
            Some(rate) => log_info!(
                dashlog,
                "{} physics events collected in {} seconds ({:.2} Hz)",
                stats.num_events,
                stats.duration().unwrap_or_default() as i64,
                rate
            ),
            None => log_info!(
                dashlog,
                "{} physics events collected in 0 seconds",
                stats.num_events
            ),
        }
        log_info!(
            dashlog,
            "{} moni events, {} SN events, {} tcals",
            stats.num_moni,
            stats.num_sn,
            stats.num_tcal
        );

        let failed = had_error || !stuck.is_empty();
        let summary = run.data.finish(&stats, failed);
        self.archive_run(&summary, run.data.run_dir.as_deref(), dashlog.as_ref());
        self.send_moni(
            "runstop",
            BeanValue::map([
                ("runnum", BeanValue::from(run_number)),
                ("runstart", BeanValue::from(summary.start_time.to_rfc3339())),
                ("events", BeanValue::Int(stats.num_events)),
                ("status", BeanValue::from(summary.status.as_str())),
            ]),
        );

        if run.redirected_logging {
            let outcomes =
                call_all(&self.components, self.settings.rpc_timeout, |c| c.reset_logging()).await;
            for failure in failures(&outcomes) {
                log_warn!(self.logger, "Cannot reset logging: {}", failure);
            }
        }

        if !stuck.is_empty() {
            log_error!(dashlog, "Run terminated WITH ERROR.");
            self.set_state(RunSetState::Error);
            let problems = self.mark_for_cycling(state_failures(stuck));
            return Err(RunSetError::StopTimeout(problems));
        }
        if failed {
            log_error!(dashlog, "Run terminated WITH ERROR.");
            self.set_state(RunSetState::Error);
        } else {
            log_info!(dashlog, "Run terminated SUCCESSFULLY.");
            self.set_state(RunSetState::Ready);
        }
        Ok(failed)
    }

    /// Returns every component to `idle`.
    ///
    /// Components that refuse or never arrive are returned so the caller can
    /// cycle them, together with every component that failed an earlier
    /// configure, start or stop. The runset is then left in
    /// [`RunSetState::Error`].
    pub async fn reset(&self) -> Result<Vec<Arc<ComponentProxy>>, RunSetError> {
        let _active = self.active.lock().await;
        self.require_state(
            "reset",
            &[RunSetState::Idle, RunSetState::Ready, RunSetState::Error],
        )?;
        self.set_state(RunSetState::Resetting);

        let outcomes = call_all(&self.components, self.settings.reset_timeout, |c| c.reset()).await;
        let mut unreset = Vec::new();
        let mut answered = Vec::new();
        for (comp, result) in outcomes {
            match result {
                Ok(_) => answered.push(comp),
                Err(e) => {
                    log_error!(self.logger, "Cannot reset {}: {}", comp.full_name(), e);
                    unreset.push(comp);
                }
            }
        }

        let stragglers = wait_for_states(
            &answered,
            &[ComponentState::Idle],
            self.settings.reset_timeout,
            self.settings.poll_interval,
            self.settings.rpc_timeout,
        )
        .await;
        for (comp, state) in stragglers {
            log_error!(self.logger, "{} is {} after reset", comp.full_name(), state);
            unreset.push(comp);
        }
        for comp in self.needs_cycling.lock().iter() {
            if !unreset.iter().any(|u| Arc::ptr_eq(u, comp)) {
                log_warn!(self.logger, "{} failed earlier and must be cycled", comp.full_name());
                unreset.push(Arc::clone(comp));
            }
        }

        self.run_number.store(0, Ordering::SeqCst);
        if unreset.is_empty() {
            self.set_state(RunSetState::Idle);
        } else {
            log_error!(
                self.logger,
                "Runset #{} could not reset {}",
                self.id,
                list_component_ranges(unreset.iter().map(|c| c.name()))
            );
            self.set_state(RunSetState::Error);
        }
        Ok(unreset)
    }

    /// Moves a running runset on to `new_run` without stopping it.
    ///
    /// The old run is summarised and archived as if it had stopped. Returns
    /// the old run number.
    pub async fn switch_run(&self, new_run: u32) -> Result<u32, RunSetError> {
        let mut active = self.active.lock().await;
        self.require_state("switch runs", &[RunSetState::Running])?;
        let Some(run) = active.as_mut() else {
            return Err(self.invalid_state("switch runs"));
        };
        let old_run = run.data.run_number;
        let dashlog = Arc::clone(&run.dashlog);

        let problems: Vec<String> = self
            .command_tiers(self.conn_map.start_tiers(), move |c| {
                c.switch_to_new_run(new_run)
            })
            .await
            .into_iter()
            .map(|(_, problem)| problem)
            .collect();
        if !problems.is_empty() {
            for problem in &problems {
                log_error!(dashlog, "Cannot switch to run {}: {}", new_run, problem);
            }
            return Err(RunSetError::SwitchFailed(problems));
        }

        let stats = self.final_stats(run).await;
        let summary = run.data.finish(&stats, false);
        self.archive_run(&summary, run.data.run_dir.as_deref(), dashlog.as_ref());
        self.send_moni(
            "runstop",
            BeanValue::map([
                ("runnum", BeanValue::from(old_run)),
                ("runstart", BeanValue::from(summary.start_time.to_rfc3339())),
                ("events", BeanValue::Int(stats.num_events)),
                ("status", BeanValue::from(summary.status.as_str())),
            ]),
        );

        let run_dir = self.settings.run_dir(new_run);
        if let Some(dir) = &run_dir {
            if let Err(e) = fs::create_dir_all(dir) {
                log_error!(dashlog, "Cannot create {}: {}", dir.display(), e);
            }
        }
        run.data = RunData::new(
            new_run,
            self.run_config.name(),
            run.data.cluster.clone(),
            run.data.version.clone(),
            run_dir,
        );
        *run.stats.lock() = RunStats::default();
        run.tasks.reset();
        self.run_number.store(new_run, Ordering::SeqCst);

        self.send_moni(
            "runstart",
            BeanValue::map([
                ("runnum", BeanValue::from(new_run)),
                ("release", BeanValue::from(run.data.version.release.as_str())),
                ("revision", BeanValue::from(run.data.version.revision.as_str())),
                ("started", BeanValue::Bool(true)),
            ]),
        );
        log_info!(dashlog, "Switched from run {} to run {}", old_run, new_run);
        Ok(old_run)
    }

    /// Starts subrun `subrun` with the DOM settings in `doms`.
    ///
    /// Builders prepare, hubs start the subrun and report when they did,
    /// and builders commit at the latest of those times, which is returned.
    pub async fn subrun(&self, subrun: i32, doms: BeanValue) -> Result<i64, RunSetError> {
        let mut active = self.active.lock().await;
        self.require_state("start a subrun", &[RunSetState::Running])?;
        let Some(run) = active.as_mut() else {
            return Err(self.invalid_state("start a subrun"));
        };
        let dashlog = Arc::clone(&run.dashlog);
        let rpc = self.settings.rpc_timeout;
        let builders = self.builders();
        let hubs = self.hubs();

        let problems = failures(&call_all(&builders, rpc, move |c| c.prepare_subrun(subrun)).await);
        if !problems.is_empty() {
            return Err(self.subrun_failed(subrun, problems, dashlog.as_ref()));
        }

        let data = Arc::new(doms);
        let count = data.as_list().map_or(0, <[BeanValue]>::len);
        let outcomes = call_all(&hubs, rpc, move |c| c.start_subrun(&data)).await;
        let problems = failures(&outcomes);
        if !problems.is_empty() {
            return Err(self.subrun_failed(subrun, problems, dashlog.as_ref()));
        }
        let latest = outcomes
            .iter()
            .filter_map(|(_, result)| result.as_ref().ok().and_then(BeanValue::as_i64))
            .filter(|t| *t > 0)
            .max();
        let Some(latest) = latest else {
            let problem = "no hub reported a subrun start time".to_string();
            return Err(self.subrun_failed(subrun, vec![problem], dashlog.as_ref()));
        };

        let problems = failures(
            &call_all(&builders, rpc, move |c| c.commit_subrun(subrun, latest)).await,
        );
        if !problems.is_empty() {
            return Err(self.subrun_failed(subrun, problems, dashlog.as_ref()));
        }

        run.data.subrun = subrun;
        log_info!(
            dashlog,
            "Subrun {}: {} DOM settings committed at {}",
            subrun,
            count,
            latest
        );
        Ok(latest)
    }

    /// Listing rows for every component with a fresh state.
    pub async fn summaries(&self) -> Vec<ComponentSummary> {
        call_all(&self.components, self.settings.rpc_timeout, |c| Ok(c.summary()))
            .await
            .into_iter()
            .map(|(comp, result)| {
                result.unwrap_or_else(|_| ComponentSummary {
                    id: comp.id(),
                    comp_name: comp.name().name().to_string(),
                    comp_num: comp.name().num(),
                    host: comp.host().to_string(),
                    rpc_port: comp.port(),
                    mbean_port: comp.mbean_port(),
                    state: ComponentState::Hanging.to_string(),
                })
            })
            .collect()
    }

    /// Releases the components. The runset cannot be used afterwards.
    pub async fn destroy(&self) -> Result<Vec<Arc<ComponentProxy>>, RunSetError> {
        let _active = self.active.lock().await;
        self.require_state(
            "be destroyed",
            &[RunSetState::Idle, RunSetState::Ready, RunSetState::Error],
        )?;
        for comp in &self.components {
            comp.clear_order();
        }
        self.set_state(RunSetState::Destroyed);
        log_info!(self.logger, "Destroyed runset #{}", self.id);
        Ok(self.components.clone())
    }

    // ─────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────

    fn set_state(&self, state: RunSetState) {
        let mut current = self.state.write();
        let from = *current;
        debug!(runset = self.id, %from, to = %state, "Runset state change");
        *current = state;
    }

    fn invalid_state(&self, action: &'static str) -> RunSetError {
        RunSetError::InvalidState {
            id: self.id,
            action,
            state: self.state(),
        }
    }

    fn require_state(
        &self,
        action: &'static str,
        allowed: &[RunSetState],
    ) -> Result<(), RunSetError> {
        if allowed.contains(&self.state()) {
            Ok(())
        } else {
            Err(self.invalid_state(action))
        }
    }

    fn builders(&self) -> Vec<Arc<ComponentProxy>> {
        self.components
            .iter()
            .filter(|c| c.is_builder())
            .cloned()
            .collect()
    }

    fn hubs(&self) -> Vec<Arc<ComponentProxy>> {
        self.components.iter().filter(|c| c.is_hub()).cloned().collect()
    }

    /// Issues `op` tier by tier, stopping after the first tier with failures.
    async fn command_tiers<T, F>(&self, tiers: &[Vec<Arc<ComponentProxy>>], op: F) -> Failures
    where
        T: Send + 'static,
        F: Fn(&ComponentProxy) -> Result<T, ComponentError> + Clone + Send + Sync + 'static,
    {
        for tier in tiers {
            let failed = failed_calls(&call_all(tier, self.settings.rpc_timeout, op.clone()).await);
            if !failed.is_empty() {
                return failed;
            }
        }
        Vec::new()
    }

    /// Remembers the failed components for the next reset and returns the
    /// problem lines.
    fn mark_for_cycling(&self, failed: Failures) -> Vec<String> {
        let mut marked = self.needs_cycling.lock();
        let mut problems = Vec::with_capacity(failed.len());
        for (comp, problem) in failed {
            if !marked.iter().any(|m| Arc::ptr_eq(m, &comp)) {
                marked.push(comp);
            }
            problems.push(problem);
        }
        problems
    }

    async fn start_components(&self, run_number: u32) -> Result<(), RunSetError> {
        let (hubs, others): (Vec<_>, Vec<_>) = self
            .conn_map
            .start_tiers()
            .iter()
            .cloned()
            .partition(|tier| tier.iter().all(|c| c.is_source()));

        for (label, group) in [("NonHubs", others), ("Hubs", hubs)] {
            if group.is_empty() {
                continue;
            }
            let started = Instant::now();
            let failed = self
                .command_tiers(&group, move |c| c.start_run(run_number))
                .await;
            if !failed.is_empty() {
                return Err(RunSetError::StartFailed(self.mark_for_cycling(failed)));
            }

            let members: Vec<_> = group.into_iter().flatten().collect();
            let stragglers = wait_for_states(
                &members,
                &[ComponentState::Running],
                self.settings.start_timeout,
                self.settings.poll_interval,
                self.settings.rpc_timeout,
            )
            .await;
            if !stragglers.is_empty() {
                let problems = self.mark_for_cycling(state_failures(stragglers));
                return Err(RunSetError::StartFailed(problems));
            }
            log_info!(
                self.logger,
                "Waited {:.3} seconds for {}",
                started.elapsed().as_secs_f64(),
                label
            );
        }
        Ok(())
    }

    async fn redirect_logging(&self, options: &RunOptions, dashlog: &dyn Logger) {
        let (log_host, log_port) = options
            .log
            .as_ref()
            .map_or((String::new(), 0), |a| (a.host.clone(), a.port));
        let (live_host, live_port) = options
            .live
            .as_ref()
            .map_or((String::new(), 0), |a| (a.host.clone(), a.port));
        let outcomes = call_all(&self.components, self.settings.rpc_timeout, move |c| {
            c.log_to(&log_host, log_port, &live_host, live_port)
        })
        .await;
        for failure in failures(&outcomes) {
            log_warn!(dashlog, "Cannot redirect logging for {}", failure);
        }
    }

    /// Valid `stringhub.<field>` times reported by the hubs.
    async fn hub_times(&self, field: &'static str) -> Vec<i64> {
        call_all(&self.hubs(), self.settings.rpc_timeout, move |c| {
            Ok(c.get_single_bean_field("stringhub", field)?.as_i64())
        })
        .await
        .into_iter()
        .filter_map(|(_, result)| result.ok().flatten())
        .filter(|t| *t > 0)
        .collect()
    }

    /// The latest hub start time becomes the run's first good time.
    async fn forward_first_good_time(&self, run_number: u32, dashlog: &dyn Logger) -> Option<i64> {
        let Some(first_good) = self.hub_times("LatestFirstChannelHitTime").await.into_iter().max()
        else {
            log_warn!(dashlog, "Cannot determine first good time for run {}", run_number);
            return None;
        };

        let outcomes = call_all(&self.builders(), self.settings.rpc_timeout, move |c| {
            c.set_first_good_time(first_good)
        })
        .await;
        for failure in failures(&outcomes) {
            log_error!(dashlog, "Cannot set first good time: {}", failure);
        }
        self.send_moni(
            "firstGoodTime",
            BeanValue::map([
                ("runnum", BeanValue::from(run_number)),
                ("subrun", BeanValue::Int(0)),
                ("time", BeanValue::from(format_ticks(first_good))),
            ]),
        );
        Some(first_good)
    }

    /// The earliest hub end time becomes the run's last good time.
    async fn forward_last_good_time(&self, run_number: u32, dashlog: &dyn Logger) -> Option<i64> {
        let Some(last_good) = self.hub_times("EarliestLastChannelHitTime").await.into_iter().min()
        else {
            log_warn!(dashlog, "Cannot determine last good time for run {}", run_number);
            return None;
        };

        let outcomes = call_all(&self.builders(), self.settings.rpc_timeout, move |c| {
            c.set_last_good_time(last_good)
        })
        .await;
        for failure in failures(&outcomes) {
            log_error!(dashlog, "Cannot set last good time: {}", failure);
        }
        self.send_moni(
            "lastGoodTime",
            BeanValue::map([
                ("runnum", BeanValue::from(run_number)),
                ("time", BeanValue::from(format_ticks(last_good))),
            ]),
        );
        Some(last_good)
    }

    async fn wait_stopped(
        &self,
        components: &[Arc<ComponentProxy>],
    ) -> Vec<(Arc<ComponentProxy>, ComponentState)> {
        wait_for_states(
            components,
            &STOPPED,
            self.settings.stop_timeout,
            self.settings.poll_interval,
            self.settings.rpc_timeout,
        )
        .await
    }

    /// Run totals from the builders, falling back to the last rate check.
    async fn final_stats(&self, run: &ActiveRun) -> RunStats {
        let mut stats = run.stats.lock().clone();
        let run_number = run.data.run_number;
        let sources: Vec<_> = self
            .components
            .iter()
            .filter(|c| {
                c.name().is("eventBuilder", Some(0)) || c.name().is("secondaryBuilders", Some(0))
            })
            .cloned()
            .collect();

        let outcomes = call_all(&sources, self.settings.rpc_timeout, move |c| {
            c.get_run_data(run_number)
        })
        .await;
        for (comp, result) in outcomes {
            match result {
                Ok(BeanValue::Null) => {}
                Ok(data) if comp.name().name() == "eventBuilder" => {
                    stats.apply_event_builder_data(&data)
                }
                Ok(data) => stats.apply_secondary_data(&data),
                Err(e) => log_warn!(
                    run.dashlog,
                    "Cannot get run data from {}: {}",
                    comp.full_name(),
                    e
                ),
            }
        }
        stats
    }

    fn archive_run(&self, summary: &RunSummary, run_dir: Option<&Path>, dashlog: &dyn Logger) {
        if let Some(dir) = run_dir {
            if let Err(e) = summary.write_to(dir) {
                log_error!(dashlog, "Cannot write run summary: {}", e);
            }
        }
        if let Err(e) = self.archive.queue(summary) {
            log_error!(
                dashlog,
                "Cannot queue run {} for archival: {}",
                summary.run_number,
                e
            );
        }
    }

    fn subrun_failed(
        &self,
        subrun: i32,
        problems: Vec<String>,
        dashlog: &dyn Logger,
    ) -> RunSetError {
        for problem in &problems {
            log_error!(dashlog, "Subrun {} failed: {}", subrun, problem);
        }
        RunSetError::SubrunFailed(problems)
    }

    fn open_dashlog(&self, run_dir: Option<&Path>) -> Arc<dyn Logger> {
        if let Some(dashlog) = &self.dashlog {
            return Arc::clone(dashlog);
        }
        if let Some(dir) = run_dir {
            let path = dir.join(DASH_LOG_FILE);
            match FileLogger::open("DAQRun", &path) {
                Ok(logger) => return Arc::new(logger),
                Err(e) => log_error!(
                    self.logger,
                    "Cannot open run log {}: {}",
                    path.display(),
                    e
                ),
            }
        }
        Arc::new(TracingLogger::with_source("dash"))
    }

    fn send_moni(&self, name: &str, value: BeanValue) {
        if let Some(sink) = &self.moni {
            if !sink.send_moni(name, value, Priority::Scp) {
                tracing::warn!(runset = self.id, record = name, "Monitoring record refused");
            }
        }
    }
}

impl fmt::Display for RunSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RunSet #{} ({}): {}",
            self.id,
            self.state(),
            list_component_ranges(self.components.iter().map(|c| c.name()))
        )
    }
}

impl fmt::Debug for RunSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunSet")
            .field("id", &self.id)
            .field("components", &self.components)
            .finish_non_exhaustive()
    }
}

fn state_failures(entries: Vec<(Arc<ComponentProxy>, ComponentState)>) -> Failures {
    entries
        .into_iter()
        .map(|(comp, state)| {
            let problem = format!("{} ({})", comp.full_name(), state);
            (comp, problem)
        })
        .collect()
}

fn describe_states(entries: &[(Arc<ComponentProxy>, ComponentState)]) -> Vec<String> {
    entries
        .iter()
        .map(|(comp, state)| format!("{} ({})", comp.full_name(), state))
        .collect()
}

fn format_ticks(ticks: i64) -> String {
    ticks_to_datetime_this_year(ticks).map_or_else(|| ticks.to_string(), |dt| dt.to_string())
}
