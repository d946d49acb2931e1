//! Tick loop driving the per-run monitoring tasks.
//!
//! Each task owns a named [`IntervalTimer`]. The loop wakes on every tick
//! (or when a timer is forced), collects the due timers and runs each due
//! task's check on the blocking pool. A check still running when its timer
//! fires again is skipped rather than queued.

use super::active_doms::ActiveDomsTask;
use super::monitor::MonitorTask;
use super::radar::RadarTask;
use super::rate::RateTask;
use super::settings::TaskSettings;
use super::task::{CnCTask, TaskContext, TaskControl};
use super::timer::{IntervalTimer, TimerSet};
use super::trigger_count::TriggerCountTask;
use super::watchdog::{WatchRule, WatchdogTask};
use crate::log_warn;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Builds the task roster for a run.
///
/// Rate and watchdog checks always run. Monitoring needs somewhere to send
/// its data; the DOM, trigger and radar reports need a monitoring sink.
pub fn standard_tasks(settings: &TaskSettings, ctx: &TaskContext) -> Vec<Box<dyn CnCTask>> {
    let mut tasks: Vec<Box<dyn CnCTask>> = vec![
        Box::new(RateTask::new(settings.rate_period)),
        Box::new(WatchdogTask::new(
            settings.watchdog_period,
            WatchRule::default_roster(settings.disk_floor),
            settings.health_meter_full,
        )),
    ];

    let live = ctx.moni_target.to_live() && ctx.has_moni();
    let file = ctx.moni_target.to_file() && ctx.run_dir.is_some();
    if live || file {
        tasks.push(Box::new(MonitorTask::new(settings.monitor_period)));
    }

    if ctx.has_moni() {
        tasks.push(Box::new(ActiveDomsTask::new(
            settings.active_doms_period,
            settings.active_doms_detail_period,
        )));
        tasks.push(Box::new(TriggerCountTask::new(
            settings.trigger_count_period,
            settings.max_worker_hangs,
        )));
        if !settings.radar_doms.is_empty() {
            tasks.push(Box::new(RadarTask::new(
                settings.radar_period,
                settings.radar_doms.clone(),
                settings.radar_samples,
                settings.radar_duration,
                settings.max_worker_hangs,
            )));
        }
    }

    tasks
}

struct TaskSlot {
    name: &'static str,
    task: Arc<Mutex<Box<dyn CnCTask>>>,
    busy: Arc<AtomicBool>,
    disabled: Arc<AtomicBool>,
}

/// Clears a slot's busy flag when its check returns or unwinds.
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Schedules the monitoring tasks of one run.
pub struct TaskManager {
    slots: Arc<Vec<TaskSlot>>,
    timers: Arc<TimerSet>,
    ctx: Arc<TaskContext>,
    tick: Duration,
    shutdown: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl TaskManager {
    pub fn new(ctx: TaskContext, tasks: Vec<Box<dyn CnCTask>>, tick: Duration) -> Self {
        let now = Instant::now();
        let timers = TimerSet::new();
        let slots = tasks
            .into_iter()
            .map(|task| {
                timers.add(IntervalTimer::new(task.name(), task.period(), now));
                TaskSlot {
                    name: task.name(),
                    task: Arc::new(Mutex::new(task)),
                    busy: Arc::new(AtomicBool::new(false)),
                    disabled: Arc::new(AtomicBool::new(false)),
                }
            })
            .collect();

        Self {
            slots: Arc::new(slots),
            timers: Arc::new(timers),
            ctx: Arc::new(ctx),
            tick: tick.max(Duration::from_millis(1)),
            shutdown: CancellationToken::new(),
            handle: None,
        }
    }

    /// Manager running the standard roster built from `settings`.
    pub fn for_run(ctx: TaskContext, settings: &TaskSettings) -> Self {
        let tasks = standard_tasks(settings, &ctx);
        Self::new(ctx, tasks, settings.tick)
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.slots.iter().map(|s| s.name).collect()
    }

    pub fn context(&self) -> &TaskContext {
        &self.ctx
    }

    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// True once a task has taken itself out of the schedule.
    pub fn is_disabled(&self, name: &str) -> bool {
        self.slots
            .iter()
            .any(|s| s.name == name && s.disabled.load(Ordering::SeqCst))
    }

    /// Starts the tick loop on the current runtime.
    pub fn start(&mut self) {
        if self.handle.is_some() {
            return;
        }
        info!(tasks = ?self.task_names(), "Starting task manager");
        let slots = Arc::clone(&self.slots);
        let timers = Arc::clone(&self.timers);
        let ctx = Arc::clone(&self.ctx);
        let shutdown = self.shutdown.clone();
        let tick = self.tick;
        self.handle = Some(tokio::spawn(run_loop(slots, timers, ctx, tick, shutdown)));
    }

    /// Forces the named task to run at the next wakeup.
    pub fn trigger(&self, name: &str) -> bool {
        self.timers.trigger(name)
    }

    pub fn trigger_all(&self) {
        self.timers.trigger_all();
    }

    /// Forgets per-run state in every task that is not currently checking.
    pub fn reset(&self) {
        for slot in self.slots.iter() {
            match slot.task.try_lock() {
                Some(mut task) => task.reset(),
                None => debug!(task = slot.name, "Task busy, not reset"),
            }
        }
    }

    /// Stops the tick loop and releases every task's background work.
    pub async fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(handle) = self.handle.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "Task manager loop ended abnormally");
            }
        }
        for slot in self.slots.iter() {
            match slot.task.try_lock() {
                Some(mut task) => task.close(),
                None => debug!(task = slot.name, "Task still checking at shutdown"),
            }
        }
        info!("Task manager stopped");
    }
}

impl Drop for TaskManager {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn run_loop(
    slots: Arc<Vec<TaskSlot>>,
    timers: Arc<TimerSet>,
    ctx: Arc<TaskContext>,
    tick: Duration,
    shutdown: CancellationToken,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("Task manager loop shutting down");
                break;
            }

            _ = timers.woken() => {}

            _ = interval.tick() => {}
        }

        for name in timers.take_due(Instant::now()) {
            let Some(slot) = slots.iter().find(|s| s.name == name) else {
                continue;
            };
            if slot.disabled.load(Ordering::SeqCst) {
                continue;
            }
            if slot.busy.swap(true, Ordering::SeqCst) {
                log_warn!(ctx.dashlog, "{} check is still running; skipping", name);
                continue;
            }
            dispatch(slot, &timers, &ctx);
        }
    }
}

fn dispatch(slot: &TaskSlot, timers: &Arc<TimerSet>, ctx: &Arc<TaskContext>) {
    let guard = BusyGuard(Arc::clone(&slot.busy));
    let task = Arc::clone(&slot.task);
    let disabled = Arc::clone(&slot.disabled);
    let timers = Arc::clone(timers);
    let ctx = Arc::clone(ctx);
    let name = slot.name;

    tokio::task::spawn_blocking(move || {
        let _guard = guard;
        let control = task.lock().check(&ctx);
        if control == TaskControl::Disable {
            debug!(task = name, "Task disabled for the rest of the run");
            disabled.store(true, Ordering::SeqCst);
            timers.remove(name);
        }
    });
}
