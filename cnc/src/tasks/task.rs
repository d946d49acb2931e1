//! Task trait and the per-run context tasks read from.

use crate::component::ComponentProxy;
use crate::log::Logger;
use crate::moni::{MoniSink, MoniTarget, Priority};
use crate::runset::RunStats;
use crate::value::BeanValue;
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// What the manager should do with a task after a check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskControl {
    Continue,
    /// Stop scheduling this task for the rest of the run.
    Disable,
}

/// A periodic check run by the [`TaskManager`](super::TaskManager).
///
/// `check` runs on the blocking pool and may issue remote calls; it must
/// absorb and log its own failures.
pub trait CnCTask: Send {
    fn name(&self) -> &'static str;

    fn period(&self) -> Duration;

    fn check(&mut self, ctx: &TaskContext) -> TaskControl;

    /// Forgets per-run state (cached DOM lists, hang counters).
    fn reset(&mut self) {}

    /// Releases background work when the run stops.
    fn close(&mut self) {}
}

/// Everything a task may touch while the run is going.
pub struct TaskContext {
    pub components: Vec<Arc<ComponentProxy>>,
    pub dashlog: Arc<dyn Logger>,
    pub moni: Option<Arc<dyn MoniSink>>,
    pub moni_target: MoniTarget,
    pub run_dir: Option<PathBuf>,
    pub run_number: Arc<AtomicU32>,
    pub stats: Arc<Mutex<RunStats>>,
}

impl TaskContext {
    pub fn new(components: Vec<Arc<ComponentProxy>>, dashlog: Arc<dyn Logger>) -> Self {
        Self {
            components,
            dashlog,
            moni: None,
            moni_target: MoniTarget::None,
            run_dir: None,
            run_number: Arc::new(AtomicU32::new(0)),
            stats: Arc::new(Mutex::new(RunStats::default())),
        }
    }

    pub fn with_moni(mut self, sink: Arc<dyn MoniSink>, target: MoniTarget) -> Self {
        self.moni = Some(sink);
        self.moni_target = target;
        self
    }

    pub fn with_moni_target(mut self, target: MoniTarget) -> Self {
        self.moni_target = target;
        self
    }

    pub fn with_run_dir(mut self, run_dir: Option<PathBuf>) -> Self {
        self.run_dir = run_dir;
        self
    }

    pub fn with_run_number(mut self, run_number: Arc<AtomicU32>) -> Self {
        self.run_number = run_number;
        self
    }

    pub fn with_stats(mut self, stats: Arc<Mutex<RunStats>>) -> Self {
        self.stats = stats;
        self
    }

    pub fn run_number(&self) -> u32 {
        self.run_number.load(Ordering::SeqCst)
    }

    pub fn has_moni(&self) -> bool {
        self.moni.is_some()
    }

    /// Sends a monitoring record; false if there is no sink or it refused.
    pub fn send_moni(&self, name: &str, value: BeanValue, priority: Priority) -> bool {
        match &self.moni {
            Some(sink) => sink.send_moni(name, value, priority),
            None => false,
        }
    }

    /// Components called `name`, any instance number.
    pub fn components_named<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a Arc<ComponentProxy>> + 'a {
        self.components.iter().filter(move |c| c.name().name() == name)
    }

    pub fn hubs(&self) -> impl Iterator<Item = &Arc<ComponentProxy>> {
        self.components.iter().filter(|c| c.is_hub())
    }
}
