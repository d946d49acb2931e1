//! Periodic monitoring tasks run while a runset is taking data.
//!
//! Fast checks (rates, MBean monitoring, watchdog, active DOMs) run on the
//! blocking pool under the [`TaskManager`]'s tick loop. Slow checks
//! (trigger counts, radar sampling) hand each cycle to a
//! [`SupervisedWorker`] thread so a stuck component cannot stall the loop.

pub mod active_doms;
pub mod manager;
pub mod monitor;
pub mod radar;
pub mod rate;
pub mod settings;
pub mod task;
pub mod timer;
pub mod trigger_count;
pub mod watchdog;
pub mod worker;

pub use active_doms::ActiveDomsTask;
pub use manager::{standard_tasks, TaskManager};
pub use monitor::MonitorTask;
pub use radar::RadarTask;
pub use rate::RateTask;
pub use settings::{default_radar_doms, RadarDomSpec, TaskSettings};
pub use task::{CnCTask, TaskContext, TaskControl};
pub use timer::{IntervalTimer, TimerSet};
pub use trigger_count::TriggerCountTask;
pub use watchdog::{Comparison, WatchRule, WatchdogTask};
pub use worker::{SupervisedWorker, WorkerPoll};
