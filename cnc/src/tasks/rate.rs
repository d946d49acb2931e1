//! Physics event rate reporting.

use super::task::{CnCTask, TaskContext, TaskControl};
use crate::runset::RunStats;
use crate::{log_error, log_info};
use std::time::Duration;

pub const NAME: &str = "Rate";

/// Refreshes the run counters and logs a progress line.
pub struct RateTask {
    period: Duration,
}

impl RateTask {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }
}

impl CnCTask for RateTask {
    fn name(&self) -> &'static str {
        NAME
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn check(&mut self, ctx: &TaskContext) -> TaskControl {
        match RunStats::collect(&ctx.components) {
            Ok(stats) => {
                log_info!(ctx.dashlog, "{}", stats.progress_line());
                ctx.stats.lock().refresh_counters(stats);
            }
            Err(e) => log_error!(ctx.dashlog, "Cannot update event rates: {}", e),
        }
        TaskControl::Continue
    }
}
