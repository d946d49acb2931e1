//! Named interval timers driving the task roster.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Fires once per period, or immediately when triggered.
#[derive(Debug, Clone)]
pub struct IntervalTimer {
    name: &'static str,
    period: Duration,
    next_due: Instant,
    forced: bool,
}

impl IntervalTimer {
    /// Creates a timer first due one period after `now`.
    pub fn new(name: &'static str, period: Duration, now: Instant) -> Self {
        Self {
            name,
            period,
            next_due: now + period,
            forced: false,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn is_time(&self, now: Instant) -> bool {
        self.forced || now >= self.next_due
    }

    pub fn time_left(&self, now: Instant) -> Duration {
        if self.forced {
            return Duration::ZERO;
        }
        self.next_due.saturating_duration_since(now)
    }

    /// Makes the timer due on the next check.
    pub fn trigger(&mut self) {
        self.forced = true;
    }

    /// Restarts the period from `now`.
    pub fn reset(&mut self, now: Instant) {
        self.forced = false;
        self.next_due = now + self.period;
    }
}

/// Timers shared between the task manager and its tick loop.
#[derive(Debug, Default)]
pub struct TimerSet {
    timers: Mutex<BTreeMap<&'static str, IntervalTimer>>,
    wake: Notify,
}

impl TimerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, timer: IntervalTimer) {
        self.timers.lock().insert(timer.name(), timer);
    }

    pub fn remove(&self, name: &str) {
        self.timers.lock().remove(name);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.timers.lock().contains_key(name)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.timers.lock().keys().copied().collect()
    }

    /// Forces `name` due and wakes the loop. Returns false for unknown timers.
    pub fn trigger(&self, name: &str) -> bool {
        let found = match self.timers.lock().get_mut(name) {
            Some(timer) => {
                timer.trigger();
                true
            }
            None => false,
        };
        if found {
            self.wake.notify_one();
        }
        found
    }

    pub fn trigger_all(&self) {
        for timer in self.timers.lock().values_mut() {
            timer.trigger();
        }
        self.wake.notify_one();
    }

    /// Returns the names of all due timers and restarts them.
    pub fn take_due(&self, now: Instant) -> Vec<&'static str> {
        let mut timers = self.timers.lock();
        let mut due = Vec::new();
        for timer in timers.values_mut() {
            if timer.is_time(now) {
                timer.reset(now);
                due.push(timer.name());
            }
        }
        due
    }

    /// Completes when a timer is triggered.
    pub async fn woken(&self) {
        self.wake.notified().await;
    }
}
