//! Threshold watchdog with a run health meter.
//!
//! Every check evaluates a roster of rules against component MBeans. Any
//! breach costs the health meter one point; a clean check refills it. The
//! meter reaching zero is reported as an unhealthy run but never changes
//! the run's lifecycle state.

use super::task::{CnCTask, TaskContext, TaskControl};
use crate::value::BeanValue;
use crate::{log_error, log_info, log_warn};
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

pub const NAME: &str = "Watchdog";

/// Condition a watched value must not meet.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Below(i64),
    Above(i64),
    /// Value identical to the previous check.
    Unchanged,
}

/// One `(component, bean, field, comparison)` rule.
#[derive(Debug, Clone, PartialEq)]
pub struct WatchRule {
    pub component: String,
    pub bean: String,
    pub field: String,
    pub comparison: Comparison,
}

impl WatchRule {
    pub fn new(component: &str, bean: &str, field: &str, comparison: Comparison) -> Self {
        Self {
            component: component.to_string(),
            bean: bean.to_string(),
            field: field.to_string(),
            comparison,
        }
    }

    /// Builder and SN disk space must stay above `floor`.
    pub fn default_roster(disk_floor: i64) -> Vec<WatchRule> {
        vec![
            WatchRule::new(
                "eventBuilder",
                "backEnd",
                "DiskAvailable",
                Comparison::Below(disk_floor),
            ),
            WatchRule::new(
                "secondaryBuilders",
                "snBuilder",
                "DiskAvailable",
                Comparison::Below(disk_floor),
            ),
        ]
    }
}

/// A rule that fired for a specific component.
#[derive(Debug, Clone, PartialEq)]
struct Breach {
    component: String,
    bean: String,
    field: String,
    comparison: Comparison,
    value: BeanValue,
}

impl fmt::Display for Breach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}.{} ", self.component, self.bean, self.field)?;
        match &self.comparison {
            Comparison::Below(limit) => write!(f, "below {}", limit)?,
            Comparison::Above(limit) => write!(f, "above {}", limit)?,
            Comparison::Unchanged => f.write_str("not changing")?,
        }
        write!(f, " (value={})", self.value)
    }
}

pub struct WatchdogTask {
    period: Duration,
    rules: Vec<WatchRule>,
    full: u32,
    meter: u32,
    previous: HashMap<(String, usize), BeanValue>,
}

impl WatchdogTask {
    pub fn new(period: Duration, rules: Vec<WatchRule>, health_meter_full: u32) -> Self {
        Self {
            period,
            rules,
            full: health_meter_full,
            meter: health_meter_full,
            previous: HashMap::new(),
        }
    }

    pub fn health_meter(&self) -> u32 {
        self.meter
    }

    fn evaluate(&mut self, ctx: &TaskContext) -> Vec<Breach> {
        let mut breaches = Vec::new();
        for (idx, rule) in self.rules.iter().enumerate() {
            for comp in ctx.components_named(&rule.component) {
                let value = match comp.get_single_bean_field(&rule.bean, &rule.field) {
                    Ok(value) => value,
                    Err(e) => {
                        log_warn!(ctx.dashlog, "Watchdog cannot read {}: {}", comp.name(), e);
                        continue;
                    }
                };

                let fired = match rule.comparison {
                    Comparison::Below(limit) => value.as_i64().is_some_and(|v| v < limit),
                    Comparison::Above(limit) => value.as_i64().is_some_and(|v| v > limit),
                    Comparison::Unchanged => {
                        let key = (comp.full_name(), idx);
                        let same = self.previous.get(&key) == Some(&value);
                        self.previous.insert(key, value.clone());
                        same
                    }
                };

                if fired {
                    breaches.push(Breach {
                        component: comp.full_name(),
                        bean: rule.bean.clone(),
                        field: rule.field.clone(),
                        comparison: rule.comparison.clone(),
                        value,
                    });
                }
            }
        }
        breaches
    }
}

impl CnCTask for WatchdogTask {
    fn name(&self) -> &'static str {
        NAME
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn check(&mut self, ctx: &TaskContext) -> TaskControl {
        let breaches = self.evaluate(ctx);

        if breaches.is_empty() {
            if self.meter < self.full {
                log_info!(ctx.dashlog, "Run is healthy again");
            }
            self.meter = self.full;
            return TaskControl::Continue;
        }

        let (stagnant, threshold): (Vec<&Breach>, Vec<&Breach>) = breaches
            .iter()
            .partition(|b| b.comparison == Comparison::Unchanged);
        for (kind, group) in [("stagnant", stagnant), ("threshold", threshold)] {
            if group.is_empty() {
                continue;
            }
            let lines: Vec<String> = group.iter().map(|b| format!("    {}", b)).collect();
            log_error!(
                ctx.dashlog,
                "Watchdog reports {} components:\n{}",
                kind,
                lines.join("\n")
            );
        }

        self.meter = self.meter.saturating_sub(1);
        if self.meter > 0 {
            log_error!(ctx.dashlog, "Run is unhealthy ({} checks left)", self.meter);
        } else {
            log_error!(ctx.dashlog, "Run is not healthy, operator attention required");
        }
        TaskControl::Continue
    }

    fn reset(&mut self) {
        self.meter = self.full;
        self.previous.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogLevel, Logger, MemoryLogger};
    use crate::testing::MockComponent;
    use std::sync::Arc;

    fn setup(sn_disk: i64) -> (Arc<MockComponent>, TaskContext, Arc<MemoryLogger>) {
        let eb = Arc::new(MockComponent::new("eventBuilder", 0));
        let sb = Arc::new(MockComponent::new("secondaryBuilders", 0));
        sb.set_bean_field("snBuilder", "DiskAvailable", BeanValue::Int(sn_disk));
        let dashlog = Arc::new(MemoryLogger::new());
        let ctx = TaskContext::new(
            vec![Arc::new(eb.proxy()), Arc::new(sb.proxy())],
            dashlog.clone() as Arc<dyn Logger>,
        );
        (sb, ctx, dashlog)
    }

    fn task() -> WatchdogTask {
        WatchdogTask::new(Duration::from_secs(10), WatchRule::default_roster(1024), 9)
    }

    #[test]
    fn test_breach_decrements_meter_by_one() {
        let (_sb, ctx, dashlog) = setup(0);
        let mut task = task();
        task.check(&ctx);

        assert_eq!(task.health_meter(), 8);
        assert_eq!(
            dashlog.messages_at(LogLevel::Error),
            vec![
                concat!(
                    "Watchdog reports threshold components:\n",
                    "    secondaryBuilders snBuilder.DiskAvailable below 1024 (value=0)"
                )
                .to_string(),
                "Run is unhealthy (8 checks left)".to_string(),
            ]
        );
    }

    #[test]
    fn test_healthy_check_refills_meter() {
        let (sb, ctx, dashlog) = setup(0);
        let mut task = task();
        task.check(&ctx);
        task.check(&ctx);
        assert_eq!(task.health_meter(), 7);

        sb.set_bean_field("snBuilder", "DiskAvailable", BeanValue::Int(4096));
        task.check(&ctx);
        assert_eq!(task.health_meter(), 9);
        assert!(dashlog.contains("Run is healthy again"));
    }

    #[test]
    fn test_meter_bottoms_out_without_underflow() {
        let (_sb, ctx, dashlog) = setup(0);
        let mut task =
            WatchdogTask::new(Duration::from_secs(10), WatchRule::default_roster(1024), 2);
        for _ in 0..4 {
            assert_eq!(task.check(&ctx), TaskControl::Continue);
        }
        assert_eq!(task.health_meter(), 0);
        assert!(dashlog.contains("Run is not healthy, operator attention required"));
    }

    #[test]
    fn test_unchanged_rule() {
        let eb = Arc::new(MockComponent::new("eventBuilder", 0));
        let dashlog = Arc::new(MemoryLogger::new());
        let ctx = TaskContext::new(vec![Arc::new(eb.proxy())], dashlog.clone() as Arc<dyn Logger>);
        let rules = vec![WatchRule::new(
            "eventBuilder",
            "backEnd",
            "NumEventsSent",
            Comparison::Unchanged,
        )];
        let mut task = WatchdogTask::new(Duration::from_secs(10), rules, 9);

        task.check(&ctx);
        assert_eq!(task.health_meter(), 9);
        task.check(&ctx);
        assert_eq!(task.health_meter(), 8);
        assert!(dashlog.contains(
            "Watchdog reports stagnant components:\n    \
             eventBuilder backEnd.NumEventsSent not changing (value=0)"
        ));

        eb.set_bean_field("backEnd", "NumEventsSent", BeanValue::Int(5));
        task.check(&ctx);
        assert_eq!(task.health_meter(), 9);
    }
}
