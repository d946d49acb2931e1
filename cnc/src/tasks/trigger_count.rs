//! Trigger rate aggregation, run on a supervised worker thread.

use super::task::{CnCTask, TaskContext, TaskControl};
use super::worker::{SupervisedWorker, WorkerPoll};
use crate::component::ComponentProxy;
use crate::log::Logger;
use crate::log_error;
use crate::moni::{MoniSink, Priority};
use crate::value::BeanValue;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const NAME: &str = "TriggerCount";

/// Aggregation key: `(sourceid, configid, trigid, runNumber)`.
type BinKey = (i64, i64, i64, i64);

/// Counts summed across all recording bins of one trigger.
#[derive(Debug, Clone, PartialEq)]
struct BinTotal {
    start: Option<i64>,
    end: Option<i64>,
    value: i64,
}

impl BinTotal {
    fn add(&mut self, start: Option<i64>, end: Option<i64>, value: i64) {
        if let Some(s) = start {
            self.start = Some(self.start.map_or(s, |cur| cur.min(s)));
        }
        if let Some(e) = end {
            self.end = Some(self.end.map_or(e, |cur| cur.max(e)));
        }
        self.value += value;
    }

    fn moni_value(&self, key: &BinKey) -> BeanValue {
        let time = |t: Option<i64>| t.map_or(BeanValue::Null, BeanValue::Int);
        BeanValue::map([
            ("sourceid", BeanValue::Int(key.0)),
            ("configid", BeanValue::Int(key.1)),
            ("trigid", BeanValue::Int(key.2)),
            ("runNumber", BeanValue::Int(key.3)),
            ("recordingStartTime", time(self.start)),
            ("recordingEndTime", time(self.end)),
            ("value", BeanValue::Int(self.value)),
        ])
    }
}

/// Sums per-bin counts by trigger identity.
fn aggregate(counts: &BeanValue) -> BTreeMap<BinKey, BinTotal> {
    let mut totals: BTreeMap<BinKey, BinTotal> = BTreeMap::new();
    for entry in counts.as_list().unwrap_or_default() {
        let Some(bin) = entry.as_map() else {
            continue;
        };
        let int = |name: &str| bin.get(name).and_then(BeanValue::as_i64);
        let key = (
            int("sourceid").unwrap_or(-1),
            int("configid").unwrap_or(-1),
            int("trigid").unwrap_or(-1),
            int("runNumber").unwrap_or(-1),
        );
        totals
            .entry(key)
            .or_insert(BinTotal {
                start: None,
                end: None,
                value: 0,
            })
            .add(
                int("recordingStartTime"),
                int("recordingEndTime"),
                int("value").unwrap_or(0),
            );
    }
    totals
}

fn report(
    triggers: &[Arc<ComponentProxy>],
    dashlog: &dyn Logger,
    sink: &dyn MoniSink,
    cancel: &CancellationToken,
) {
    for comp in triggers {
        let counts = match comp.get_moni_counts() {
            Ok(counts) => counts,
            Err(e) => {
                log_error!(
                    dashlog,
                    "Cannot get TriggerCountTask bean data from {}: {}",
                    comp.name(),
                    e
                );
                continue;
            }
        };
        if cancel.is_cancelled() {
            return;
        }
        for (key, total) in aggregate(&counts) {
            sink.send_moni("trigger_rate", total.moni_value(&key), Priority::Email);
        }
    }
}

pub struct TriggerCountTask {
    period: Duration,
    worker: SupervisedWorker,
}

impl TriggerCountTask {
    pub fn new(period: Duration, max_hangs: u32) -> Self {
        Self {
            period,
            worker: SupervisedWorker::new(NAME, max_hangs),
        }
    }
}

impl CnCTask for TriggerCountTask {
    fn name(&self) -> &'static str {
        NAME
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn check(&mut self, ctx: &TaskContext) -> TaskControl {
        let Some(sink) = ctx.moni.clone() else {
            return TaskControl::Disable;
        };
        let triggers: Vec<Arc<ComponentProxy>> = ctx
            .components
            .iter()
            .filter(|c| c.name().name().to_lowercase().starts_with("globaltrigger"))
            .cloned()
            .collect();
        let dashlog = Arc::clone(&ctx.dashlog);

        let poll = self.worker.poll(ctx.dashlog.as_ref(), move |cancel| {
            report(&triggers, dashlog.as_ref(), sink.as_ref(), &cancel);
        });
        match poll {
            WorkerPoll::Disabled | WorkerPoll::Inactive => TaskControl::Disable,
            _ => TaskControl::Continue,
        }
    }

    fn reset(&mut self) {
        self.worker.reset();
    }

    fn close(&mut self) {
        self.worker.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryLogger;
    use crate::moni::MoniTarget;
    use crate::testing::{MockComponent, RecordingMoniSink};

    fn bin(trigid: i64, start: i64, end: i64, value: i64) -> BeanValue {
        BeanValue::map([
            ("sourceid", BeanValue::Int(6000)),
            ("configid", BeanValue::Int(2)),
            ("trigid", BeanValue::Int(trigid)),
            ("runNumber", BeanValue::Int(123)),
            ("recordingStartTime", BeanValue::Int(start)),
            ("recordingEndTime", BeanValue::Int(end)),
            ("value", BeanValue::Int(value)),
        ])
    }

    #[test]
    fn test_aggregate_by_trigger() {
        let counts = BeanValue::List(vec![bin(1, 10, 20, 5), bin(1, 20, 30, 7), bin(2, 5, 15, 1)]);
        let totals = aggregate(&counts);
        assert_eq!(totals.len(), 2);
        let first = &totals[&(6000, 2, 1, 123)];
        assert_eq!((first.start, first.end, first.value), (Some(10), Some(30), 12));
    }

    fn wait_for<F: Fn() -> bool>(cond: F) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("condition never met");
    }

    #[test]
    fn test_check_sends_trigger_rates() {
        let gt = Arc::new(MockComponent::new("globalTrigger", 0));
        gt.set_moni_counts(BeanValue::List(vec![bin(1, 10, 20, 5), bin(1, 20, 30, 7)]));
        let sink = Arc::new(RecordingMoniSink::new());
        let ctx = TaskContext::new(vec![Arc::new(gt.proxy())], Arc::new(MemoryLogger::new()))
            .with_moni(sink.clone() as Arc<dyn MoniSink>, MoniTarget::Live);

        let mut task = TriggerCountTask::new(Duration::from_secs(600), 3);
        assert_eq!(task.check(&ctx), TaskControl::Continue);
        wait_for(|| sink.contains("trigger_rate"));

        let rec = sink.last("trigger_rate").unwrap();
        assert_eq!(rec.priority, Priority::Email);
        assert_eq!(rec.value.as_map().unwrap()["value"], BeanValue::Int(12));
    }

    #[test]
    fn test_hanging_worker_disables_task() {
        let gt = Arc::new(MockComponent::new("globalTrigger", 0));
        gt.set_delay("getMoniCounts", Duration::from_millis(500));
        let sink = Arc::new(RecordingMoniSink::new());
        let dashlog = Arc::new(MemoryLogger::new());
        let ctx = TaskContext::new(vec![Arc::new(gt.proxy())], dashlog.clone() as Arc<dyn Logger>)
            .with_moni(sink.clone() as Arc<dyn MoniSink>, MoniTarget::Live);

        let mut task = TriggerCountTask::new(Duration::from_secs(600), 3);
        assert_eq!(task.check(&ctx), TaskControl::Continue);
        for _ in 0..3 {
            assert_eq!(task.check(&ctx), TaskControl::Continue);
        }
        assert_eq!(task.check(&ctx), TaskControl::Disable);
        assert!(dashlog.contains(
            "TriggerCount monitoring seems to be stuck, monitoring will not be done"
        ));
        assert_eq!(gt.calls("getMoniCounts"), 1);
    }
}
