//! Hit-rate sampling of radar sentinel DOMs on a supervised worker thread.

use super::settings::RadarDomSpec;
use super::task::{CnCTask, TaskContext, TaskControl};
use super::worker::{SupervisedWorker, WorkerPoll};
use crate::component::ComponentProxy;
use crate::log::Logger;
use crate::moni::{MoniSink, Priority};
use crate::value::BeanValue;
use crate::{log_error, log_warn};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

pub const NAME: &str = "Radar";

const DOM_BEAN_PREFIX: &str = "DataCollectorMonitor";

/// A sentinel DOM located on a specific hub bean.
#[derive(Clone)]
struct RadarDom {
    mbid: String,
    hub: Arc<ComponentProxy>,
    bean: String,
}

impl RadarDom {
    fn rate(&self) -> Option<f64> {
        self.hub
            .get_single_bean_field(&self.bean, "HitRate")
            .ok()
            .and_then(|v| v.as_f64())
    }
}

/// Sampling parameters shared with each worker generation.
#[derive(Clone)]
struct Sampling {
    samples: u32,
    duration: Duration,
}

/// Finds the hub bean reporting each configured mainboard ID.
fn find_doms(components: &[Arc<ComponentProxy>], specs: &[RadarDomSpec]) -> Vec<RadarDom> {
    let mut found = Vec::new();
    for spec in specs {
        let hubs = components
            .iter()
            .filter(|c| c.name().name() == "stringHub" && c.name().num() % 1000 == spec.string);
        'hubs: for hub in hubs {
            let Ok(beans) = hub.bean_names() else {
                continue;
            };
            for bean in beans.iter().filter(|b| b.starts_with(DOM_BEAN_PREFIX)) {
                let mbid = hub
                    .get_single_bean_field(bean, "MainboardId")
                    .ok()
                    .map(|v| v.to_string().to_lowercase());
                if mbid.as_deref() == Some(spec.mbid.as_str()) {
                    found.push(RadarDom {
                        mbid: spec.mbid.clone(),
                        hub: Arc::clone(hub),
                        bean: bean.clone(),
                    });
                    break 'hubs;
                }
            }
        }
    }
    found
}

/// Sleeps up to `total`, waking early if cancelled.
fn pause(total: Duration, cancel: &CancellationToken) {
    let deadline = Instant::now() + total;
    while !cancel.is_cancelled() {
        let left = deadline.saturating_duration_since(Instant::now());
        if left.is_zero() {
            return;
        }
        std::thread::sleep(left.min(Duration::from_millis(50)));
    }
}

fn sample(
    doms: &[RadarDom],
    sampling: &Sampling,
    dashlog: &dyn Logger,
    sink: &dyn MoniSink,
    cancel: &CancellationToken,
) {
    let mut max_rates: BTreeMap<&str, f64> = BTreeMap::new();
    let gap = sampling.duration / sampling.samples.max(1);
    for _ in 0..sampling.samples {
        for dom in doms {
            if let Some(rate) = dom.rate() {
                let best = max_rates.entry(dom.mbid.as_str()).or_insert(rate);
                if rate > *best {
                    *best = rate;
                }
            }
        }
        pause(gap, cancel);
        if cancel.is_cancelled() {
            return;
        }
    }

    let report: Vec<BeanValue> = max_rates
        .into_iter()
        .map(|(mbid, rate)| BeanValue::List(vec![BeanValue::from(mbid), BeanValue::Float(rate)]))
        .collect();
    if !sink.send_moni("radarDOMs", BeanValue::List(report), Priority::Email) {
        log_error!(dashlog, "Failed to send radar DOM report");
    }
}

pub struct RadarTask {
    period: Duration,
    specs: Vec<RadarDomSpec>,
    sampling: Sampling,
    doms: Arc<Mutex<Option<Vec<RadarDom>>>>,
    worker: SupervisedWorker,
}

impl RadarTask {
    pub fn new(
        period: Duration,
        specs: Vec<RadarDomSpec>,
        samples: u32,
        duration: Duration,
        max_hangs: u32,
    ) -> Self {
        Self {
            period,
            specs,
            sampling: Sampling { samples, duration },
            doms: Arc::new(Mutex::new(None)),
            worker: SupervisedWorker::new(NAME, max_hangs),
        }
    }
}

impl CnCTask for RadarTask {
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
        let components = ctx.components.clone();
        let specs = self.specs.clone();
        let sampling = self.sampling.clone();
        let cache = Arc::clone(&self.doms);
        let dashlog = Arc::clone(&ctx.dashlog);

        let poll = self.worker.poll(ctx.dashlog.as_ref(), move |cancel| {
            let doms = {
                let mut cached = cache.lock();
                cached
                    .get_or_insert_with(|| find_doms(&components, &specs))
                    .clone()
            };
            if doms.is_empty() {
                log_warn!(dashlog, "No radar DOMs found");
                return;
            }
            sample(&doms, &sampling, dashlog.as_ref(), sink.as_ref(), &cancel);
        });
        match poll {
            WorkerPoll::Disabled | WorkerPoll::Inactive => TaskControl::Disable,
            _ => TaskControl::Continue,
        }
    }

    fn reset(&mut self) {
        *self.doms.lock() = None;
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

    fn radar_hub() -> Arc<MockComponent> {
        let hub = Arc::new(MockComponent::new("stringHub", 6));
        hub.set_bean_field(
            "DataCollectorMonitor-00A",
            "MainboardId",
            BeanValue::from("48e492170268"),
        );
        hub.set_bean_field("DataCollectorMonitor-00A", "HitRate", BeanValue::Float(12.34));
        hub
    }

    #[test]
    fn test_find_doms_matches_string_and_mbid() {
        let hub = radar_hub();
        let other = Arc::new(MockComponent::new("stringHub", 1));
        let comps = vec![Arc::new(other.proxy()), Arc::new(hub.proxy())];

        let doms = find_doms(&comps, &[RadarDomSpec::new("48e492170268", 6)]);
        assert_eq!(doms.len(), 1);
        assert_eq!(doms[0].bean, "DataCollectorMonitor-00A");
        assert_eq!(doms[0].hub.name().num(), 6);

        assert!(find_doms(&comps, &[RadarDomSpec::new("48e492170268", 1)]).is_empty());
    }

    #[test]
    fn test_radar_report() {
        let hub = radar_hub();
        let sink = Arc::new(RecordingMoniSink::new());
        let ctx = TaskContext::new(vec![Arc::new(hub.proxy())], Arc::new(MemoryLogger::new()))
            .with_moni(sink.clone() as Arc<dyn MoniSink>, MoniTarget::Live);

        let mut task = RadarTask::new(
            Duration::from_secs(900),
            vec![RadarDomSpec::new("48e492170268", 6)],
            2,
            Duration::from_millis(20),
            3,
        );
        assert_eq!(task.check(&ctx), TaskControl::Continue);

        for _ in 0..200 {
            if sink.contains("radarDOMs") {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        let rec = sink.last("radarDOMs").unwrap();
        assert_eq!(rec.priority, Priority::Email);
        assert_eq!(
            rec.value,
            BeanValue::List(vec![BeanValue::List(vec![
                BeanValue::from("48e492170268"),
                BeanValue::Float(12.34)
            ])])
        );
    }

    #[test]
    fn test_sampling_stops_when_cancelled() {
        let hub = radar_hub();
        let doms = find_doms(&[Arc::new(hub.proxy())], &[RadarDomSpec::new("48e492170268", 6)]);
        let sink = RecordingMoniSink::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let sampling = Sampling {
            samples: 4,
            duration: Duration::from_secs(60),
        };
        let start = Instant::now();
        sample(&doms, &sampling, &MemoryLogger::new(), &sink, &cancel);
        assert!(start.elapsed() < Duration::from_secs(1));
        assert!(sink.records().is_empty());
    }
}
