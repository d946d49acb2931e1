//! Active DOM counts and hit rates across hubs.

use super::task::{CnCTask, TaskContext, TaskControl};
use crate::log_warn;
use crate::moni::Priority;
use crate::value::BeanValue;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};

pub const NAME: &str = "ActiveDOMs";

const FIELDS: [&str; 4] = [
    "NumberOfActiveAndTotalChannels",
    "TotalLBMOverflows",
    "HitRate",
    "HitRateLC",
];

/// Totals for one check.
#[derive(Debug, Default, Clone, PartialEq)]
struct DomTotals {
    active: i64,
    total: i64,
    hit_rate: f64,
    hit_rate_lc: f64,
    overflows: BTreeMap<String, BeanValue>,
    per_string: BTreeMap<String, BeanValue>,
}

/// Sums hub DOM statistics every period; sends per-string detail on a
/// longer period.
pub struct ActiveDomsTask {
    period: Duration,
    detail_period: Duration,
    last_detail: Option<Instant>,
}

impl ActiveDomsTask {
    pub fn new(period: Duration, detail_period: Duration) -> Self {
        Self {
            period,
            detail_period,
            last_detail: None,
        }
    }

    fn gather(ctx: &TaskContext) -> DomTotals {
        let fields: Vec<String> = FIELDS.iter().map(|f| f.to_string()).collect();
        let mut totals = DomTotals::default();

        for hub in ctx.hubs() {
            let values = match hub.get_multi_bean_fields("stringhub", &fields) {
                Ok(values) => values,
                Err(e) => {
                    log_warn!(ctx.dashlog, "Cannot get {} DOM data: {}", hub.name(), e);
                    continue;
                }
            };
            let string = hub.name().num().to_string();

            if let Some(channels) = values.get("NumberOfActiveAndTotalChannels") {
                let active = channels.int_at(0).unwrap_or(0);
                let total = channels.int_at(1).unwrap_or(0);
                totals.active += active;
                totals.total += total;
                totals.per_string.insert(
                    string.clone(),
                    BeanValue::List(vec![BeanValue::Int(active), BeanValue::Int(total)]),
                );
            }
            if let Some(overflows) = values.get("TotalLBMOverflows").and_then(BeanValue::as_i64) {
                totals.overflows.insert(string, BeanValue::Int(overflows));
            }
            totals.hit_rate += values.get("HitRate").and_then(BeanValue::as_f64).unwrap_or(0.0);
            totals.hit_rate_lc += values
                .get("HitRateLC")
                .and_then(BeanValue::as_f64)
                .unwrap_or(0.0);
        }
        totals
    }

    fn detail_due(&self, now: Instant) -> bool {
        self.last_detail
            .map_or(true, |last| now.duration_since(last) >= self.detail_period)
    }
}

impl CnCTask for ActiveDomsTask {
    fn name(&self) -> &'static str {
        NAME
    }

    fn period(&self) -> Duration {
        self.period
    }

    fn check(&mut self, ctx: &TaskContext) -> TaskControl {
        let totals = Self::gather(ctx);

        ctx.send_moni("activeDOMs", BeanValue::Int(totals.active), Priority::Its);
        ctx.send_moni("expectedDOMs", BeanValue::Int(totals.total), Priority::Its);
        ctx.send_moni("total_rate", BeanValue::Float(totals.hit_rate), Priority::Its);
        ctx.send_moni("total_ratelc", BeanValue::Float(totals.hit_rate_lc), Priority::Its);

        let now = Instant::now();
        if self.detail_due(now) {
            self.last_detail = Some(now);
            ctx.send_moni("LBMOverflows", BeanValue::Map(totals.overflows), Priority::Its);
            ctx.send_moni("stringDOMsInfo", BeanValue::Map(totals.per_string), Priority::Email);
        }
        TaskControl::Continue
    }

    fn reset(&mut self) {
        self.last_detail = None;
    }
}
