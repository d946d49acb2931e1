//! Event and record counters for a run.

use crate::component::{BeanError, ComponentProxy};
use crate::time::elapsed_seconds;
use crate::value::BeanValue;
use serde::Serialize;
use std::sync::Arc;

/// Counters gathered from the event builder and the secondary builders.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStats {
    pub num_events: i64,
    pub first_time: Option<i64>,
    pub last_time: Option<i64>,
    pub first_good_time: Option<i64>,
    pub last_good_time: Option<i64>,
    pub num_moni: i64,
    pub num_sn: i64,
    pub num_tcal: i64,
}

const SECONDARY_STREAMS: [&str; 3] = ["tcalBuilder", "snBuilder", "moniBuilder"];

impl RunStats {
    /// Seconds between the first and last physics event.
    pub fn duration(&self) -> Option<f64> {
        elapsed_seconds(self.first_time?, self.last_time?)
    }

    /// Physics event rate in Hz, if the run has a non-zero duration.
    pub fn rate(&self) -> Option<f64> {
        self.duration().map(|secs| self.num_events as f64 / secs)
    }

    /// Rate formatted with two decimals, or empty if unknown.
    pub fn rate_string(&self) -> String {
        self.rate().map(|r| format!("{:.2}", r)).unwrap_or_default()
    }

    /// One-line progress report written to the run log on every rate check.
    pub fn progress_line(&self) -> String {
        let events = match self.rate() {
            Some(rate) => format!("{} physics events ({:.2} Hz)", self.num_events, rate),
            None => format!("{} physics events", self.num_events),
        };
        format!(
            "\t{}, {} moni events, {} SN events, {} tcals",
            events, self.num_moni, self.num_sn, self.num_tcal
        )
    }

    /// Reads the counters from the builders' MBeans.
    ///
    /// Components other than `eventBuilder` and `secondaryBuilders` are
    /// ignored; a runset lacking either simply reports zeros for it.
    pub fn collect(components: &[Arc<ComponentProxy>]) -> Result<Self, BeanError> {
        let mut stats = RunStats::default();
        for comp in components {
            let name = comp.name();
            if name.is("eventBuilder", Some(0)) {
                let event_data = comp.get_single_bean_field("backEnd", "EventData")?;
                stats.num_events = event_data.int_at(0).unwrap_or(0);
                stats.last_time = event_data.int_at(1).filter(|t| *t > 0);
                stats.first_time = comp
                    .get_single_bean_field("backEnd", "FirstEventTime")?
                    .as_i64()
                    .filter(|t| *t > 0);
            } else if name.is("secondaryBuilders", Some(0)) {
                for bldr in SECONDARY_STREAMS {
                    let count = comp
                        .get_single_bean_field(bldr, "NumDispatchedData")?
                        .as_i64()
                        .unwrap_or(0);
                    stats.set_secondary(bldr, count);
                }
            }
        }
        Ok(stats)
    }

    /// Takes the counters from a fresh [`RunStats::collect`] result while
    /// keeping the good times recorded when the run started and stopped.
    pub fn refresh_counters(&mut self, fresh: RunStats) {
        *self = RunStats {
            first_good_time: self.first_good_time,
            last_good_time: self.last_good_time,
            ..fresh
        };
    }

    /// Fills event-builder fields from a `getRunData` answer
    /// `(events, first, last, first good, last good)`.
    pub fn apply_event_builder_data(&mut self, data: &BeanValue) {
        if let Some(events) = data.int_at(0) {
            self.num_events = events;
        }
        self.first_time = data.int_at(1).filter(|t| *t > 0).or(self.first_time);
        self.last_time = data.int_at(2).filter(|t| *t > 0).or(self.last_time);
        self.first_good_time = data.int_at(3).filter(|t| *t > 0).or(self.first_good_time);
        self.last_good_time = data.int_at(4).filter(|t| *t > 0).or(self.last_good_time);
    }

    /// Fills secondary-stream counts from a `getRunData` answer
    /// `(tcals, SN, moni)`.
    pub fn apply_secondary_data(&mut self, data: &BeanValue) {
        for (idx, bldr) in SECONDARY_STREAMS.iter().enumerate() {
            if let Some(count) = data.int_at(idx) {
                self.set_secondary(bldr, count);
            }
        }
    }

    fn set_secondary(&mut self, builder: &str, count: i64) {
        match builder {
            "tcalBuilder" => self.num_tcal = count,
            "snBuilder" => self.num_sn = count,
            _ => self.num_moni = count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockComponent;

    #[test]
    fn test_rate_from_dom_ticks() {
        let stats = RunStats {
            num_events: 1000,
            first_time: Some(1),
            last_time: Some(50_000_000_001),
            ..RunStats::default()
        };
        assert_eq!(stats.duration(), Some(5.0));
        assert_eq!(stats.rate(), Some(200.0));
        assert_eq!(stats.rate_string(), "200.00");
        assert_eq!(
            stats.progress_line(),
            "\t1000 physics events (200.00 Hz), 0 moni events, 0 SN events, 0 tcals"
        );
    }

    #[test]
    fn test_zero_duration_has_no_rate() {
        let stats = RunStats {
            num_events: 17,
            first_time: Some(500),
            last_time: Some(500),
            ..RunStats::default()
        };
        assert_eq!(stats.rate(), None);
        assert_eq!(stats.rate_string(), "");
        assert!(stats.progress_line().starts_with("\t17 physics events, "));
    }

    #[test]
    fn test_collect_from_builders() {
        let eb = Arc::new(MockComponent::new("eventBuilder", 0));
        eb.set_bean_field("backEnd", "EventData", BeanValue::from(vec![1000, 50_000_000_001_i64]));
        eb.set_bean_field("backEnd", "FirstEventTime", BeanValue::from("1L"));
        let sb = Arc::new(MockComponent::new("secondaryBuilders", 0));
        sb.set_bean_field("snBuilder", "NumDispatchedData", BeanValue::Int(7));
        sb.set_bean_field("tcalBuilder", "NumDispatchedData", BeanValue::Int(3));

        let comps = vec![Arc::new(eb.proxy()), Arc::new(sb.proxy())];
        let stats = RunStats::collect(&comps).unwrap();
        assert_eq!(stats.num_events, 1000);
        assert_eq!(stats.rate(), Some(200.0));
        assert_eq!(stats.num_sn, 7);
        assert_eq!(stats.num_tcal, 3);
        assert_eq!(stats.num_moni, 0);
    }

    #[test]
    fn test_refresh_keeps_good_times() {
        let mut stats = RunStats {
            num_events: 3,
            first_good_time: Some(2_000_000_000),
            ..RunStats::default()
        };
        stats.refresh_counters(RunStats {
            num_events: 1000,
            first_time: Some(1),
            num_sn: 4,
            ..RunStats::default()
        });
        assert_eq!(stats.num_events, 1000);
        assert_eq!(stats.first_time, Some(1));
        assert_eq!(stats.num_sn, 4);
        assert_eq!(stats.first_good_time, Some(2_000_000_000));
        assert_eq!(stats.last_good_time, None);
    }

    #[test]
    fn test_apply_run_data() {
        let mut stats = RunStats::default();
        stats.apply_event_builder_data(&BeanValue::from(vec![10_i64, 1, 20_000_000_001, 5, 6]));
        stats.apply_secondary_data(&BeanValue::from(vec![1, 2, 3]));
        assert_eq!(stats.num_events, 10);
        assert_eq!(stats.duration(), Some(2.0));
        assert_eq!(stats.first_good_time, Some(5));
        assert_eq!((stats.num_tcal, stats.num_sn, stats.num_moni), (1, 2, 3));
    }
}
