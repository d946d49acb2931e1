//! Plain-struct test doubles for the component, monitoring and process
//! manager boundaries.
//!
//! These implement the same traits as production transports so runsets,
//! tasks and the control server can be exercised without a cluster.

use crate::component::{
    ComponentName, ComponentProxy, ComponentRpc, ComponentSummary, Connection, Connector,
    MBeanRpc, RpcError, RpcResult,
};
use crate::moni::{MoniSink, Priority};
use crate::server::{RemoteError, RemoteProcessManager};
use crate::value::BeanValue;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

static NEXT_PORT: AtomicU16 = AtomicU16::new(9000);

type Beans = BTreeMap<String, BTreeMap<String, BeanValue>>;

/// How a mock reacts to `stopRun`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopBehavior {
    /// Goes to ready.
    #[default]
    Normal,
    /// Stays running until `forcedStop`.
    NeedsForce,
    /// Stays running even after `forcedStop`.
    Stuck,
}

#[derive(Default)]
struct MockInner {
    state: String,
    unreachable: bool,
    failing: HashSet<String>,
    delays: HashMap<String, Duration>,
    calls: HashMap<String, usize>,
    beans: Beans,
    stop: StopBehavior,
    run_number: Option<u32>,
    connections: Vec<Connection>,
    first_good_time: Option<BeanValue>,
    last_good_time: Option<BeanValue>,
    moni_counts: BeanValue,
    subruns: Vec<i32>,
}

/// Scriptable in-process component.
pub struct MockComponent {
    name: ComponentName,
    host: String,
    port: u16,
    connectors: Vec<Connector>,
    inner: Mutex<MockInner>,
}

impl MockComponent {
    pub fn new(name: &str, num: u32) -> Self {
        let name = ComponentName::new(name, num);
        let beans = standard_beans(name.name());
        Self {
            name,
            host: "localhost".to_string(),
            port: NEXT_PORT.fetch_add(2, Ordering::Relaxed),
            connectors: Vec::new(),
            inner: Mutex::new(MockInner {
                state: "idle".to_string(),
                beans,
                ..MockInner::default()
            }),
        }
    }

    pub fn with_connectors(mut self, connectors: Vec<Connector>) -> Self {
        self.connectors = connectors;
        self
    }

    pub fn with_host(mut self, host: &str) -> Self {
        self.host = host.to_string();
        self
    }

    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    /// Builds a proxy backed by this mock for both surfaces.
    pub fn proxy(self: &Arc<Self>) -> ComponentProxy {
        ComponentProxy::new(self.name.clone(), self.clone())
            .with_address(self.host.clone(), self.port)
            .with_mbean(self.port + 1, self.clone())
            .with_connectors(self.connectors.clone())
    }

    pub fn state(&self) -> String {
        self.inner.lock().state.clone()
    }

    pub fn set_state(&self, state: &str) {
        self.inner.lock().state = state.to_string();
    }

    /// Every call fails with "connection refused" while set.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.lock().unreachable = unreachable;
    }

    /// Makes `method` (wire name, e.g. `startRun`) return a fault.
    pub fn fail_method(&self, method: &str) {
        self.inner.lock().failing.insert(method.to_string());
    }

    pub fn clear_failures(&self) {
        self.inner.lock().failing.clear();
    }

    /// Blocks `method` for `delay` before answering.
    pub fn set_delay(&self, method: &str, delay: Duration) {
        self.inner.lock().delays.insert(method.to_string(), delay);
    }

    pub fn set_stop_behavior(&self, stop: StopBehavior) {
        self.inner.lock().stop = stop;
    }

    /// Number of times `method` was invoked.
    pub fn calls(&self, method: &str) -> usize {
        self.inner.lock().calls.get(method).copied().unwrap_or(0)
    }

    pub fn set_bean_field(&self, bean: &str, field: &str, value: BeanValue) {
        self.inner
            .lock()
            .beans
            .entry(bean.to_string())
            .or_default()
            .insert(field.to_string(), value);
    }

    pub fn bean_field(&self, bean: &str, field: &str) -> Option<BeanValue> {
        self.inner
            .lock()
            .beans
            .get(bean)
            .and_then(|fields| fields.get(field))
            .cloned()
    }

    pub fn set_moni_counts(&self, counts: BeanValue) {
        self.inner.lock().moni_counts = counts;
    }

    pub fn run_number(&self) -> Option<u32> {
        self.inner.lock().run_number
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.inner.lock().connections.clone()
    }

    pub fn first_good_time(&self) -> Option<BeanValue> {
        self.inner.lock().first_good_time.clone()
    }

    pub fn last_good_time(&self) -> Option<BeanValue> {
        self.inner.lock().last_good_time.clone()
    }

    pub fn subruns(&self) -> Vec<i32> {
        self.inner.lock().subruns.clone()
    }

    fn enter(&self, method: &str) -> RpcResult<()> {
        let (delay, unreachable, failing) = {
            let mut inner = self.inner.lock();
            *inner.calls.entry(method.to_string()).or_default() += 1;
            (
                inner.delays.get(method).copied(),
                inner.unreachable,
                inner.failing.contains(method),
            )
        };
        if let Some(delay) = delay {
            std::thread::sleep(delay);
        }
        if unreachable {
            return Err(RpcError::ConnectionRefused(format!(
                "{}:{}",
                self.host, self.port
            )));
        }
        if failing {
            return Err(RpcError::fault(format!("{} failed", method)));
        }
        Ok(())
    }

    fn transition(&self, method: &str, state: &str) -> RpcResult<BeanValue> {
        self.enter(method)?;
        self.set_state(state);
        Ok(BeanValue::from(state))
    }

    fn bean_int(&self, bean: &str, field: &str) -> Option<i64> {
        self.bean_field(bean, field).and_then(|v| v.as_i64())
    }
}

impl ComponentRpc for MockComponent {
    fn configure(&self, _config_name: Option<&str>) -> RpcResult<BeanValue> {
        self.transition("configure", "ready")
    }

    fn connect(&self, connections: &[Connection]) -> RpcResult<BeanValue> {
        self.enter("connect")?;
        let mut inner = self.inner.lock();
        inner.connections = connections.to_vec();
        inner.state = "connected".to_string();
        Ok(BeanValue::from("connected"))
    }

    fn start_run(&self, run_num: u32) -> RpcResult<BeanValue> {
        self.enter("startRun")?;
        let mut inner = self.inner.lock();
        inner.run_number = Some(run_num);
        inner.state = "running".to_string();
        Ok(BeanValue::from("running"))
    }

    fn stop_run(&self) -> RpcResult<BeanValue> {
        self.enter("stopRun")?;
        let mut inner = self.inner.lock();
        if inner.stop == StopBehavior::Normal {
            inner.state = "ready".to_string();
        }
        Ok(BeanValue::from(inner.state.as_str()))
    }

    fn forced_stop(&self) -> RpcResult<BeanValue> {
        self.enter("forcedStop")?;
        let mut inner = self.inner.lock();
        if inner.stop != StopBehavior::Stuck {
            inner.state = "ready".to_string();
        }
        Ok(BeanValue::from(inner.state.as_str()))
    }

    fn reset(&self) -> RpcResult<BeanValue> {
        self.transition("reset", "idle")
    }

    fn get_state(&self) -> RpcResult<String> {
        self.enter("getState")?;
        Ok(self.state())
    }

    /// Event builders answer `(events, first, last, first good, last
    /// good)`; secondary builders answer `(tcals, SN, moni)`.
    fn get_run_data(&self, _run_num: u32) -> RpcResult<BeanValue> {
        self.enter("getRunData")?;
        if self.name.num() != 0 {
            return Ok(BeanValue::Null);
        }
        if self.name.name().starts_with("event") {
            let event_data = self.bean_field("backEnd", "EventData");
            let good = self.bean_field("backEnd", "GoodTimes");
            let pick = |v: &Option<BeanValue>, i| v.as_ref().and_then(|v| v.int_at(i));
            let values = [
                pick(&event_data, 0),
                self.bean_int("backEnd", "FirstEventTime"),
                pick(&event_data, 1),
                pick(&good, 0),
                pick(&good, 1),
            ];
            return Ok(BeanValue::List(
                values
                    .iter()
                    .map(|v| v.map_or(BeanValue::Null, BeanValue::decorated))
                    .collect(),
            ));
        }
        if self.name.name().starts_with("secondary") {
            let values: Vec<BeanValue> = ["tcalBuilder", "snBuilder", "moniBuilder"]
                .iter()
                .map(|b| {
                    self.bean_int(b, "NumDispatchedData")
                        .map_or(BeanValue::Null, BeanValue::decorated)
                })
                .collect();
            return Ok(BeanValue::List(values));
        }
        Ok(BeanValue::Null)
    }

    fn terminate(&self) -> RpcResult<BeanValue> {
        self.transition("terminate", "destroyed")
    }

    fn reset_logging(&self) -> RpcResult<BeanValue> {
        self.enter("resetLogging")?;
        Ok(BeanValue::Bool(true))
    }

    fn log_to(&self, _: &str, _: u16, _: &str, _: u16) -> RpcResult<BeanValue> {
        self.enter("logTo")?;
        Ok(BeanValue::Bool(true))
    }

    fn prepare_subrun(&self, subrun: i32) -> RpcResult<BeanValue> {
        self.enter("prepareSubrun")?;
        Ok(BeanValue::from(subrun))
    }

    fn start_subrun(&self, _data: &BeanValue) -> RpcResult<BeanValue> {
        self.enter("startSubrun")?;
        let latest = self.bean_int("stringhub", "LatestFirstChannelHitTime");
        Ok(latest.map_or(BeanValue::Null, BeanValue::decorated))
    }

    fn commit_subrun(&self, subrun: i32, _latest_time: &BeanValue) -> RpcResult<BeanValue> {
        self.enter("commitSubrun")?;
        self.inner.lock().subruns.push(subrun);
        Ok(BeanValue::from(subrun))
    }

    fn switch_to_new_run(&self, run_num: u32) -> RpcResult<BeanValue> {
        self.enter("switchToNewRun")?;
        self.inner.lock().run_number = Some(run_num);
        Ok(BeanValue::from(run_num))
    }

    fn set_first_good_time(&self, time: &BeanValue) -> RpcResult<BeanValue> {
        self.enter("setFirstGoodTime")?;
        self.inner.lock().first_good_time = Some(time.clone());
        Ok(BeanValue::Bool(true))
    }

    fn set_last_good_time(&self, time: &BeanValue) -> RpcResult<BeanValue> {
        self.enter("setLastGoodTime")?;
        self.inner.lock().last_good_time = Some(time.clone());
        Ok(BeanValue::Bool(true))
    }

    fn get_events(&self, _subrun: i32) -> RpcResult<BeanValue> {
        self.enter("getEvents")?;
        Ok(self
            .bean_field("backEnd", "NumEventsSent")
            .unwrap_or(BeanValue::Int(0)))
    }

    fn list_connector_states(&self) -> RpcResult<BeanValue> {
        self.enter("listConnectorStates")?;
        let state = self.state();
        Ok(BeanValue::List(
            self.connectors
                .iter()
                .map(|c| {
                    BeanValue::map([
                        ("type", BeanValue::from(c.name())),
                        ("state", BeanValue::from(state.as_str())),
                    ])
                })
                .collect(),
        ))
    }

    fn get_moni_counts(&self) -> RpcResult<BeanValue> {
        self.enter("getMoniCounts")?;
        Ok(self.inner.lock().moni_counts.clone())
    }
}

impl MBeanRpc for MockComponent {
    fn list_mbeans(&self) -> RpcResult<Vec<String>> {
        self.enter("listMBeans")?;
        Ok(self.inner.lock().beans.keys().cloned().collect())
    }

    fn list_getters(&self, bean: &str) -> RpcResult<Vec<String>> {
        self.enter("listGetters")?;
        let inner = self.inner.lock();
        inner
            .beans
            .get(bean)
            .map(|fields| fields.keys().cloned().collect())
            .ok_or_else(|| RpcError::fault(format!("unknown bean {}", bean)))
    }

    fn get(&self, bean: &str, field: &str) -> RpcResult<BeanValue> {
        self.enter("get")?;
        self.bean_field(bean, field)
            .ok_or_else(|| RpcError::fault(format!("unknown field {}.{}", bean, field)))
    }

    fn get_attributes(
        &self,
        bean: &str,
        fields: &[String],
    ) -> RpcResult<BTreeMap<String, BeanValue>> {
        self.enter("getAttributes")?;
        let inner = self.inner.lock();
        let values = inner
            .beans
            .get(bean)
            .ok_or_else(|| RpcError::fault(format!("unknown bean {}", bean)))?;
        fields
            .iter()
            .map(|f| {
                values
                    .get(f)
                    .cloned()
                    .map(|v| (f.clone(), v))
                    .ok_or_else(|| RpcError::fault(format!("unknown field {}.{}", bean, f)))
            })
            .collect()
    }
}

/// MBean contents a freshly started component of kind `name` exposes.
pub fn standard_beans(name: &str) -> Beans {
    let mut beans = Beans::new();
    let mut add = |bean: &str, fields: Vec<(&str, BeanValue)>| {
        beans.insert(
            bean.to_string(),
            fields
                .into_iter()
                .map(|(f, v)| (f.to_string(), v))
                .collect(),
        );
    };

    match name {
        "stringHub" | "replayHub" => {
            add(
                "stringhub",
                vec![
                    ("NumberOfActiveAndTotalChannels", BeanValue::from(vec![0, 0])),
                    ("TotalLBMOverflows", BeanValue::Int(0)),
                    ("HitRate", BeanValue::Float(0.0)),
                    ("HitRateLC", BeanValue::Float(0.0)),
                    ("LatestFirstChannelHitTime", BeanValue::Int(-1)),
                    ("EarliestLastChannelHitTime", BeanValue::Int(-1)),
                    ("NumberOfNonZombies", BeanValue::Int(60)),
                ],
            );
            add(
                "sender",
                vec![
                    ("NumHitsReceived", BeanValue::Int(0)),
                    ("NumReadoutRequestsReceived", BeanValue::Int(0)),
                    ("NumReadoutsSent", BeanValue::Int(0)),
                ],
            );
        }
        "inIceTrigger" | "iceTopTrigger" => {
            add("stringHit", vec![("RecordsReceived", BeanValue::Int(0))]);
            add("trigger", vec![("RecordsSent", BeanValue::Int(0))]);
        }
        "globalTrigger" => {
            add("trigger", vec![("RecordsReceived", BeanValue::Int(0))]);
            add("glblTrig", vec![("RecordsSent", BeanValue::Int(0))]);
        }
        "eventBuilder" => {
            add(
                "backEnd",
                vec![
                    ("DiskAvailable", BeanValue::Int(2048)),
                    ("EventData", BeanValue::from(vec![0, 0])),
                    ("FirstEventTime", BeanValue::Int(0)),
                    ("GoodTimes", BeanValue::from(vec![0, 0])),
                    ("NumBadEvents", BeanValue::Int(0)),
                    ("NumEventsDispatched", BeanValue::Int(0)),
                    ("NumEventsSent", BeanValue::Int(0)),
                    ("NumReadoutsReceived", BeanValue::Int(0)),
                    ("NumTriggerRequestsReceived", BeanValue::Int(0)),
                ],
            );
        }
        "secondaryBuilders" => {
            for bldr in ["tcalBuilder", "moniBuilder"] {
                add(bldr, vec![("NumDispatchedData", BeanValue::Int(0))]);
            }
            add(
                "snBuilder",
                vec![
                    ("NumDispatchedData", BeanValue::Int(0)),
                    ("DiskAvailable", BeanValue::Int(2048)),
                ],
            );
        }
        _ => {}
    }
    beans
}

/// One captured monitoring record.
#[derive(Debug, Clone, PartialEq)]
pub struct MoniRecord {
    pub name: String,
    pub value: BeanValue,
    pub priority: Priority,
}

/// Monitoring sink that keeps everything it is sent.
#[derive(Debug, Default)]
pub struct RecordingMoniSink {
    records: Mutex<Vec<MoniRecord>>,
    refuse: Mutex<bool>,
}

impl RecordingMoniSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes subsequent sends report failure.
    pub fn set_refuse(&self, refuse: bool) {
        *self.refuse.lock() = refuse;
    }

    pub fn records(&self) -> Vec<MoniRecord> {
        self.records.lock().clone()
    }

    pub fn named(&self, name: &str) -> Vec<MoniRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.name == name)
            .cloned()
            .collect()
    }

    /// Most recent record with `name`.
    pub fn last(&self, name: &str) -> Option<MoniRecord> {
        self.records
            .lock()
            .iter()
            .rev()
            .find(|r| r.name == name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.records.lock().iter().any(|r| r.name == name)
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl MoniSink for RecordingMoniSink {
    fn send_moni(&self, name: &str, value: BeanValue, priority: Priority) -> bool {
        if *self.refuse.lock() {
            return false;
        }
        self.records.lock().push(MoniRecord {
            name: name.to_string(),
            value,
            priority,
        });
        true
    }
}

/// Process manager that records requests and, for cycles, revives the
/// matching mocks.
#[derive(Default)]
pub struct RecordingProcessManager {
    cycled: Mutex<Vec<String>>,
    killed: Mutex<Vec<String>>,
    mocks: Mutex<Vec<Arc<MockComponent>>>,
    fail: Mutex<bool>,
}

impl RecordingProcessManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mocks that a cycle request should bring back to idle.
    pub fn manage(&self, mock: Arc<MockComponent>) {
        self.mocks.lock().push(mock);
    }

    pub fn set_fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn cycled(&self) -> Vec<String> {
        self.cycled.lock().clone()
    }

    pub fn killed(&self) -> Vec<String> {
        self.killed.lock().clone()
    }
}

impl RemoteProcessManager for RecordingProcessManager {
    fn cycle_components(&self, components: &[ComponentSummary]) -> Result<(), RemoteError> {
        if *self.fail.lock() {
            return Err(RemoteError::new("cycle refused"));
        }
        for comp in components {
            let name = ComponentName::new(comp.comp_name.clone(), comp.comp_num);
            self.cycled.lock().push(name.full_name());
            for mock in self.mocks.lock().iter().filter(|m| *m.name() == name) {
                mock.clear_failures();
                mock.set_unreachable(false);
                mock.set_stop_behavior(StopBehavior::Normal);
                mock.set_state("idle");
            }
        }
        Ok(())
    }

    fn kill_components(&self, components: &[ComponentSummary]) -> Result<(), RemoteError> {
        if *self.fail.lock() {
            return Err(RemoteError::new("kill refused"));
        }
        for comp in components {
            let name = ComponentName::new(comp.comp_name.clone(), comp.comp_num);
            self.killed.lock().push(name.full_name());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_transitions() {
        let mock = MockComponent::new("eventBuilder", 0);
        mock.connect(&[]).unwrap();
        assert_eq!(mock.state(), "connected");
        mock.configure(Some("cfg")).unwrap();
        assert_eq!(mock.state(), "ready");
        mock.start_run(12).unwrap();
        assert_eq!(mock.run_number(), Some(12));
        mock.stop_run().unwrap();
        assert_eq!(mock.state(), "ready");
        assert_eq!(mock.calls("startRun"), 1);
    }

    #[test]
    fn test_mock_stop_behaviors() {
        let mock = MockComponent::new("eventBuilder", 0);
        mock.start_run(1).unwrap();
        mock.set_stop_behavior(StopBehavior::NeedsForce);
        mock.stop_run().unwrap();
        assert_eq!(mock.state(), "running");
        mock.forced_stop().unwrap();
        assert_eq!(mock.state(), "ready");
    }

    #[test]
    fn test_event_builder_run_data() {
        let mock = MockComponent::new("eventBuilder", 0);
        mock.set_bean_field(
            "backEnd",
            "EventData",
            BeanValue::from(vec![1000, 50_000_000_001_i64]),
        );
        mock.set_bean_field("backEnd", "FirstEventTime", BeanValue::Int(1));
        let data = crate::value::unfix_value(mock.get_run_data(1).unwrap());
        assert_eq!(data.int_at(0), Some(1000));
        assert_eq!(data.int_at(1), Some(1));
        assert_eq!(data.int_at(2), Some(50_000_000_001));
    }

    #[test]
    fn test_recording_sink() {
        let sink = RecordingMoniSink::new();
        assert!(sink.send_moni("a", BeanValue::Int(1), Priority::Its));
        sink.set_refuse(true);
        assert!(!sink.send_moni("b", BeanValue::Int(2), Priority::Its));
        assert_eq!(sink.records().len(), 1);
        assert_eq!(sink.last("a").unwrap().priority, Priority::Its);
    }
}
