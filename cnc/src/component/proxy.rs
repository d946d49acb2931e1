//! Handle on one remote component.

use super::connector::{Connection, Connector};
use super::error::{BeanError, ComponentError};
use super::mbean::MBeanClient;
use super::name::ComponentName;
use super::rpc::{ComponentRpc, MBeanRpc, RpcError, RpcResult};
use super::state::ComponentState;
use crate::log::{Logger, TracingLogger};
use crate::value::{unfix_value, BeanValue};
use crate::{log_debug, log_error};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Consecutive unanswered `getState` polls before a component is DEAD.
pub const MAX_DEAD_COUNT: u32 = 3;

static NEXT_ID: AtomicU32 = AtomicU32::new(1);

/// Row returned by component listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSummary {
    pub id: u32,
    pub comp_name: String,
    pub comp_num: u32,
    pub host: String,
    pub rpc_port: u16,
    pub mbean_port: u16,
    pub state: String,
}

/// Proxy for a registered component.
///
/// Lifecycle calls log transport failures to the component's logger and
/// return them to the caller; [`state`](Self::state) never fails and instead
/// degrades to MISSING and then DEAD while the component stays silent.
pub struct ComponentProxy {
    id: u32,
    name: ComponentName,
    host: String,
    port: u16,
    mbean_port: u16,
    connectors: Vec<Connector>,
    rpc: Arc<dyn ComponentRpc>,
    mbean: Option<MBeanClient>,
    dead_count: AtomicU32,
    order: Mutex<Option<usize>>,
    logger: Arc<dyn Logger>,
}

impl ComponentProxy {
    pub fn new(name: ComponentName, rpc: Arc<dyn ComponentRpc>) -> Self {
        let logger = Arc::new(TracingLogger::with_source(name.full_name()));
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            name,
            host: "localhost".to_string(),
            port: 0,
            mbean_port: 0,
            connectors: Vec::new(),
            rpc,
            mbean: None,
            dead_count: AtomicU32::new(0),
            order: Mutex::new(None),
            logger,
        }
    }

    pub fn with_address(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    pub fn with_mbean(mut self, port: u16, rpc: Arc<dyn MBeanRpc>) -> Self {
        self.mbean_port = port;
        self.mbean = Some(MBeanClient::new(self.name.full_name(), rpc));
        self
    }

    pub fn with_connectors(mut self, connectors: Vec<Connector>) -> Self {
        self.connectors = connectors;
        self
    }

    pub fn with_logger(mut self, logger: Arc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn name(&self) -> &ComponentName {
        &self.name
    }

    pub fn full_name(&self) -> String {
        self.name.full_name()
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn mbean_port(&self) -> u16 {
        self.mbean_port
    }

    pub fn connectors(&self) -> &[Connector] {
        &self.connectors
    }

    pub fn is_hub(&self) -> bool {
        self.name.is_hub()
    }

    pub fn is_builder(&self) -> bool {
        self.name.is_builder()
    }

    pub fn is_replay_hub(&self) -> bool {
        self.name.is_replay_hub()
    }

    /// Hubs, and anything that only produces data.
    pub fn is_source(&self) -> bool {
        self.name.is_hub()
            || (!self.connectors.is_empty() && self.connectors.iter().all(Connector::is_output))
    }

    pub fn dead_count(&self) -> u32 {
        self.dead_count.load(Ordering::SeqCst)
    }

    /// Position in the runset-wide command sequence, once assigned.
    pub fn order(&self) -> Option<usize> {
        *self.order.lock()
    }

    pub fn set_order(&self, order: usize) {
        *self.order.lock() = Some(order);
    }

    pub fn clear_order(&self) {
        *self.order.lock() = None;
    }

    fn call<T>(
        &self,
        method: &'static str,
        f: impl FnOnce(&dyn ComponentRpc) -> RpcResult<T>,
    ) -> Result<T, ComponentError> {
        f(self.rpc.as_ref()).map_err(|source| {
            if matches!(source, RpcError::Unsupported(_)) {
                log_debug!(self.logger, "{} does not support {}", self.name, method);
            } else {
                log_error!(self.logger, "{} {} failed: {}", self.name, method, source);
            }
            ComponentError::Rpc {
                component: self.name.clone(),
                method,
                source,
            }
        })
    }

    pub fn configure(&self, config_name: Option<&str>) -> Result<BeanValue, ComponentError> {
        self.call("configure", |rpc| rpc.configure(config_name))
    }

    pub fn connect(&self, connections: &[Connection]) -> Result<BeanValue, ComponentError> {
        self.call("connect", |rpc| rpc.connect(connections))
    }

    pub fn start_run(&self, run_num: u32) -> Result<BeanValue, ComponentError> {
        self.call("startRun", |rpc| rpc.start_run(run_num))
    }

    pub fn stop_run(&self) -> Result<BeanValue, ComponentError> {
        self.call("stopRun", |rpc| rpc.stop_run())
    }

    pub fn forced_stop(&self) -> Result<BeanValue, ComponentError> {
        self.call("forcedStop", |rpc| rpc.forced_stop())
    }

    pub fn reset(&self) -> Result<BeanValue, ComponentError> {
        self.call("reset", |rpc| rpc.reset())
    }

    pub fn reset_logging(&self) -> Result<BeanValue, ComponentError> {
        self.call("resetLogging", |rpc| rpc.reset_logging())
    }

    pub fn log_to(
        &self,
        log_host: &str,
        log_port: u16,
        live_host: &str,
        live_port: u16,
    ) -> Result<BeanValue, ComponentError> {
        self.call("logTo", |rpc| {
            rpc.log_to(log_host, log_port, live_host, live_port)
        })
    }

    pub fn prepare_subrun(&self, subrun: i32) -> Result<BeanValue, ComponentError> {
        self.call("prepareSubrun", |rpc| rpc.prepare_subrun(subrun))
    }

    pub fn start_subrun(&self, data: &BeanValue) -> Result<BeanValue, ComponentError> {
        self.call("startSubrun", |rpc| rpc.start_subrun(data))
            .map(unfix_value)
    }

    pub fn commit_subrun(
        &self,
        subrun: i32,
        latest_time: i64,
    ) -> Result<BeanValue, ComponentError> {
        let time = BeanValue::decorated(latest_time);
        self.call("commitSubrun", |rpc| rpc.commit_subrun(subrun, &time))
    }

    pub fn switch_to_new_run(&self, run_num: u32) -> Result<BeanValue, ComponentError> {
        self.call("switchToNewRun", |rpc| rpc.switch_to_new_run(run_num))
    }

    pub fn set_first_good_time(&self, ticks: i64) -> Result<BeanValue, ComponentError> {
        let time = BeanValue::decorated(ticks);
        self.call("setFirstGoodTime", |rpc| rpc.set_first_good_time(&time))
    }

    pub fn set_last_good_time(&self, ticks: i64) -> Result<BeanValue, ComponentError> {
        let time = BeanValue::decorated(ticks);
        self.call("setLastGoodTime", |rpc| rpc.set_last_good_time(&time))
    }

    pub fn get_replay_start_time(&self) -> Result<Option<i64>, ComponentError> {
        self.call("getReplayStartTime", |rpc| rpc.get_replay_start_time())
            .map(|v| unfix_value(v).as_i64())
    }

    pub fn set_replay_offset(&self, offset: i64) -> Result<BeanValue, ComponentError> {
        let offset = BeanValue::decorated(offset);
        self.call("setReplayOffset", |rpc| rpc.set_replay_offset(&offset))
    }

    /// Number of events the component saw during `subrun`.
    pub fn subrun_events(&self, subrun: i32) -> Result<Option<i64>, ComponentError> {
        self.call("getEvents", |rpc| rpc.get_events(subrun))
            .map(|v| unfix_value(v).as_i64())
    }

    pub fn list_connector_states(&self) -> Result<BeanValue, ComponentError> {
        self.call("listConnectorStates", |rpc| rpc.list_connector_states())
    }

    pub fn get_moni_counts(&self) -> Result<BeanValue, ComponentError> {
        self.call("getMoniCounts", |rpc| rpc.get_moni_counts())
            .map(unfix_value)
    }

    pub fn get_run_data(&self, run_num: u32) -> Result<BeanValue, ComponentError> {
        self.call("getRunData", |rpc| rpc.get_run_data(run_num))
            .map(unfix_value)
    }

    /// Polls the component's state.
    ///
    /// Every unanswered poll bumps the dead count; the component is MISSING
    /// until the count reaches [`MAX_DEAD_COUNT`], DEAD from then on. Any
    /// answer resets the count.
    pub fn state(&self) -> ComponentState {
        match self.rpc.get_state() {
            Ok(state) => {
                self.dead_count.store(0, Ordering::SeqCst);
                ComponentState::parse(&state)
            }
            Err(e) => {
                let count = self.dead_count.fetch_add(1, Ordering::SeqCst) + 1;
                log_debug!(
                    self.logger,
                    "{} getState failed ({} consecutive): {}",
                    self.name,
                    count,
                    e
                );
                if count >= MAX_DEAD_COUNT {
                    ComponentState::Dead
                } else {
                    ComponentState::Missing
                }
            }
        }
    }

    /// Tells the component to exit.
    ///
    /// Only permitted from idle, ready, MISSING or DEAD. Errors from the
    /// remote call itself are ignored.
    pub fn terminate(&self) -> Result<(), ComponentError> {
        let state = self.state();
        if !state.allows_terminate() {
            return Err(ComponentError::UnexpectedState {
                component: self.name.clone(),
                state,
            });
        }
        if let Err(e) = self.rpc.terminate() {
            log_debug!(self.logger, "Ignoring {} terminate error: {}", self.name, e);
        }
        Ok(())
    }

    fn mbean(&self) -> Result<&MBeanClient, BeanError> {
        self.mbean.as_ref().ok_or_else(|| BeanError::NoClient {
            component: self.name.full_name(),
        })
    }

    /// Loads the bean catalog ahead of the first query.
    pub fn preload_mbeans(&self) -> Result<(), BeanError> {
        self.mbean()?.catalog().map(|_| ())
    }

    pub fn reload_bean_info(&self) -> Result<(), BeanError> {
        self.mbean()?.reload_bean_info()
    }

    pub fn bean_names(&self) -> Result<Vec<String>, BeanError> {
        self.mbean()?.bean_names()
    }

    pub fn bean_fields(&self, bean: &str) -> Result<Vec<String>, BeanError> {
        self.mbean()?.bean_fields(bean)
    }

    pub fn get_single_bean_field(&self, bean: &str, field: &str) -> Result<BeanValue, BeanError> {
        self.mbean()?.get(bean, field)
    }

    pub fn get_multi_bean_fields(
        &self,
        bean: &str,
        fields: &[String],
    ) -> Result<BTreeMap<String, BeanValue>, BeanError> {
        self.mbean()?.get_attributes(bean, fields)
    }

    pub fn get_bean(&self, bean: &str) -> Result<BTreeMap<String, BeanValue>, BeanError> {
        self.mbean()?.get_bean(bean)
    }

    /// Listing row with a freshly polled state.
    pub fn summary(&self) -> ComponentSummary {
        ComponentSummary {
            id: self.id,
            comp_name: self.name.name().to_string(),
            comp_num: self.name.num(),
            host: self.host.clone(),
            rpc_port: self.port,
            mbean_port: self.mbean_port,
            state: self.state().to_string(),
        }
    }
}

impl fmt::Display for ComponentProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ID#{} {} at {}:{}", self.id, self.name, self.host, self.port)?;
        if self.mbean_port > 0 {
            write!(f, " M#{}", self.mbean_port)?;
        }
        if !self.connectors.is_empty() {
            let conns: Vec<String> = self.connectors.iter().map(ToString::to_string).collect();
            write!(f, " [{}]", conns.join(", "))?;
        }
        let dead = self.dead_count();
        if dead > 0 {
            write!(f, " DEAD#{}", dead)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ComponentProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentProxy")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("dead_count", &self.dead_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{LogLevel, MemoryLogger};
    use crate::testing::MockComponent;

    #[test]
    fn test_dead_count_moves_missing_to_dead_and_resets() {
        let mock = Arc::new(MockComponent::new("eventBuilder", 0));
        let proxy = mock.proxy();

        mock.set_unreachable(true);
        assert_eq!(proxy.state(), ComponentState::Missing);
        assert_eq!(proxy.state(), ComponentState::Missing);
        assert_eq!(proxy.state(), ComponentState::Dead);
        assert_eq!(proxy.dead_count(), 3);
        assert!(proxy.to_string().ends_with("DEAD#3"));

        mock.set_unreachable(false);
        assert_eq!(proxy.state(), ComponentState::Idle);
        assert_eq!(proxy.dead_count(), 0);
    }

    #[test]
    fn test_lifecycle_failure_is_logged_and_returned() {
        let mock = Arc::new(MockComponent::new("eventBuilder", 0));
        let logger = Arc::new(MemoryLogger::new());
        let proxy = ComponentProxy::new(mock.name().clone(), mock.clone())
            .with_logger(logger.clone());

        mock.fail_method("configure");
        assert!(matches!(
            proxy.configure(Some("cfg")),
            Err(ComponentError::Rpc { method: "configure", .. })
        ));
        let errors = logger.messages_at(LogLevel::Error);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("eventBuilder configure failed"));
    }

    #[test]
    fn test_terminate_requires_quiet_state() {
        let mock = Arc::new(MockComponent::new("stringHub", 7));
        let proxy = mock.proxy();

        mock.set_state("running");
        assert!(matches!(
            proxy.terminate(),
            Err(ComponentError::UnexpectedState { .. })
        ));
        assert_eq!(mock.calls("terminate"), 0);

        mock.set_state("ready");
        mock.fail_method("terminate");
        assert!(proxy.terminate().is_ok());
        assert_eq!(mock.calls("terminate"), 1);

        mock.set_unreachable(true);
        assert!(proxy.terminate().is_ok());
    }

    #[test]
    fn test_source_detection() {
        let hub = Arc::new(MockComponent::new("stringHub", 1)).proxy();
        assert!(hub.is_source());

        let producer = Arc::new(
            MockComponent::new("fakeSource", 0).with_connectors(vec![Connector::output("data")]),
        )
        .proxy();
        assert!(producer.is_source());

        let consumer = Arc::new(MockComponent::new("eventBuilder", 0).with_connectors(vec![
            Connector::input("rdoutData"),
            Connector::output("rdoutReq"),
        ]))
        .proxy();
        assert!(!consumer.is_source());
    }

    #[test]
    fn test_bean_queries_unfix_values() {
        let mock = Arc::new(MockComponent::new("eventBuilder", 0));
        mock.set_bean_field("backEnd", "NumEventsSent", BeanValue::from("1000L"));
        let proxy = mock.proxy();

        assert_eq!(
            proxy.get_single_bean_field("backEnd", "NumEventsSent").unwrap(),
            BeanValue::Int(1000)
        );
        assert!(matches!(
            proxy.get_single_bean_field("backEnd", "Nope"),
            Err(BeanError::UnknownBeanField { .. })
        ));
    }

    #[test]
    fn test_summary_and_display() {
        let mock = Arc::new(MockComponent::new("stringHub", 21));
        let proxy = mock.proxy();
        let summary = proxy.summary();
        assert_eq!(summary.comp_name, "stringHub");
        assert_eq!(summary.comp_num, 21);
        assert_eq!(summary.state, "idle");
        assert!(proxy.to_string().starts_with(&format!("ID#{} stringHub#21 at", proxy.id())));
    }

    #[test]
    fn test_good_times_are_decorated() {
        let mock = Arc::new(MockComponent::new("eventBuilder", 0));
        mock.proxy().set_first_good_time(12345).unwrap();
        assert_eq!(mock.first_good_time(), Some(BeanValue::from("12345L")));
    }

    #[test]
    fn test_replay_calls_unsupported_by_live_hub() {
        let mock = Arc::new(MockComponent::new("stringHub", 1001));
        let proxy = mock.proxy();

        let err = proxy.get_replay_start_time().unwrap_err();
        assert!(matches!(
            err,
            ComponentError::Rpc {
                method: "getReplayStartTime",
                source: RpcError::Unsupported(_),
                ..
            }
        ));
        assert!(proxy.set_replay_offset(-5).is_err());
    }
}
