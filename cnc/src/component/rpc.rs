//! Remote call surfaces exposed by every DAQ component.
//!
//! The wire protocol lives outside this crate. Transports implement
//! [`ComponentRpc`] and [`MBeanRpc`]; calls are synchronous and may block
//! for as long as the transport allows, so async callers run them on the
//! blocking pool.

use super::connector::Connection;
use crate::value::BeanValue;
use std::collections::BTreeMap;
use thiserror::Error;

/// Default per-call transport timeout in seconds.
pub const DEFAULT_RPC_TIMEOUT_SECS: u64 = 120;

/// Transport-level failure of a single remote call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RpcError {
    #[error("{method} timed out")]
    Timeout { method: String },

    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    #[error("remote fault {code}: {message}")]
    Fault { code: i32, message: String },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("{0} is not supported by this component")]
    Unsupported(&'static str),
}

impl RpcError {
    pub fn timeout(method: impl Into<String>) -> Self {
        RpcError::Timeout {
            method: method.into(),
        }
    }

    pub fn fault(message: impl Into<String>) -> Self {
        RpcError::Fault {
            code: 1,
            message: message.into(),
        }
    }

    /// True for failures where the remote side never answered.
    pub fn is_unreachable(&self) -> bool {
        matches!(self, RpcError::Timeout { .. } | RpcError::ConnectionRefused(_))
    }
}

pub type RpcResult<T> = Result<T, RpcError>;

/// Component control surface.
///
/// The required methods drive the run lifecycle; the remaining calls are
/// only answered by some component kinds and default to
/// [`RpcError::Unsupported`].
pub trait ComponentRpc: Send + Sync {
    fn configure(&self, config_name: Option<&str>) -> RpcResult<BeanValue>;
    fn connect(&self, connections: &[Connection]) -> RpcResult<BeanValue>;
    fn start_run(&self, run_num: u32) -> RpcResult<BeanValue>;
    fn stop_run(&self) -> RpcResult<BeanValue>;
    fn forced_stop(&self) -> RpcResult<BeanValue>;
    fn reset(&self) -> RpcResult<BeanValue>;
    fn get_state(&self) -> RpcResult<String>;
    fn get_run_data(&self, run_num: u32) -> RpcResult<BeanValue>;
    fn terminate(&self) -> RpcResult<BeanValue>;

    fn reset_logging(&self) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("resetLogging"))
    }

    fn log_to(
        &self,
        _log_host: &str,
        _log_port: u16,
        _live_host: &str,
        _live_port: u16,
    ) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("logTo"))
    }

    fn prepare_subrun(&self, _subrun: i32) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("prepareSubrun"))
    }

    fn start_subrun(&self, _data: &BeanValue) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("startSubrun"))
    }

    fn commit_subrun(&self, _subrun: i32, _latest_time: &BeanValue) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("commitSubrun"))
    }

    fn switch_to_new_run(&self, _run_num: u32) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("switchToNewRun"))
    }

    fn set_first_good_time(&self, _time: &BeanValue) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("setFirstGoodTime"))
    }

    fn set_last_good_time(&self, _time: &BeanValue) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("setLastGoodTime"))
    }

    fn get_replay_start_time(&self) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("getReplayStartTime"))
    }

    fn set_replay_offset(&self, _offset: &BeanValue) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("setReplayOffset"))
    }

    fn get_events(&self, _subrun: i32) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("getEvents"))
    }

    fn list_connector_states(&self) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("listConnectorStates"))
    }

    /// Per-trigger counts aggregated by the global trigger.
    fn get_moni_counts(&self) -> RpcResult<BeanValue> {
        Err(RpcError::Unsupported("getMoniCounts"))
    }
}

/// MBean query surface.
pub trait MBeanRpc: Send + Sync {
    fn list_mbeans(&self) -> RpcResult<Vec<String>>;
    fn list_getters(&self, bean: &str) -> RpcResult<Vec<String>>;
    fn get(&self, bean: &str, field: &str) -> RpcResult<BeanValue>;
    fn get_attributes(&self, bean: &str, fields: &[String])
        -> RpcResult<BTreeMap<String, BeanValue>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unreachable_classification() {
        assert!(RpcError::timeout("getState").is_unreachable());
        assert!(RpcError::ConnectionRefused("node1:8080".into()).is_unreachable());
        assert!(!RpcError::fault("boom").is_unreachable());
        assert_eq!(RpcError::timeout("getState").to_string(), "getState timed out");
    }
}
