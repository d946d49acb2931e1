//! Errors raised by component proxies and MBean lookups.

use super::name::ComponentName;
use super::rpc::RpcError;
use super::state::ComponentState;
use thiserror::Error;

/// MBean access failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BeanError {
    #[error("{component} has no MBean client")]
    NoClient { component: String },

    #[error("{component} has no bean \"{bean}\"")]
    UnknownBean { component: String, bean: String },

    #[error("{component} bean \"{bean}\" has no field \"{field}\"")]
    UnknownBeanField {
        component: String,
        bean: String,
        field: String,
    },

    #[error("{component} timed out while {action}")]
    Timeout { component: String, action: String },

    #[error("{component} could not load beans: {}", .failed.join(", "))]
    Load {
        component: String,
        failed: Vec<String>,
    },

    #[error("{component}: {source}")]
    Rpc {
        component: String,
        #[source]
        source: RpcError,
    },
}

/// Failures of a proxy operation.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ComponentError {
    #[error("{component} cannot be terminated in state {state}")]
    UnexpectedState {
        component: ComponentName,
        state: ComponentState,
    },

    #[error("{component} {method} failed: {source}")]
    Rpc {
        component: ComponentName,
        method: &'static str,
        #[source]
        source: RpcError,
    },

    #[error(transparent)]
    Bean(#[from] BeanError),
}
