//! Remote DAQ components and the proxies that drive them.
//!
//! A component announces itself with a name, an instance number, an RPC
//! address, an optional MBean address and a list of data connectors. The
//! control server wraps each one in a [`ComponentProxy`], which the runset
//! layer uses to issue lifecycle commands and the monitoring tasks use to
//! read MBean fields.

mod connector;
mod error;
mod mbean;
mod name;
mod proxy;
mod rpc;
mod state;

pub use connector::{Connection, Connector, Direction};
pub use error::{BeanError, ComponentError};
pub use mbean::{BeanCatalog, MBeanClient};
pub use name::{list_component_ranges, ComponentName};
pub use proxy::{ComponentProxy, ComponentSummary, MAX_DEAD_COUNT};
pub use rpc::{ComponentRpc, MBeanRpc, RpcError, RpcResult, DEFAULT_RPC_TIMEOUT_SECS};
pub use state::ComponentState;
