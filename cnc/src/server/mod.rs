//! Control plane: the component registry, runset bookkeeping and the
//! request surface exposed to the control client.

mod cnc;
mod control;
mod error;
mod registry;
mod remote;

pub use cnc::{CnCServer, SERVER_CALLER};
pub use control::{ControlRequest, ControlResponse, RunOptionsParams};
pub use error::CnCError;
pub use registry::ComponentRegistry;
pub use remote::{ManualProcessManager, RemoteError, RemoteProcessManager};
