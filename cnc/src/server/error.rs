//! Control-server errors surfaced to the control client.

use super::remote::RemoteError;
use crate::run_config::RunConfigError;
use crate::runset::RunSetError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CnCError {
    /// Components the run configuration needs are not registered.
    #[error("Missing components: {}", .0.join(", "))]
    MissingComponent(Vec<String>),

    #[error("Unknown runset #{0}")]
    UnknownRunSet(u32),

    #[error(transparent)]
    RunConfig(#[from] RunConfigError),

    #[error(transparent)]
    RunSet(#[from] RunSetError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// A malformed control request.
    #[error("Bad request: {0}")]
    BadRequest(String),
}
