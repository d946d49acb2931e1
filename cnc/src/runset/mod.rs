//! Runsets: groups of components driven through runs together.
//!
//! A runset moves through `idle → ready → running → ready …` and on any
//! unrecoverable failure lands in `error`, from which only a reset (and a
//! cycle of the components that refuse it) brings it back.

mod error;
pub mod fanout;
mod options;
mod run_data;
mod set;
mod settings;
mod state;
mod stats;
mod version;

pub use error::RunSetError;
pub use options::{LogAddress, RunOptions};
pub use run_data::{
    ArchiveError, ArchiveQueue, NoArchive, RunData, RunSummary, SpadeQueue, SUMMARY_FILE,
};
pub use set::{RunSet, DASH_LOG_FILE};
pub use settings::{
    RunSetSettings, DEFAULT_POLL_INTERVAL_MS, DEFAULT_RESET_TIMEOUT_SECS,
    DEFAULT_START_TIMEOUT_SECS, DEFAULT_STOP_TIMEOUT_SECS,
};
pub use state::RunSetState;
pub use stats::RunStats;
pub use version::VersionInfo;
