//! CnC - command-and-control server for a distributed data-acquisition cluster
//!
//! This library drives groups of remote DAQ components ("runsets") through
//! their run lifecycle and watches them while a run is in progress.
//!
//! # High-Level API
//!
//! The [`server`] module is the entry point used by the control client:
//!
//! ```ignore
//! use cnc::server::{CnCServer, ManualProcessManager};
//! use cnc::run_config::JsonRunConfigs;
//! use std::sync::Arc;
//!
//! let server = CnCServer::new(
//!     Arc::new(JsonRunConfigs::new("/home/pdaq/config")),
//!     Arc::new(ManualProcessManager),
//!     config.runset_settings(),
//! );
//! server.add_component(proxy);
//! let runset = server.make_runset("sim5str").await?;
//! server.start_run(runset.id(), 321, RunOptions::new()).await?;
//! ```

pub mod component;
pub mod config;
pub mod connection;
pub mod log;
pub mod logging;
pub mod moni;
pub mod run_config;
pub mod runset;
pub mod server;
pub mod tasks;
pub mod testing;
pub mod time;
pub mod value;

/// Version of the CnC library and CLI.
///
/// The version is defined in `Cargo.toml` and injected at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
