//! Control-server configuration loaded from `~/.pdaq/cncserver.ini`.
//!
//! Settings structs live in [`settings`](self::settings), parsing in
//! `parser` and serialization in `writer`. A loaded [`CncConfig`] converts
//! into the builder-style settings used by runsets and the task manager.

mod file;
mod parser;
mod settings;
mod writer;

pub use file::{config_directory, config_file_path, ConfigFileError};
pub use settings::{CncConfig, MoniSettings, PathSettings, RpcSettings, RunSetSection, TaskSection};
