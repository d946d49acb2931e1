//! Line-oriented log sinks.
//!
//! Control-plane code never writes to a concrete logging backend. Runsets,
//! proxies and monitoring tasks receive an `Arc<dyn Logger>` and emit plain
//! operator-facing lines through it:
//!
//! - `TracingLogger`: forwards every line to the `tracing` subscriber
//! - `FileLogger`: appends timestamped lines to a run log file
//! - `MemoryLogger`: keeps lines in memory for inspection
//! - `NoOpLogger`: discards everything
//!
//! ```
//! use cnc::log::{Logger, MemoryLogger};
//! use cnc::log_info;
//! use std::sync::Arc;
//!
//! let dashlog = Arc::new(MemoryLogger::new());
//! log_info!(dashlog, "Starting run {}...", 321);
//! assert!(dashlog.contains("Starting run 321..."));
//! ```

mod file;
mod memory;
mod noop;
mod tracing_adapter;
mod r#trait;

pub use file::FileLogger;
pub use memory::{LogLine, MemoryLogger};
pub use noop::NoOpLogger;
pub use r#trait::{LogLevel, Logger};
pub use tracing_adapter::TracingLogger;
