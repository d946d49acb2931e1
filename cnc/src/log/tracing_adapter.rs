//! Adapter from [`Logger`] to the `tracing` ecosystem.

use crate::log::{LogLevel, Logger};
use std::fmt::Arguments;

/// Forwards lines to `tracing`, optionally tagged with a source name.
///
/// The control server's own log and any run log without a backing file go
/// through this adapter so they land in the subscriber installed by
/// [`crate::logging::init_logging`].
#[derive(Debug, Clone, Default)]
pub struct TracingLogger {
    source: Option<String>,
}

impl TracingLogger {
    pub fn new() -> Self {
        Self { source: None }
    }

    /// Tags every forwarded line with `source` (e.g. `"runset-3"`).
    pub fn with_source(source: impl Into<String>) -> Self {
        Self {
            source: Some(source.into()),
        }
    }
}

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        let source = self.source.as_deref().unwrap_or("cnc");
        match level {
            LogLevel::Trace => tracing::trace!(source, "{}", args),
            LogLevel::Debug => tracing::debug!(source, "{}", args),
            LogLevel::Info => tracing::info!(source, "{}", args),
            LogLevel::Warn => tracing::warn!(source, "{}", args),
            LogLevel::Error => tracing::error!(source, "{}", args),
        }
    }
}
