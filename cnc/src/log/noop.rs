//! Logger that drops every line.

use crate::log::{LogLevel, Logger};
use std::fmt::Arguments;

/// Discards all messages. Used where a sink is required but nobody listens.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLogger;

impl Logger for NoOpLogger {
    #[inline]
    fn log(&self, _level: LogLevel, _args: Arguments<'_>) {}
}
