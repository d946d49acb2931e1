//! In-memory logger.

use crate::log::{LogLevel, Logger};
use parking_lot::Mutex;
use std::fmt::Arguments;

/// One captured line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine {
    pub level: LogLevel,
    pub text: String,
}

/// Keeps every line it receives.
///
/// Used as the run log when a caller wants to inspect what operators would
/// see, and by the test suites to assert on exact messages.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<LogLine>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of all captured lines, oldest first.
    pub fn lines(&self) -> Vec<LogLine> {
        self.lines.lock().clone()
    }

    /// Returns the text of every line logged at `level`.
    pub fn messages_at(&self, level: LogLevel) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|line| line.level == level)
            .map(|line| line.text.clone())
            .collect()
    }

    /// True if some line matches `text` exactly.
    pub fn contains(&self, text: &str) -> bool {
        self.lines.lock().iter().any(|line| line.text == text)
    }

    /// True if some line contains `fragment`.
    pub fn contains_fragment(&self, fragment: &str) -> bool {
        self.lines
            .lock()
            .iter()
            .any(|line| line.text.contains(fragment))
    }

    pub fn len(&self) -> usize {
        self.lines.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.lock().is_empty()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl Logger for MemoryLogger {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        self.lines.lock().push(LogLine {
            level,
            text: args.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{log_error, log_info};

    #[test]
    fn test_captures_lines_in_order() {
        let logger = MemoryLogger::new();
        log_info!(logger, "first {}", 1);
        log_error!(logger, "second");

        let lines = logger.lines();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].text, "first 1");
        assert_eq!(lines[1].level, LogLevel::Error);
    }

    #[test]
    fn test_filters_by_level() {
        let logger = MemoryLogger::new();
        log_info!(logger, "a");
        log_error!(logger, "b");
        log_error!(logger, "c");

        assert_eq!(logger.messages_at(LogLevel::Error), vec!["b", "c"]);
        assert!(logger.contains("a"));
        assert!(logger.contains_fragment("c"));
        assert!(!logger.contains("d"));
    }

    #[test]
    fn test_clear() {
        let logger = MemoryLogger::new();
        log_info!(logger, "x");
        logger.clear();
        assert!(logger.is_empty());
    }
}
