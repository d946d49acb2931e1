//! Logger that appends timestamped lines to a file.

use crate::log::{LogLevel, Logger};
use chrono::Local;
use parking_lot::Mutex;
use std::fmt::Arguments;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Run log backed by a file.
///
/// Each line is written as `<name> [<timestamp>] <LEVEL> <text>`. Write
/// failures are reported through `tracing` and otherwise ignored: losing a
/// run-log line must never affect the run.
pub struct FileLogger {
    name: String,
    path: PathBuf,
    file: Mutex<File>,
}

impl FileLogger {
    /// Opens (creating if needed) `path` for appending.
    pub fn open(name: impl Into<String>, path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            name: name.into(),
            path: path.to_path_buf(),
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Logger for FileLogger {
    fn log(&self, level: LogLevel, args: Arguments<'_>) {
        let stamp = Local::now().format("%Y-%m-%d %H:%M:%S%.6f");
        let mut file = self.file.lock();
        if let Err(e) = writeln!(file, "{} [{}] {} {}", self.name, stamp, level, args) {
            tracing::warn!(path = %self.path.display(), error = %e, "Cannot write run log line");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_warn;

    #[test]
    fn test_appends_lines() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("run1").join("dash.log");

        let logger = FileLogger::open("DAQRun", &path).unwrap();
        log_warn!(logger, "disk is {}", "full");
        logger.info(format_args!("second"));
        drop(logger);

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("DAQRun ["));
        assert!(lines[0].ends_with("WARN disk is full"));
        assert!(lines[1].ends_with("INFO second"));
    }
}
