//! Per-run bookkeeping and the end-of-run summary.

use super::stats::RunStats;
use super::version::VersionInfo;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const SUMMARY_FILE: &str = "run_summary.json";

/// Failure to hand a finished run to the archiver.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot encode run summary: {0}")]
    Encode(#[from] serde_json::Error),
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> ArchiveError + '_ {
    move |source| ArchiveError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// State of the run currently in progress.
#[derive(Debug, Clone)]
pub struct RunData {
    pub run_number: u32,
    pub subrun: i32,
    pub config_name: String,
    pub cluster: String,
    pub version: VersionInfo,
    pub started_at: DateTime<Utc>,
    pub run_dir: Option<PathBuf>,
}

impl RunData {
    pub fn new(
        run_number: u32,
        config_name: impl Into<String>,
        cluster: impl Into<String>,
        version: VersionInfo,
        run_dir: Option<PathBuf>,
    ) -> Self {
        Self {
            run_number,
            subrun: 0,
            config_name: config_name.into(),
            cluster: cluster.into(),
            version,
            started_at: Utc::now(),
            run_dir,
        }
    }

    /// Builds the summary for a run ending now.
    pub fn finish(&self, stats: &RunStats, failed: bool) -> RunSummary {
        RunSummary {
            run_number: self.run_number,
            config: self.config_name.clone(),
            cluster: self.cluster.clone(),
            release: self.version.release.clone(),
            revision: self.version.revision.clone(),
            start_time: self.started_at,
            stop_time: Utc::now(),
            num_events: stats.num_events,
            num_moni: stats.num_moni,
            num_sn: stats.num_sn,
            num_tcal: stats.num_tcal,
            duration_secs: stats.duration(),
            rate_hz: stats.rate(),
            first_good_time: stats.first_good_time,
            last_good_time: stats.last_good_time,
            status: if failed { "FAIL" } else { "SUCCESS" }.to_string(),
        }
    }
}

/// End-of-run record written next to the run logs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_number: u32,
    pub config: String,
    pub cluster: String,
    pub release: String,
    pub revision: String,
    pub start_time: DateTime<Utc>,
    pub stop_time: DateTime<Utc>,
    pub num_events: i64,
    pub num_moni: i64,
    pub num_sn: i64,
    pub num_tcal: i64,
    pub duration_secs: Option<f64>,
    pub rate_hz: Option<f64>,
    pub first_good_time: Option<i64>,
    pub last_good_time: Option<i64>,
    pub status: String,
}

impl RunSummary {
    pub fn succeeded(&self) -> bool {
        self.status == "SUCCESS"
    }

    /// Writes the summary as pretty JSON to `<dir>/run_summary.json`.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ArchiveError> {
        let path = dir.join(SUMMARY_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(io_error(&path))?;
        Ok(path)
    }
}

/// Destination for finished-run artifacts.
pub trait ArchiveQueue: Send + Sync {
    fn queue(&self, summary: &RunSummary) -> Result<(), ArchiveError>;
}

/// Drops every summary.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoArchive;

impl ArchiveQueue for NoArchive {
    fn queue(&self, _summary: &RunSummary) -> Result<(), ArchiveError> {
        Ok(())
    }
}

/// Queues summaries for the SPADE transfer system.
///
/// Each run produces a data file plus an empty `.sem` semaphore the
/// transfer daemon waits for before picking the data file up.
#[derive(Debug, Clone)]
pub struct SpadeQueue {
    dir: PathBuf,
}

impl SpadeQueue {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn base_name(summary: &RunSummary) -> String {
        format!(
            "SPS-pDAQ-run-{:03}_{}",
            summary.run_number,
            summary.stop_time.format("%Y%m%d_%H%M%S")
        )
    }
}

impl ArchiveQueue for SpadeQueue {
    fn queue(&self, summary: &RunSummary) -> Result<(), ArchiveError> {
        fs::create_dir_all(&self.dir).map_err(io_error(&self.dir))?;
        let base = Self::base_name(summary);

        let data = self.dir.join(format!("{}.json", base));
        fs::write(&data, serde_json::to_vec_pretty(summary)?).map_err(io_error(&data))?;

        let sem = self.dir.join(format!("{}.sem", base));
        fs::write(&sem, b"").map_err(io_error(&sem))?;

        tracing::info!(run = summary.run_number, path = %data.display(), "Queued run for SPADE");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_summary(failed: bool) -> RunSummary {
        let data = RunData::new(
            321,
            "sim5",
            "localhost",
            VersionInfo::new("Xenon", "1234"),
            None,
        );
        let stats = RunStats {
            num_events: 1000,
            first_time: Some(1),
            last_time: Some(50_000_000_001),
            num_tcal: 7,
            ..RunStats::default()
        };
        data.finish(&stats, failed)
    }

    #[test]
    fn test_finish_computes_rate_and_status() {
        let summary = sample_summary(false);
        assert_eq!(summary.run_number, 321);
        assert_eq!(summary.duration_secs, Some(5.0));
        assert_eq!(summary.rate_hz, Some(200.0));
        assert_eq!(summary.num_tcal, 7);
        assert!(summary.succeeded());
        assert_eq!(sample_summary(true).status, "FAIL");
    }

    #[test]
    fn test_write_summary() {
        let dir = TempDir::new().unwrap();
        let path = sample_summary(false).write_to(dir.path()).unwrap();
        let text = fs::read_to_string(path).unwrap();
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["run_number"], 321);
        assert_eq!(json["status"], "SUCCESS");
        assert_eq!(json["num_events"], 1000);
    }

    #[test]
    fn test_spade_queue_writes_data_and_semaphore() {
        let dir = TempDir::new().unwrap();
        let spade = dir.path().join("spade");
        SpadeQueue::new(&spade).queue(&sample_summary(false)).unwrap();

        let mut names: Vec<String> = fs::read_dir(&spade)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names.len(), 2);
        assert!(names[0].starts_with("SPS-pDAQ-run-321_") && names[0].ends_with(".json"));
        assert!(names[1].ends_with(".sem"));
    }
}
