//! Per-run options chosen by the operator at start time.

use crate::moni::MoniTarget;
use std::fmt;

/// A `host:port` log or live-monitoring endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogAddress {
    pub host: String,
    pub port: u16,
}

impl LogAddress {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for LogAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Options for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    pub moni_target: MoniTarget,
    /// Where components should send their log lines during the run.
    pub log: Option<LogAddress>,
    /// Where components should send their live-monitoring records.
    pub live: Option<LogAddress>,
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_moni_target(mut self, target: MoniTarget) -> Self {
        self.moni_target = target;
        self
    }

    pub fn with_log(mut self, address: LogAddress) -> Self {
        self.log = Some(address);
        self
    }

    pub fn with_live(mut self, address: LogAddress) -> Self {
        self.live = Some(address);
        self
    }

    /// True if components are redirected to remote log endpoints.
    pub fn redirects_logging(&self) -> bool {
        self.log.is_some() || self.live.is_some()
    }
}
