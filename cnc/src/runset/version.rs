//! Release identification recorded with every run.

use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionInfo {
    pub release: String,
    pub revision: String,
}

impl VersionInfo {
    pub fn new(release: impl Into<String>, revision: impl Into<String>) -> Self {
        Self {
            release: release.into(),
            revision: revision.into(),
        }
    }

    /// Version of this build of the control server.
    pub fn current() -> Self {
        Self::new(crate::VERSION, "local")
    }
}

impl fmt::Display for VersionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.release, self.revision)
    }
}
