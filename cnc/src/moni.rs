//! Monitoring sink boundary.
//!
//! Monitoring records are `(name, value, priority)` triples forwarded to the
//! experiment's live-monitoring service. The transport is external; this
//! module only defines the interface and the priority classes.

use crate::value::BeanValue;
use std::fmt;
use std::str::FromStr;

/// Delivery class of a monitoring record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Priority {
    /// High-frequency operational values.
    Its,
    /// Low-frequency summaries that may be mailed to operators.
    Email,
    Scp,
    Debug,
}

impl Priority {
    /// Numeric code used on the wire.
    pub fn code(&self) -> u32 {
        match self {
            Priority::Its => 123,
            Priority::Email => 444,
            Priority::Scp => 555,
            Priority::Debug => 666,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Its => "ITS",
            Priority::Email => "EMAIL",
            Priority::Scp => "SCP",
            Priority::Debug => "DEBUG",
        };
        f.write_str(name)
    }
}

/// Receiver of monitoring records.
pub trait MoniSink: Send + Sync {
    /// Sends one record. Returns `false` if the record could not be queued.
    fn send_moni(&self, name: &str, value: BeanValue, priority: Priority) -> bool;
}

/// Where per-component MBean snapshots go during a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MoniTarget {
    None,
    File,
    #[default]
    Live,
    Both,
}

impl MoniTarget {
    pub fn to_file(&self) -> bool {
        matches!(self, MoniTarget::File | MoniTarget::Both)
    }

    pub fn to_live(&self) -> bool {
        matches!(self, MoniTarget::Live | MoniTarget::Both)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MoniTarget::None => "none",
            MoniTarget::File => "file",
            MoniTarget::Live => "live",
            MoniTarget::Both => "both",
        }
    }
}

impl FromStr for MoniTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(MoniTarget::None),
            "file" => Ok(MoniTarget::File),
            "live" => Ok(MoniTarget::Live),
            "both" => Ok(MoniTarget::Both),
            other => Err(format!("unknown monitoring target '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_codes() {
        assert_eq!(Priority::Its.code(), 123);
        assert_eq!(Priority::Email.code(), 444);
        assert_eq!(Priority::Email.to_string(), "EMAIL");
    }

    #[test]
    fn test_moni_target_parse() {
        assert_eq!("Both".parse::<MoniTarget>().unwrap(), MoniTarget::Both);
        assert!("live".parse::<MoniTarget>().unwrap().to_live());
        assert!(!MoniTarget::Live.to_file());
        assert!("stdout".parse::<MoniTarget>().is_err());
    }
}
