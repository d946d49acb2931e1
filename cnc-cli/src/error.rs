//! CLI error handling with user-friendly messages.

use cnc::config::ConfigFileError;
use cnc::connection::ConnectionError;
use cnc::run_config::RunConfigError;
use std::fmt;
use std::process;

/// CLI-specific errors with user-friendly messages.
#[derive(Debug)]
pub enum CliError {
    /// Failed to initialize logging
    LoggingInit(String),
    /// Configuration file error
    Config(ConfigFileError),
    /// Run configuration could not be loaded
    RunConfig(RunConfigError),
    /// Component layout file could not be read or parsed
    Layout(String),
    /// Connector graph is not valid
    Connections(ConnectionError),
    /// Run configuration names components the layout lacks
    MissingComponents(Vec<String>),
}

impl CliError {
    /// Exit the process with an appropriate error message and code.
    pub fn exit(&self) -> ! {
        eprintln!("Error: {}", self);

        if let CliError::Config(ConfigFileError::InvalidValue { .. }) = self {
            eprintln!();
            eprintln!("Run 'cncserver config init --force' to write a fresh default file.");
        }

        process::exit(1)
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::LoggingInit(msg) => write!(f, "Failed to initialize logging: {}", msg),
            CliError::Config(e) => write!(f, "{}", e),
            CliError::RunConfig(e) => write!(f, "{}", e),
            CliError::Layout(msg) => write!(f, "Bad component layout: {}", msg),
            CliError::Connections(e) => write!(f, "Invalid connector graph: {}", e),
            CliError::MissingComponents(names) => {
                write!(f, "Layout lacks components: {}", names.join(", "))
            }
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigFileError> for CliError {
    fn from(e: ConfigFileError) -> Self {
        CliError::Config(e)
    }
}

impl From<RunConfigError> for CliError {
    fn from(e: RunConfigError) -> Self {
        CliError::RunConfig(e)
    }
}

impl From<ConnectionError> for CliError {
    fn from(e: ConnectionError) -> Self {
        CliError::Connections(e)
    }
}
