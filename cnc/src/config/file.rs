//! Loading and saving the configuration file.

use super::settings::CncConfig;
use ini::Ini;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigFileError {
    /// Failed to read config file
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] ini::Error),

    /// Failed to write config file
    #[error("Failed to write config file: {0}")]
    WriteError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    /// Failed to create config directory
    #[error("Failed to create config directory: {0}")]
    DirectoryError(std::io::Error),
}

impl CncConfig {
    /// Load configuration from the default path (~/.pdaq/cncserver.ini).
    pub fn load() -> Result<Self, ConfigFileError> {
        Self::load_from(&config_file_path())
    }

    /// Load configuration from a specific path.
    ///
    /// If the file doesn't exist, returns defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigFileError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        super::parser::parse_ini(&ini)
    }

    /// Parses configuration text.
    pub fn from_ini_str(text: &str) -> Result<Self, ConfigFileError> {
        let ini = Ini::load_from_str(text).map_err(ini::Error::Parse)?;
        super::parser::parse_ini(&ini)
    }

    /// Renders the configuration as commented INI text.
    pub fn to_ini_string(&self) -> String {
        super::writer::to_config_string(self)
    }

    /// Save configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigFileError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(ConfigFileError::DirectoryError)?;
        }
        std::fs::write(path, self.to_ini_string())
            .map_err(|e| ConfigFileError::WriteError(e.to_string()))
    }

    /// Create the config file with defaults if it doesn't exist.
    ///
    /// Returns the path to the config file.
    pub fn ensure_exists(path: &Path) -> Result<PathBuf, ConfigFileError> {
        if !path.exists() {
            Self::default().save_to(path)?;
        }
        Ok(path.to_path_buf())
    }
}

/// Get the path to the config directory (~/.pdaq).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".pdaq")
}

/// Get the path to the config file (~/.pdaq/cncserver.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("cncserver.ini")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moni::MoniTarget;

    #[test]
    fn test_load_nonexistent_returns_defaults() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let config = CncConfig::load_from(&temp_dir.path().join("nonexistent.ini")).unwrap();

        assert_eq!(config, CncConfig::default());
        assert_eq!(config.moni.target, MoniTarget::Live);
    }

    #[test]
    fn test_save_then_load() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("pdaq").join("cncserver.ini");

        let mut config = CncConfig::default();
        config.runset.stop_timeout = 90;
        config.paths.daq_data_dir = Some(temp_dir.path().join("data"));
        config.moni.target = MoniTarget::Both;
        config.save_to(&path).unwrap();

        let loaded = CncConfig::load_from(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_ensure_exists_writes_defaults_once() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("cncserver.ini");

        CncConfig::ensure_exists(&path).unwrap();
        assert!(path.exists());
        std::fs::write(&path, "[rpc]\ntimeout = 5\n").unwrap();

        CncConfig::ensure_exists(&path).unwrap();
        assert_eq!(CncConfig::load_from(&path).unwrap().rpc.timeout, 5);
    }

    #[test]
    fn test_config_file_path() {
        assert!(config_file_path().ends_with(".pdaq/cncserver.ini"));
    }
}
