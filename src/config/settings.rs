//! Configuration settings and validation.

use crate::storage::ConnectionOptions;
use crate::{Error, Result};
use std::path::PathBuf;

/// File name of the history database inside the data directory.
const HISTORY_FILE_NAME: &str = "History";

/// Main configuration for the history store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the history database.
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON.
    pub log_json: bool,

    /// Page cache size, in pages.
    pub cache_size: i64,

    /// Page size in bytes for newly created files.
    pub page_size: u32,

    /// Take an exclusive lock on the file after init.
    pub exclusive: bool,
}

impl Default for Config {
    fn default() -> Self {
        let options = ConnectionOptions::default();
        Self {
            data_dir: PathBuf::from("./data"),
            log_level: "info".to_string(),
            log_json: false,
            cache_size: options.cache_size,
            page_size: options.page_size,
            exclusive: false,
        }
    }
}

impl Config {
    /// Create a new configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate configuration values.
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration value is invalid.
    pub fn validate(&self) -> Result<()> {
        // Validate log level
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(Error::config(format!(
                "invalid log level '{}', must be one of: {}",
                self.log_level,
                valid_levels.join(", ")
            )));
        }

        if !self.page_size.is_power_of_two() || !(512..=65536).contains(&self.page_size) {
            return Err(Error::config(format!(
                "page_size must be a power of two between 512 and 65536, got {}",
                self.page_size
            )));
        }

        if self.cache_size <= 0 {
            return Err(Error::config("cache_size must be positive"));
        }

        if self.data_dir.as_os_str().is_empty() {
            return Err(Error::config("data_dir cannot be empty"));
        }

        Ok(())
    }

    /// Get the path to the history database file.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(HISTORY_FILE_NAME)
    }

    /// Connection settings derived from this configuration.
    #[must_use]
    pub const fn connection_options(&self) -> ConnectionOptions {
        ConnectionOptions {
            page_size: self.page_size,
            cache_size: self.cache_size,
        }
    }
}
