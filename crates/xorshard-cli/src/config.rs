//! Configuration system for the xorshard CLI.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use xorshard_core::JobOptions;

/// Upper bound on `transform.threads`
pub const MAX_THREADS: usize = 1024;

/// xorshard configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Transform configuration
    #[serde(default)]
    pub transform: TransformConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Transform configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformConfig {
    /// Worker count; 0 means one per CPU
    #[serde(default)]
    pub threads: usize,
    /// fsync output after writing
    #[serde(default)]
    pub sync_output: bool,
    /// Largest key or input file accepted, in bytes
    #[serde(default = "default_max_buffer_size", skip_serializing_if = "Option::is_none")]
    pub max_buffer_size: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

// Default values

fn default_max_buffer_size() -> Option<u64> {
    Some(1024 * 1024 * 1024) // 1 GiB
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            threads: 0,
            sync_output: false,
            max_buffer_size: default_max_buffer_size(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Config {
    /// Load configuration from file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to file
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let contents = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(path, contents)?;
        Ok(())
    }

    /// Get default config path
    #[must_use]
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/tmp"))
            .join("xorshard/config.toml")
    }

    /// Load config from `path`, creating it with defaults if it doesn't exist
    ///
    /// # Errors
    ///
    /// Returns an error if reading or creating the config fails.
    pub fn load_or_init<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();

        if path.exists() {
            Self::load(path)
        } else {
            let config = Self::default();
            config.save(path)?;
            Ok(config)
        }
    }

    /// Worker count to use, resolving 0 to the number of CPUs
    #[must_use]
    pub fn effective_threads(&self) -> usize {
        match self.transform.threads {
            0 => num_cpus::get().max(1),
            n => n,
        }
    }

    /// Job options derived from this configuration
    #[must_use]
    pub fn job_options(&self) -> JobOptions {
        JobOptions {
            sync_output: self.transform.sync_output,
            max_buffer_size: self.transform.max_buffer_size,
            ..JobOptions::default()
        }
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns an error if configuration is invalid.
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid log level: {}. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            );
        }

        if self.transform.threads > MAX_THREADS {
            anyhow::bail!(
                "Thread count must be between 0 (auto) and {}",
                MAX_THREADS
            );
        }

        if self.transform.max_buffer_size == Some(0) {
            anyhow::bail!("max_buffer_size must be greater than 0");
        }

        Ok(())
    }
}
