//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! This is the operator node's own configuration; the per-control transform
//! map is a separate JSON document referenced by `[controls].map_path` and
//! loaded by [`crate::transform::registry::ControlRegistry`].

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::Path;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub controller: ControllerConfig,
    pub controls: ControlsConfig,
    pub link: LinkConfig,
    pub telemetry: TelemetryConfig,
}

/// Gamepad discovery configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ControllerConfig {
    /// Explicit evdev device path; empty means auto-detect.
    #[serde(default)]
    pub device_path: String,

    /// Backoff between discovery attempts when no gamepad is present.
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
}

/// Control map configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ControlsConfig {
    #[serde(default = "default_map_path")]
    pub map_path: String,
}

/// Command link configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LinkConfig {
    /// Snapshot publish rate.
    #[serde(default = "default_command_rate_hz")]
    pub command_rate_hz: u32,

    /// Age after which an unchanged snapshot is logged as stale.
    #[serde(default = "default_staleness_timeout_ms")]
    pub staleness_timeout_ms: u64,
}

/// Command log configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    #[serde(default = "default_telemetry_enabled")]
    pub enabled: bool,

    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_max_records_per_file")]
    pub max_records_per_file: usize,

    #[serde(default = "default_max_files_to_keep")]
    pub max_files_to_keep: usize,
}

// Default value functions
fn default_retry_interval_ms() -> u64 { 1000 }

fn default_map_path() -> String { "config/controls.json".to_string() }

fn default_command_rate_hz() -> u32 { 50 }
fn default_staleness_timeout_ms() -> u64 { 5000 }

fn default_telemetry_enabled() -> bool { true }
fn default_log_dir() -> String { "./logs".to_string() }
fn default_max_records_per_file() -> usize { 10000 }
fn default_max_files_to_keep() -> usize { 10 }

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use rover_bridge::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        if self.controls.map_path.is_empty() {
            return Err(crate::error::RoverBridgeError::Config(
                toml::de::Error::custom("controls map_path cannot be empty")
            ));
        }

        if self.controller.retry_interval_ms == 0 || self.controller.retry_interval_ms > 60000 {
            return Err(crate::error::RoverBridgeError::Config(
                toml::de::Error::custom("retry_interval_ms must be between 1 and 60000")
            ));
        }

        if self.link.command_rate_hz == 0 || self.link.command_rate_hz > 1000 {
            return Err(crate::error::RoverBridgeError::Config(
                toml::de::Error::custom("command_rate_hz must be between 1 and 1000")
            ));
        }

        if self.link.staleness_timeout_ms == 0 || self.link.staleness_timeout_ms > 60000 {
            return Err(crate::error::RoverBridgeError::Config(
                toml::de::Error::custom("staleness_timeout_ms must be between 1 and 60000")
            ));
        }

        if self.telemetry.enabled && self.telemetry.log_dir.is_empty() {
            return Err(crate::error::RoverBridgeError::Config(
                toml::de::Error::custom("telemetry log_dir cannot be empty when enabled")
            ));
        }

        if self.telemetry.max_records_per_file == 0 {
            return Err(crate::error::RoverBridgeError::Config(
                toml::de::Error::custom("max_records_per_file must be greater than 0")
            ));
        }

        if self.telemetry.max_files_to_keep == 0 {
            return Err(crate::error::RoverBridgeError::Config(
                toml::de::Error::custom("max_files_to_keep must be greater than 0")
            ));
        }

        Ok(())
    }
}
