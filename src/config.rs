//! Configuration management for Drivelink
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files. The config path can be overridden through
//! the `DRIVELINK_CONFIG` environment variable.

use crate::error::{DriveLinkError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// One week
pub const MAX_REFRESH_INTERVAL_MINUTES: u64 = 7 * 24 * 60;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Vehicle cloud account
    pub account: AccountConfig,

    /// The single vehicle bridged by this instance
    pub vehicle: VehicleConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,
}

/// Vehicle cloud account parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountConfig {
    /// Server region (ROW, NORTH_AMERICA, CHINA)
    pub region: String,

    /// Bearer token presented to the vehicle cloud
    pub access_token: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Vehicle parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Vehicle identification number
    pub vin: String,

    /// Drive train as reported by discovery (CONV, PHEV, BEV, BEV_REX)
    pub drive_train: String,

    /// Data refresh rate in minutes
    pub refresh_interval_minutes: u64,

    /// Image viewport (FRONT, REAR, SIDE, DASHBOARD, DRIVERDOOR)
    pub image_viewport: String,

    /// Image edge length in pixels
    pub image_size: u32,

    /// Capability names known from discovery
    pub services_supported: Vec<String>,

    /// Remote command status polling interval in seconds
    pub remote_poll_interval_secs: u64,

    /// Max status polls per remote command
    pub remote_max_polls: u32,

    /// Charge profile edit session idle timeout in seconds
    pub edit_timeout_secs: u64,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rolling files)
    pub file: String,

    /// Number of rolled files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl Default for AccountConfig {
    fn default() -> Self {
        Self {
            region: "ROW".to_string(),
            access_token: String::new(),
            request_timeout_secs: 10,
        }
    }
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            vin: String::new(),
            drive_train: "CONV".to_string(),
            refresh_interval_minutes: 15,
            image_viewport: "FRONT".to_string(),
            image_size: 1024,
            services_supported: Vec::new(),
            remote_poll_interval_secs: 2,
            remote_max_polls: 30,
            edit_timeout_secs: 300,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/drivelink.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8089,
        }
    }
}

impl VehicleConfig {
    /// Electric and plug-in hybrid drive trains expose charging data
    pub fn is_electric(&self) -> bool {
        matches!(
            self.drive_train.to_uppercase().as_str(),
            "BEV" | "PHEV" | "BEV_REX"
        )
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first location that exists
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("DRIVELINK_CONFIG")
            && !path.is_empty()
        {
            return Self::from_file(path);
        }

        let default_paths = ["drivelink.yaml", "/etc/drivelink/config.yaml"];
        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.vehicle.vin.trim().is_empty() {
            return Err(DriveLinkError::config("vehicle.vin must be set"));
        }

        if self.account.access_token.trim().is_empty() {
            return Err(DriveLinkError::config("account.access_token must be set"));
        }

        if !matches!(
            self.account.region.to_uppercase().as_str(),
            "ROW" | "NORTH_AMERICA" | "CHINA"
        ) {
            return Err(DriveLinkError::config(format!(
                "Unknown account.region: {}",
                self.account.region
            )));
        }

        if self.vehicle.refresh_interval_minutes == 0 {
            return Err(DriveLinkError::config(
                "vehicle.refresh_interval_minutes must be greater than 0",
            ));
        }

        if self.vehicle.refresh_interval_minutes > MAX_REFRESH_INTERVAL_MINUTES {
            return Err(DriveLinkError::config(format!(
                "vehicle.refresh_interval_minutes must not exceed {}",
                MAX_REFRESH_INTERVAL_MINUTES
            )));
        }

        if self.vehicle.image_size == 0 {
            return Err(DriveLinkError::config(
                "vehicle.image_size must be greater than 0",
            ));
        }

        if self.vehicle.edit_timeout_secs == 0 {
            return Err(DriveLinkError::config(
                "vehicle.edit_timeout_secs must be greater than 0",
            ));
        }

        Ok(())
    }
}
