//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use serde::de::Error;
use std::fs;
use std::path::Path;

use crate::error::Result;
use crate::pulses::protocol::{Protocol, ProtocolKind};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub module: ModuleConfig,
    pub ppm: PpmConfig,
    pub soft_serial: SoftSerialConfig,
    pub service: ServiceConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// External module configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ModuleConfig {
    #[serde(default = "default_protocol")]
    pub protocol: ProtocolKind,

    #[serde(default = "default_frame_period_ms")]
    pub frame_period_ms: u64,

    /// Simulated DMA transfer duration
    #[serde(default = "default_transfer_time_us")]
    pub transfer_time_us: u64,
}

/// PPM output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct PpmConfig {
    #[serde(default = "default_ppm_delay_us")]
    pub delay_us: u16,

    /// true = inverted output (idle high, pulses low)
    #[serde(default)]
    pub polarity: bool,

    #[serde(default = "default_ppm_channels")]
    pub channels: usize,

    #[serde(default = "default_ppm_pulse_us")]
    pub pulse_us: u16,
}

/// 100 kbit soft serial configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SoftSerialConfig {
    /// true = active high output
    #[serde(default = "default_soft_serial_polarity")]
    pub polarity: bool,
}

/// Driver service configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ServiceConfig {
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    #[serde(default = "default_stats_interval_frames")]
    pub stats_interval_frames: u64,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct LoggingConfig {
    /// Also write logs to this file when set
    #[serde(default)]
    pub file: Option<String>,
}

// Default value functions
fn default_protocol() -> ProtocolKind { ProtocolKind::Ppm }
fn default_frame_period_ms() -> u64 { 20 }
fn default_transfer_time_us() -> u64 { 2000 }

fn default_ppm_delay_us() -> u16 { 300 }
fn default_ppm_channels() -> usize { 8 }
fn default_ppm_pulse_us() -> u16 { 1500 }

fn default_soft_serial_polarity() -> bool { true }

fn default_queue_depth() -> usize { 16 }
fn default_stats_interval_frames() -> u64 { 250 }

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
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
    /// use extmodule_pulses::config::Config;
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

    /// Runtime protocol selector built from the configured sections
    pub fn protocol(&self) -> Protocol {
        match self.module.protocol {
            ProtocolKind::Ppm => Protocol::Ppm {
                delay_us: self.ppm.delay_us,
                polarity: self.ppm.polarity,
            },
            ProtocolKind::Pxx1 => Protocol::Pxx1,
            ProtocolKind::Crsf => Protocol::Crsf,
            ProtocolKind::Afhds3 => Protocol::Afhds3,
            ProtocolKind::SoftSerial100k => Protocol::SoftSerial100k {
                polarity: self.soft_serial.polarity,
            },
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        // Validate module timing
        if self.module.frame_period_ms == 0 || self.module.frame_period_ms > 100 {
            return Err(crate::error::ExtModuleError::Config(
                toml::de::Error::custom("frame_period_ms must be between 1 and 100")
            ));
        }

        let frame_period_us = self.module.frame_period_ms * 1000;

        if self.module.transfer_time_us == 0 || self.module.transfer_time_us >= frame_period_us {
            return Err(crate::error::ExtModuleError::Config(
                toml::de::Error::custom("transfer_time_us must be greater than 0 and shorter than the frame period")
            ));
        }

        // Validate PPM output
        if self.ppm.delay_us < 100 || self.ppm.delay_us > 800 {
            return Err(crate::error::ExtModuleError::Config(
                toml::de::Error::custom("ppm delay_us must be between 100 and 800")
            ));
        }

        if self.ppm.channels == 0 || self.ppm.channels > 16 {
            return Err(crate::error::ExtModuleError::Config(
                toml::de::Error::custom("ppm channels must be between 1 and 16")
            ));
        }

        if self.ppm.pulse_us < 800 || self.ppm.pulse_us > 2200 {
            return Err(crate::error::ExtModuleError::Config(
                toml::de::Error::custom("ppm pulse_us must be between 800 and 2200")
            ));
        }

        // Channel pulses plus the sync gap must fit in one frame
        if self.module.protocol == ProtocolKind::Ppm {
            let pulses_us = self.ppm.channels as u64 * u64::from(self.ppm.pulse_us);
            if pulses_us + crate::frames::PPM_MIN_SYNC_US >= frame_period_us {
                return Err(crate::error::ExtModuleError::Config(
                    toml::de::Error::custom(format!(
                        "{} ppm channels of {}us do not fit in a {}ms frame",
                        self.ppm.channels, self.ppm.pulse_us, self.module.frame_period_ms
                    ))
                ));
            }
        }

        // Validate service
        if self.service.queue_depth == 0 {
            return Err(crate::error::ExtModuleError::Config(
                toml::de::Error::custom("queue_depth must be greater than 0")
            ));
        }

        if self.service.stats_interval_frames == 0 {
            return Err(crate::error::ExtModuleError::Config(
                toml::de::Error::custom("stats_interval_frames must be greater than 0")
            ));
        }

        // Validate logging
        if matches!(&self.logging.file, Some(file) if file.is_empty()) {
            return Err(crate::error::ExtModuleError::Config(
                toml::de::Error::custom("logging file cannot be empty when set")
            ));
        }

        Ok(())
    }
}
