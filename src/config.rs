//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section and almost every key is optional; an empty file is a
//! valid configuration for a 305 mm cube machine on `/dev/ttyACM0`.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{JogError, Result};
use crate::gcode::command::DEFAULT_HOMING_COMMAND;
use crate::jog::engine::JogSettings;
use crate::jog::motion::Feedrates;
use crate::jog::vector::AxisVector;
use crate::serial::STANDARD_BAUD_RATES;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub joystick: JoystickConfig,
    #[serde(default)]
    pub machine: MachineConfig,
    #[serde(default)]
    pub jog: JogConfig,
    #[serde(default)]
    pub memory: MemoryConfig,
}

/// How G-code reaches the machine
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Serial port named in `port`
    #[default]
    Serial,
    /// stdin/stdout
    Stdio,
    /// No machine; commands are acknowledged by a simulation
    Simulate,
}

/// Command channel configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct SerialConfig {
    #[serde(default)]
    pub transport: Transport,

    /// Empty to auto-detect
    #[serde(default = "default_serial_port")]
    pub port: String,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_startup_wait_ms")]
    pub startup_wait_ms: u64,

    #[serde(default = "default_query_drain_ms")]
    pub query_drain_ms: u64,
}

/// Joystick configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct JoystickConfig {
    /// Empty to auto-detect
    #[serde(default)]
    pub device_path: String,

    #[serde(default = "default_calibration_file")]
    pub calibration_file: PathBuf,

    #[serde(default = "default_rumble_ms")]
    pub rumble_ms: u64,
}

/// Machine travel in mm along each axis
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct LimitsConfig {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Machine configuration
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct MachineConfig {
    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,

    #[serde(default = "default_feedrate_xy")]
    pub feedrate_xy: f32,

    #[serde(default = "default_feedrate_z")]
    pub feedrate_z: f32,

    #[serde(default = "default_motor_timeout_s")]
    pub motor_timeout_s: u64,

    #[serde(default = "default_homing_command")]
    pub homing_command: String,

    #[serde(default)]
    pub home_on_start: bool,
}

/// Control loop timing
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct JogConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_store_threshold_ms")]
    pub store_threshold_ms: u64,

    #[serde(default = "default_max_step_ms")]
    pub max_step_ms: u64,
}

/// Stored points persistence
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct MemoryConfig {
    /// Keep stored points in this file; session only if unset
    #[serde(default)]
    pub persist_file: Option<PathBuf>,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyACM0".to_string() }
fn default_baud_rate() -> u32 { 115_200 }
fn default_startup_wait_ms() -> u64 { 20_000 }
fn default_query_drain_ms() -> u64 { 100 }

fn default_calibration_file() -> PathBuf { PathBuf::from("config/calibration.toml") }
fn default_rumble_ms() -> u64 { 80 }

fn default_limits() -> LimitsConfig { LimitsConfig { x: 305.0, y: 305.0, z: 305.0 } }
fn default_feedrate_xy() -> f32 { 120.0 }
fn default_feedrate_z() -> f32 { 10.0 }
fn default_motor_timeout_s() -> u64 { 5 }
fn default_homing_command() -> String { DEFAULT_HOMING_COMMAND.to_string() }

fn default_poll_interval_ms() -> u64 { 20 }
fn default_store_threshold_ms() -> u64 { 500 }
fn default_max_step_ms() -> u64 { 100 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            transport: Transport::default(),
            port: default_serial_port(),
            baud_rate: default_baud_rate(),
            startup_wait_ms: default_startup_wait_ms(),
            query_drain_ms: default_query_drain_ms(),
        }
    }
}

impl Default for JoystickConfig {
    fn default() -> Self {
        Self {
            device_path: String::new(),
            calibration_file: default_calibration_file(),
            rumble_ms: default_rumble_ms(),
        }
    }
}

impl Default for MachineConfig {
    fn default() -> Self {
        Self {
            limits: default_limits(),
            feedrate_xy: default_feedrate_xy(),
            feedrate_z: default_feedrate_z(),
            motor_timeout_s: default_motor_timeout_s(),
            homing_command: default_homing_command(),
            home_on_start: false,
        }
    }
}

impl Default for JogConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            store_threshold_ms: default_store_threshold_ms(),
            max_step_ms: default_max_step_ms(),
        }
    }
}

impl LimitsConfig {
    /// Limits as a vector in X, Y, Z order.
    #[must_use]
    pub fn to_vector(self) -> AxisVector {
        AxisVector::new(self.x, self.y, self.z)
    }
}

impl std::str::FromStr for LimitsConfig {
    type Err = JogError;

    /// Parse `x,y,z`, e.g. `300,200,80`.
    fn from_str(s: &str) -> Result<Self> {
        let values = s
            .split(',')
            .map(|v| v.trim().parse::<f32>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| JogError::Config(format!("invalid limits '{}': {}", s, e)))?;

        match values.as_slice() {
            &[x, y, z] => Ok(Self { x, y, z }),
            _ => Err(JogError::Config(format!(
                "limits need exactly three values x,y,z, got '{}'",
                s
            ))),
        }
    }
}

fn invalid(msg: impl Into<String>) -> JogError {
    JogError::Config(msg.into())
}

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
    /// use jog_bridge::config::Config;
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
    /// Returns `Config` error if any value is out of its valid range
    pub fn validate(&self) -> Result<()> {
        if !STANDARD_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                STANDARD_BAUD_RATES
            )));
        }

        if self.serial.startup_wait_ms > 120_000 {
            return Err(invalid("startup_wait_ms must be at most 120000"));
        }

        if self.serial.query_drain_ms == 0 || self.serial.query_drain_ms > 10_000 {
            return Err(invalid("query_drain_ms must be between 1 and 10000"));
        }

        if self.joystick.calibration_file.as_os_str().is_empty() {
            return Err(invalid("calibration_file cannot be empty"));
        }

        if self.joystick.rumble_ms == 0 || self.joystick.rumble_ms > 5_000 {
            return Err(invalid("rumble_ms must be between 1 and 5000"));
        }

        let limits = &self.machine.limits;
        for (axis, limit) in [("x", limits.x), ("y", limits.y), ("z", limits.z)] {
            if !limit.is_finite() || limit <= 0.0 {
                return Err(invalid(format!("limits.{} must be greater than 0", axis)));
            }
        }

        for (name, value) in [
            ("feedrate_xy", self.machine.feedrate_xy),
            ("feedrate_z", self.machine.feedrate_z),
        ] {
            if !value.is_finite() || value <= 1.0 {
                return Err(invalid(format!("{} must be greater than 1 mm/s", name)));
            }
        }

        if self.machine.motor_timeout_s == 0 {
            return Err(invalid("motor_timeout_s must be greater than 0"));
        }

        if self.machine.homing_command.trim().is_empty() {
            return Err(invalid("homing_command cannot be empty"));
        }

        let jog = &self.jog;
        if jog.poll_interval_ms == 0 || jog.poll_interval_ms > 1_000 {
            return Err(invalid("poll_interval_ms must be between 1 and 1000"));
        }

        if jog.store_threshold_ms < jog.poll_interval_ms || jog.store_threshold_ms > 10_000 {
            return Err(invalid(
                "store_threshold_ms must be between poll_interval_ms and 10000",
            ));
        }

        if jog.max_step_ms < jog.poll_interval_ms || jog.max_step_ms > 1_000 {
            return Err(invalid("max_step_ms must be between poll_interval_ms and 1000"));
        }

        Ok(())
    }

    /// Engine parameters derived from this configuration.
    #[must_use]
    pub fn jog_settings(&self) -> JogSettings {
        JogSettings {
            poll_interval: Duration::from_millis(self.jog.poll_interval_ms),
            store_threshold: Duration::from_millis(self.jog.store_threshold_ms),
            max_step: Duration::from_millis(self.jog.max_step_ms),
            feedrates: Feedrates {
                xy: self.machine.feedrate_xy,
                z: self.machine.feedrate_z,
            },
            limits: self.machine.limits.to_vector(),
            motor_timeout: Duration::from_secs(self.machine.motor_timeout_s),
            home_on_start: self.machine.home_on_start,
            startup_wait: Duration::from_millis(self.serial.startup_wait_ms),
        }
    }
}
