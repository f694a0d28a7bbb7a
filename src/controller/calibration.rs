//! # Calibration Module
//!
//! Per-joystick calibration: which raw channel drives which machine axis,
//! where its center is, and which buttons are HOME and the memory slots.
//!
//! Calibration is captured once by the [`wizard`](super::wizard) and stored
//! as TOML:
//!
//! ```toml
//! [axes.x]
//! channel = 0
//! zero = 0
//! max_value = 32767
//!
//! [axes.y]
//! channel = 1
//! zero = 12
//! max_value = -32767   # pushing "up" reports negative values
//!
//! [axes.z]
//! channel = 4
//! zero = 0
//! max_value = -32767
//!
//! [buttons]
//! home = 316
//! memory = [304, 305, 307, 308]
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::error::{JogError, Result};
use crate::jog::vector::Axis;

/// Calibration of one machine axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisCalibration {
    /// Raw joystick axis channel.
    pub channel: u16,
    /// Raw value reported when the stick is centered.
    pub zero: i32,
    /// Signed full-scale deflection. The sign selects the direction that
    /// moves the machine towards positive coordinates. Never zero.
    pub max_value: i32,
}

/// Calibration of all three machine axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxesCalibration {
    pub x: AxisCalibration,
    pub y: AxisCalibration,
    pub z: AxisCalibration,
}

impl AxesCalibration {
    /// Calibration for the given axis.
    #[must_use]
    pub fn get(&self, axis: Axis) -> &AxisCalibration {
        match axis {
            Axis::X => &self.x,
            Axis::Y => &self.y,
            Axis::Z => &self.z,
        }
    }

    /// Mutable calibration for the given axis.
    pub fn get_mut(&mut self, axis: Axis) -> &mut AxisCalibration {
        match axis {
            Axis::X => &mut self.x,
            Axis::Y => &mut self.y,
            Axis::Z => &mut self.z,
        }
    }

    /// Take each axis' center from the stick's current reading.
    ///
    /// Sticks drift between calibration and use; the value read on connect
    /// is a better center than the stored one. Axes whose channel has no
    /// reading keep their calibrated zero.
    pub fn rezero(&mut self, readings: &HashMap<u16, i32>) {
        for axis in Axis::ALL {
            let cal = self.get_mut(axis);
            if let Some(&value) = readings.get(&cal.channel) {
                if value != cal.zero {
                    info!("Zero axis {} : {} (calibrated {})", axis, value, cal.zero);
                }
                cal.zero = value;
            }
        }
    }
}

/// Raw button channels bound to logical buttons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonCalibration {
    /// HOME button channel.
    pub home: u16,
    /// Memory slot channels; slot `i` is `memory[i]`.
    #[serde(default)]
    pub memory: Vec<u16>,
}

/// Complete joystick calibration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Calibration {
    pub axes: AxesCalibration,
    pub buttons: ButtonCalibration,
}

impl Calibration {
    /// Load calibration from a TOML file.
    ///
    /// # Errors
    ///
    /// - `CalibrationMissing` if the file does not exist
    /// - `Calibration` if it cannot be parsed or fails validation
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use jog_bridge::controller::calibration::Calibration;
    ///
    /// let cal = Calibration::load("config/calibration.toml")?;
    /// println!("{} memory slots", cal.buttons.memory.len());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(JogError::CalibrationMissing(format!(
                "{} not found, run `jog-bridge calibrate` first",
                path.display()
            )));
        }
        let contents = fs::read_to_string(path)?;
        let cal: Calibration = toml::from_str(&contents)
            .map_err(|e| JogError::Calibration(format!("{}: {}", path.display(), e)))?;
        cal.validate()?;
        info!(
            "Loaded calibration from {} ({} memory buttons)",
            path.display(),
            cal.buttons.memory.len()
        );
        Ok(cal)
    }

    /// Write calibration to a TOML file, creating parent directories.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let contents = toml::to_string(self)
            .map_err(|e| JogError::Calibration(format!("cannot serialize: {}", e)))?;
        fs::write(path, contents)?;
        info!("Wrote calibration to {}", path.display());
        Ok(())
    }

    /// Check that every axis has a usable full scale and that no two
    /// buttons share a channel.
    pub fn validate(&self) -> Result<()> {
        for axis in Axis::ALL {
            if self.axes.get(axis).max_value == 0 {
                return Err(JogError::Calibration(format!(
                    "axis {} has max_value 0",
                    axis
                )));
            }
        }

        let mut seen = HashSet::new();
        for &channel in std::iter::once(&self.buttons.home).chain(self.buttons.memory.iter()) {
            if !seen.insert(channel) {
                return Err(JogError::Calibration(format!(
                    "button channel {} assigned twice",
                    channel
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_calibration() -> Calibration {
    Calibration {
        axes: AxesCalibration {
            x: AxisCalibration { channel: 0, zero: 0, max_value: 1600 },
            y: AxisCalibration { channel: 1, zero: 0, max_value: -1600 },
            z: AxisCalibration { channel: 2, zero: 0, max_value: 1600 },
        },
        buttons: ButtonCalibration {
            home: 10,
            memory: vec![20, 21, 22],
        },
    }
}
