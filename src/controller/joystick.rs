//! # Joystick Module
//!
//! Joystick detection, connection and event reading using the Linux evdev
//! interface.
//!
//! ## Detection
//!
//! Without an explicit device path, the first `/dev/input/event*` device
//! that has an `ABS_X` axis and a joystick or gamepad button
//! (`BTN_TRIGGER` / `BTN_SOUTH`) is used.
//!
//! ## Axis Values
//!
//! evdev reports axes in a device specific range (0-255 for most gamepads,
//! 0-1023 for many flight sticks). Values are rescaled to -32767..=32767,
//! the same range the kernel joystick API uses, so calibration files and
//! wizard thresholds do not depend on the device.

use async_trait::async_trait;
use evdev::{AbsoluteAxisType, Device, EventStream, EventType, Key};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::event::{InputEventSource, JoyEvent, Wait};
use crate::error::{JogError, Result};

/// Full scale of rescaled axis values.
pub const AXIS_FULL_SCALE: i32 = 32767;

/// Reported range of one evdev axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisRange {
    pub minimum: i32,
    pub maximum: i32,
}

impl AxisRange {
    /// Rescale a raw reading to -32767..=32767.
    ///
    /// # Examples
    ///
    /// ```
    /// use jog_bridge::controller::joystick::AxisRange;
    ///
    /// let range = AxisRange { minimum: 0, maximum: 255 };
    /// assert_eq!(range.rescale(0), -32767);
    /// assert_eq!(range.rescale(255), 32767);
    /// ```
    #[must_use]
    pub fn rescale(&self, value: i32) -> i32 {
        let span = i64::from(self.maximum) - i64::from(self.minimum);
        if span <= 0 {
            return value;
        }
        let offset = i64::from(value.clamp(self.minimum, self.maximum)) - i64::from(self.minimum);
        let full = 2 * i64::from(AXIS_FULL_SCALE);
        (offset * full / span - i64::from(AXIS_FULL_SCALE)) as i32
    }
}

/// Joystick handle reading events through an async evdev stream.
pub struct Joystick {
    stream: EventStream,
    device_path: PathBuf,
    name: String,
    ranges: HashMap<u16, AxisRange>,
    initial: HashMap<u16, i32>,
}

impl std::fmt::Debug for Joystick {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Joystick")
            .field("device_path", &self.device_path)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Joystick {
    /// Open the joystick at `path`, or auto-detect one when `path` is empty.
    ///
    /// # Errors
    ///
    /// - `JoystickNotFound`: no suitable device on the system
    /// - `Joystick`: the device exists but cannot be opened or queried
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use jog_bridge::controller::joystick::Joystick;
    ///
    /// # async fn run() -> jog_bridge::error::Result<()> {
    /// let joystick = Joystick::open("")?;
    /// println!("Connected to {} at {}", joystick.name(), joystick.device_path().display());
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(path: &str) -> Result<Self> {
        let device_path = if path.is_empty() {
            find_joystick()?
        } else {
            PathBuf::from(path)
        };

        let device = Device::open(&device_path).map_err(|e| {
            JogError::Joystick(format!("Failed to open {}: {}", device_path.display(), e))
        })?;
        let name = device.name().unwrap_or("unknown-joystick").to_string();
        let (ranges, initial) = axis_state(&device)?;

        let stream = device.into_event_stream().map_err(|e| {
            JogError::Joystick(format!("Failed to stream {}: {}", device_path.display(), e))
        })?;

        info!("Opened joystick '{}' at {}", name, device_path.display());
        Ok(Self {
            stream,
            device_path,
            name,
            ranges,
            initial,
        })
    }

    /// The `/dev/input/eventX` path in use.
    pub fn device_path(&self) -> &Path {
        &self.device_path
    }

    /// Human-readable device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Rescaled axis readings at the time the device was opened, by channel.
    pub fn initial_axis_values(&self) -> &HashMap<u16, i32> {
        &self.initial
    }

    /// Convert an evdev event; `None` for anything that is not an axis
    /// movement or a button press/release (sync, key repeat, misc).
    fn convert(&self, event: &evdev::InputEvent) -> Option<JoyEvent> {
        match event.event_type() {
            EventType::ABSOLUTE => {
                let value = match self.ranges.get(&event.code()) {
                    Some(range) => range.rescale(event.value()),
                    None => event.value(),
                };
                Some(JoyEvent::axis(event.code(), value))
            }
            EventType::KEY if event.value() == 0 || event.value() == 1 => {
                Some(JoyEvent::button(event.code(), event.value() == 1))
            }
            _ => None,
        }
    }
}

#[async_trait]
impl InputEventSource for Joystick {
    async fn wait_event(&mut self, timeout: Duration) -> Result<Wait> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let next = tokio::time::timeout_at(deadline, self.stream.next_event()).await;
            match next {
                Err(_) => return Ok(Wait::Timeout),
                Ok(Err(e)) => {
                    return Err(JogError::DeviceRead(format!(
                        "{}: {}",
                        self.device_path.display(),
                        e
                    )))
                }
                Ok(Ok(event)) => {
                    if let Some(joy) = self.convert(&event) {
                        return Ok(Wait::Event(joy));
                    }
                }
            }
        }
    }
}

/// Scan `/dev/input` for the first device that looks like a joystick.
fn find_joystick() -> Result<PathBuf> {
    let input_dir = Path::new("/dev/input");
    if !input_dir.exists() {
        return Err(JogError::Joystick("/dev/input directory not found".to_string()));
    }

    let mut entries: Vec<PathBuf> = std::fs::read_dir(input_dir)
        .map_err(|e| JogError::Joystick(format!("Failed to read /dev/input: {}", e)))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.file_name()
                .map(|f| f.to_string_lossy().starts_with("event"))
                .unwrap_or(false)
        })
        .collect();

    // Deterministic choice when several joysticks are connected
    entries.sort();

    for path in entries {
        match Device::open(&path) {
            Ok(device) => {
                debug!(
                    "Found input device: {} ({})",
                    path.display(),
                    device.name().unwrap_or("?")
                );
                if looks_like_joystick(&device) {
                    return Ok(path);
                }
            }
            Err(e) => debug!("Could not open {}: {}", path.display(), e),
        }
    }

    Err(JogError::JoystickNotFound)
}

fn looks_like_joystick(device: &Device) -> bool {
    let has_stick = device
        .supported_absolute_axes()
        .map_or(false, |axes| axes.contains(AbsoluteAxisType::ABS_X));
    let has_buttons = device.supported_keys().map_or(false, |keys| {
        keys.contains(Key::BTN_TRIGGER) || keys.contains(Key::BTN_SOUTH)
    });
    has_stick && has_buttons
}

/// Range and current (rescaled) reading of every absolute axis.
fn axis_state(device: &Device) -> Result<(HashMap<u16, AxisRange>, HashMap<u16, i32>)> {
    let mut ranges = HashMap::new();
    let mut initial = HashMap::new();
    let Some(axes) = device.supported_absolute_axes() else {
        return Ok((ranges, initial));
    };
    let state = device
        .get_abs_state()
        .map_err(|e| JogError::Joystick(format!("Failed to query axis state: {}", e)))?;

    for axis in axes.iter() {
        let Some(info) = state.get(axis.0 as usize) else {
            continue;
        };
        let range = AxisRange {
            minimum: info.minimum,
            maximum: info.maximum,
        };
        initial.insert(axis.0, range.rescale(info.value));
        ranges.insert(axis.0, range);
    }
    Ok((ranges, initial))
}
