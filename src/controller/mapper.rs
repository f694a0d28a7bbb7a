//! # Controller Input Mapper Module
//!
//! Turns raw joystick events into machine-level meaning using the
//! [`Calibration`](super::calibration::Calibration):
//!
//! - [`AxisMapper`]: axis event -> velocity component for X, Y or Z
//! - [`ButtonRouter`]: button event -> logical button transition
//!
//! ## Velocity Quantization
//!
//! Raw deflection is quantized to 1/16 of full scale before scaling, so
//! small jitter around center produces no motion at all:
//!
//! ```text
//! normalized = raw - zero
//! quantum    = |max_value| / 16          (integer division)
//! quantized  = normalized / quantum * quantum   (truncates toward zero)
//! velocity   = quantized / max_value
//! ```
//!
//! ## Usage
//!
//! ```
//! use jog_bridge::controller::calibration::{AxesCalibration, AxisCalibration};
//! use jog_bridge::controller::mapper::AxisMapper;
//! use jog_bridge::jog::vector::Axis;
//!
//! let axis = AxisCalibration { channel: 0, zero: 0, max_value: 1600 };
//! let mapper = AxisMapper::new(AxesCalibration {
//!     x: axis,
//!     y: AxisCalibration { channel: 1, ..axis },
//!     z: AxisCalibration { channel: 2, ..axis },
//! });
//!
//! assert_eq!(mapper.map(0, 850), Some((Axis::X, 0.5)));
//! assert_eq!(mapper.map(1, 40), Some((Axis::Y, 0.0))); // dead zone
//! assert_eq!(mapper.map(9, 850), None);                // not an axis of ours
//! ```

use super::calibration::{AxesCalibration, AxisCalibration, ButtonCalibration};
use crate::jog::vector::Axis;

/// Number of velocity steps per direction.
pub const VELOCITY_STEPS: i32 = 16;

/// Logical button roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    /// Re-home the machine.
    Home,
    /// Store / recall memory slot `n`.
    Memory(usize),
}

/// A logical button changing state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonTransition {
    pub button: Button,
    pub pressed: bool,
}

/// Maps raw axis events to per-axis velocity components.
#[derive(Debug, Clone)]
pub struct AxisMapper {
    axes: AxesCalibration,
}

impl AxisMapper {
    #[must_use]
    pub fn new(axes: AxesCalibration) -> Self {
        Self { axes }
    }

    /// Map a raw axis event.
    ///
    /// Returns `None` when `channel` is not bound to any machine axis.
    /// If several axes share a channel, the first in X, Y, Z order wins.
    #[must_use]
    pub fn map(&self, channel: u16, raw_value: i32) -> Option<(Axis, f32)> {
        Axis::ALL.into_iter().find_map(|axis| {
            let cal = self.axes.get(axis);
            (cal.channel == channel).then(|| (axis, quantized_velocity(cal, raw_value)))
        })
    }
}

/// Quantized velocity in -1.0..=1.0 for a raw value.
///
/// Values beyond the calibrated full scale are clamped.
#[must_use]
pub fn quantized_velocity(cal: &AxisCalibration, raw_value: i32) -> f32 {
    if cal.max_value == 0 {
        return 0.0;
    }
    let normalized = raw_value.saturating_sub(cal.zero);
    // A full scale below 16 would give a zero quantum; fall back to raw steps.
    let quantum = (cal.max_value.unsigned_abs() as i32 / VELOCITY_STEPS).max(1);
    let quantized = normalized / quantum * quantum;
    (quantized as f32 / cal.max_value as f32).clamp(-1.0, 1.0)
}

/// Routes raw button events to logical buttons.
#[derive(Debug, Clone)]
pub struct ButtonRouter {
    buttons: ButtonCalibration,
}

impl ButtonRouter {
    #[must_use]
    pub fn new(buttons: ButtonCalibration) -> Self {
        Self { buttons }
    }

    /// Number of memory slots.
    #[must_use]
    pub fn memory_slots(&self) -> usize {
        self.buttons.memory.len()
    }

    /// Route a raw button event; unbound channels yield `None`.
    #[must_use]
    pub fn route(&self, channel: u16, value: i32) -> Option<ButtonTransition> {
        let button = if channel == self.buttons.home {
            Button::Home
        } else {
            let slot = self.buttons.memory.iter().position(|&c| c == channel)?;
            Button::Memory(slot)
        };
        Some(ButtonTransition {
            button,
            pressed: value != 0,
        })
    }
}
