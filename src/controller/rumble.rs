//! # Rumble Module
//!
//! Haptic feedback: a short full-strength rumble when a position is stored
//! or an axis runs into a machine limit. Feedback is best effort; failures
//! are logged and otherwise ignored.

use evdev::{
    Device, FFEffect, FFEffectData, FFEffectKind, FFEffectType, FFReplay, FFTrigger,
};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{JogError, Result};

/// Fire-and-forget haptic notification sink.
#[cfg_attr(test, mockall::automock)]
pub trait Haptics: Send {
    /// Start one rumble pulse and return immediately.
    fn rumble(&mut self);
}

/// Haptics sink for joysticks without force feedback.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoHaptics;

impl Haptics for NoHaptics {
    fn rumble(&mut self) {}
}

/// Force-feedback rumble through the joystick's evdev device.
///
/// Opens its own handle on the event device; the joystick event stream
/// keeps reading undisturbed.
pub struct EvdevRumble {
    // Keeps the effect uploaded; dropping the device would erase it.
    _device: Device,
    effect: FFEffect,
}

impl EvdevRumble {
    /// Upload a rumble effect of `duration` to the device at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Joystick` if the device cannot be opened, has no rumble
    /// support, or rejects the effect.
    pub fn open<P: AsRef<Path>>(path: P, duration: Duration) -> Result<Self> {
        let path = path.as_ref();
        let mut device = Device::open(path).map_err(|e| {
            JogError::Joystick(format!("Failed to open {} for rumble: {}", path.display(), e))
        })?;

        let supported = device
            .supported_ff()
            .map_or(false, |ff| ff.contains(FFEffectType::FF_RUMBLE));
        if !supported {
            return Err(JogError::Joystick(format!(
                "{} has no rumble support",
                path.display()
            )));
        }

        let data = FFEffectData {
            direction: 0,
            trigger: FFTrigger {
                button: 0,
                interval: 0,
            },
            replay: FFReplay {
                length: duration.as_millis().min(u128::from(u16::MAX)) as u16,
                delay: 0,
            },
            kind: FFEffectKind::Rumble {
                strong_magnitude: u16::MAX,
                weak_magnitude: u16::MAX,
            },
        };
        let effect = device
            .upload_ff_effect(data)
            .map_err(|e| JogError::Joystick(format!("Can't register rumble effect: {}", e)))?;

        info!("Rumble feedback enabled on {}", path.display());
        Ok(Self {
            _device: device,
            effect,
        })
    }

    /// Rumble if the device supports it, otherwise stay silent.
    pub fn open_or_silent<P: AsRef<Path>>(path: P, duration: Duration) -> Box<dyn Haptics> {
        match Self::open(path, duration) {
            Ok(rumble) => Box::new(rumble),
            Err(e) => {
                info!("No rumble available: {}", e);
                Box::new(NoHaptics)
            }
        }
    }
}

impl Haptics for EvdevRumble {
    fn rumble(&mut self) {
        if let Err(e) = self.effect.play(1) {
            debug!("rumble failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_haptics_is_silent() {
        let mut haptics = NoHaptics;
        haptics.rumble();
    }

    #[test]
    fn test_open_missing_device_fails() {
        let result = EvdevRumble::open("/dev/input/nonexistent_event_42", Duration::from_millis(80));
        assert!(matches!(result, Err(JogError::Joystick(_))));
    }

    #[test]
    fn test_open_or_silent_falls_back() {
        let mut haptics =
            EvdevRumble::open_or_silent("/dev/input/nonexistent_event_42", Duration::from_millis(80));
        haptics.rumble();
    }
}
