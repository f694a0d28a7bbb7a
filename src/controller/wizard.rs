//! # Calibration Wizard
//!
//! Guided one-shot capture of a [`Calibration`]: the user pushes each stick
//! to its extreme, lets it go back to center, then presses the HOME button
//! followed by any number of memory buttons. Pressing HOME again finishes.
//!
//! Works over any [`InputEventSource`], so it is driven by scripted events
//! in tests and by the real joystick in the `calibrate` subcommand.

use std::time::Duration;
use tokio::time::Instant;
use tracing::info;

use super::calibration::{AxesCalibration, AxisCalibration, ButtonCalibration, Calibration};
use super::event::{EventKind, InputEventSource, JoyEvent, Wait};
use super::joystick::AXIS_FULL_SCALE;
use crate::error::Result;
use crate::jog::vector::Axis;

/// Deflection that counts as "all the way".
const FULL_DEFLECTION: i32 = 32000;

/// Deflection below which a stick counts as back at center.
const CENTER_BAND: i32 = 5000;

/// Time to keep reading after the stick came back, the last value wins.
const SETTLE_TIME: Duration = Duration::from_millis(100);

/// Wait slice between prompts; timeouts are simply waited through.
const POLL: Duration = Duration::from_secs(1);

/// Run the interactive calibration.
///
/// `prompt` receives each instruction for the user.
///
/// # Errors
///
/// Propagates joystick read errors.
pub async fn run<S, F>(source: &mut S, mut prompt: F) -> Result<Calibration>
where
    S: InputEventSource + ?Sized,
    F: FnMut(&str),
{
    let mut axes = AxesCalibration {
        x: AxisCalibration { channel: 0, zero: 0, max_value: AXIS_FULL_SCALE },
        y: AxisCalibration { channel: 1, zero: 0, max_value: AXIS_FULL_SCALE },
        z: AxisCalibration { channel: 2, zero: 0, max_value: AXIS_FULL_SCALE },
    };

    for (axis, text) in [
        (Axis::X, "Move X all the way to the right ->"),
        (Axis::Y, "Move Y all the way up ^"),
        (Axis::Z, "Move Z all the way up ^"),
    ] {
        prompt(text);
        let cal = axes.get_mut(axis);
        let (channel, max_value) = find_deflected_axis(source).await?;
        cal.channel = channel;
        cal.max_value = max_value;
        prompt("Thanks. Now move back to center.");
        cal.zero = wait_for_center(source, channel).await?;
        info!(
            "Axis {}: channel {} zero {} max {}",
            axis, cal.channel, cal.zero, cal.max_value
        );
    }

    prompt("Press HOME button.");
    let home = wait_button_press(source, &[]).await?;
    prompt("Thanks. Now release.");
    wait_button_release(source, home).await?;

    let mut memory = Vec::new();
    loop {
        prompt(&format!(
            "Press memory button {} (or HOME to finish).",
            memory.len() + 1
        ));
        let channel = wait_button_press(source, &memory).await?;
        wait_button_release(source, channel).await?;
        if channel == home {
            break;
        }
        memory.push(channel);
    }

    let calibration = Calibration {
        axes,
        buttons: ButtonCalibration { home, memory },
    };
    calibration.validate()?;
    Ok(calibration)
}

async fn next_event<S>(source: &mut S, timeout: Duration) -> Result<Option<JoyEvent>>
where
    S: InputEventSource + ?Sized,
{
    match source.wait_event(timeout).await? {
        Wait::Event(event) => Ok(Some(event)),
        Wait::Timeout => Ok(None),
    }
}

async fn find_deflected_axis<S>(source: &mut S) -> Result<(u16, i32)>
where
    S: InputEventSource + ?Sized,
{
    loop {
        if let Some(e) = next_event(source, POLL).await? {
            if e.kind == EventKind::Axis && e.value.abs() > FULL_DEFLECTION {
                return Ok((e.channel, e.value.signum() * AXIS_FULL_SCALE));
            }
        }
    }
}

async fn wait_for_center<S>(source: &mut S, channel: u16) -> Result<i32>
where
    S: InputEventSource + ?Sized,
{
    let mut zero = loop {
        if let Some(e) = next_event(source, POLL).await? {
            if e.kind == EventKind::Axis && e.channel == channel && e.value.abs() < CENTER_BAND {
                break e.value;
            }
        }
    };

    let end = Instant::now() + SETTLE_TIME;
    while let Some(left) = end.checked_duration_since(Instant::now()).filter(|d| !d.is_zero()) {
        if let Some(e) = next_event(source, left).await? {
            if e.kind == EventKind::Axis && e.channel == channel {
                zero = e.value;
            }
        }
    }
    Ok(zero)
}

async fn wait_button_press<S>(source: &mut S, taken: &[u16]) -> Result<u16>
where
    S: InputEventSource + ?Sized,
{
    loop {
        if let Some(e) = next_event(source, POLL).await? {
            if e.kind == EventKind::Button && e.value > 0 {
                if taken.contains(&e.channel) {
                    info!("Button {} is already assigned, ignoring", e.channel);
                    continue;
                }
                return Ok(e.channel);
            }
        }
    }
}

async fn wait_button_release<S>(source: &mut S, channel: u16) -> Result<()>
where
    S: InputEventSource + ?Sized,
{
    loop {
        if let Some(e) = next_event(source, POLL).await? {
            if e.kind == EventKind::Button && e.channel == channel && e.value == 0 {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JogError;
    use crate::controller::event::mocks::{ScriptedEvents, Step};

    fn axis(channel: u16, value: i32) -> Step {
        Step::Event(JoyEvent::axis(channel, value))
    }

    fn button(channel: u16, pressed: bool) -> Step {
        Step::Event(JoyEvent::button(channel, pressed))
    }

    fn script() -> Vec<Step> {
        vec![
            // X: channel 0 pushed right, noise on another channel first
            axis(3, 1200),
            axis(0, 20000),
            axis(0, 32767),
            axis(0, 3000),
            axis(0, 150),
            Step::Idle,
            // Y: channel 1, "up" reports negative
            axis(1, -32767),
            axis(1, -100),
            Step::Idle,
            // Z: channel 4, also inverted
            axis(4, -32767),
            axis(4, 40),
            axis(4, -12),
            Step::Idle,
            // HOME
            button(316, true),
            button(316, false),
            // memory buttons
            button(304, true),
            button(304, false),
            button(305, true),
            button(305, false),
            // already assigned, ignored
            button(304, true),
            button(304, false),
            // finish
            button(316, true),
            button(316, false),
        ]
    }

    #[tokio::test(start_paused = true)]
    async fn test_wizard_captures_calibration() {
        let mut source = ScriptedEvents::new(script());
        let mut prompts = Vec::new();
        let cal = run(&mut source, |p| prompts.push(p.to_string())).await.unwrap();

        assert_eq!(cal.axes.x, AxisCalibration { channel: 0, zero: 150, max_value: 32767 });
        assert_eq!(cal.axes.y, AxisCalibration { channel: 1, zero: -100, max_value: -32767 });
        assert_eq!(cal.axes.z, AxisCalibration { channel: 4, zero: -12, max_value: -32767 });
        assert_eq!(cal.buttons.home, 316);
        assert_eq!(cal.buttons.memory, vec![304, 305]);
        assert!(prompts[0].contains("X"));
        assert_eq!(source.remaining(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wizard_fails_on_unplug() {
        let mut source = ScriptedEvents::new(vec![axis(0, 32767), Step::Unplug]);
        let result = run(&mut source, |_| {}).await;
        assert!(matches!(result, Err(JogError::DeviceRead(_))));
    }
}
