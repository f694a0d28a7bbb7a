//! # G-code Commands
//!
//! Formatting of the handful of commands the jog engine sends, and parsing
//! of the two kinds of reply it cares about: the `ok` acknowledgement and
//! the `M114` position report.

use std::fmt;

use crate::error::{JogError, Result};
use crate::jog::vector::{Axis, AxisVector};

/// Homing command used unless configured otherwise.
///
/// `W` tells Prusa firmware to skip mesh bed levelling; GRBL machines use `$H`.
pub const DEFAULT_HOMING_COMMAND: &str = "G28 W0";

/// Commands sent to the machine.
#[derive(Debug, Clone, PartialEq)]
pub enum GCode<'a> {
    /// `G21`: units are millimeters.
    Metric,
    /// `G90`: absolute coordinates.
    Absolute,
    /// `M114`: report current position.
    QueryPosition,
    /// Machine specific homing command.
    Home(&'a str),
    /// `G1`: linear move to an absolute position; feedrate in mm/s.
    MoveTo { target: AxisVector, feedrate: f32 },
    /// `M84`: disable steppers.
    MotorsOff,
}

impl fmt::Display for GCode<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GCode::Metric => f.write_str("G21"),
            GCode::Absolute => f.write_str("G90"),
            GCode::QueryPosition => f.write_str("M114"),
            GCode::Home(command) => f.write_str(command),
            GCode::MoveTo { target, feedrate } => write!(
                f,
                "G1 X{:.3} Y{:.3} Z{:.3} F{:.3}",
                target[Axis::X],
                target[Axis::Y],
                target[Axis::Z],
                feedrate * 60.0
            ),
            GCode::MotorsOff => f.write_str("M84"),
        }
    }
}

/// Whether a reply line acknowledges the previous command.
///
/// # Examples
///
/// ```
/// use jog_bridge::gcode::command::is_ack;
///
/// assert!(is_ack("ok"));
/// assert!(is_ack("OK T:21.3 /0.0"));
/// assert!(!is_ack("echo:busy: processing"));
/// ```
#[must_use]
pub fn is_ack(line: &str) -> bool {
    line.as_bytes()
        .get(..2)
        .map_or(false, |prefix| prefix.eq_ignore_ascii_case(b"ok"))
}

/// Parse an `M114` position report such as
/// `X:10.00 Y:20.00 Z:5.00 E:0.00 Count X:800 Y:1600 Z:2000`.
///
/// Only the leading `X:`, `Y:` and `Z:` values are used.
///
/// # Errors
///
/// Returns `ChannelProtocol` if the line does not start with the three
/// coordinates.
///
/// # Examples
///
/// ```
/// use jog_bridge::gcode::command::parse_position;
/// use jog_bridge::jog::vector::AxisVector;
///
/// let pos = parse_position("X:1.5 Y:2.0 Z:-0.25 E:0.00").unwrap();
/// assert_eq!(pos, AxisVector::new(1.5, 2.0, -0.25));
/// assert!(parse_position("ok").is_err());
/// ```
pub fn parse_position(line: &str) -> Result<AxisVector> {
    let mut rest = line.trim_start();
    let mut position = AxisVector::ZERO;

    for axis in Axis::ALL {
        let label = format!("{}:", axis.letter());
        rest = rest
            .trim_start()
            .strip_prefix(label.as_str())
            .ok_or_else(|| unreadable(line))?;
        let (value, tail) = split_number(rest).ok_or_else(|| unreadable(line))?;
        position[axis] = value;
        rest = tail;
    }

    Ok(position)
}

fn unreadable(line: &str) -> JogError {
    JogError::ChannelProtocol(format!("Didn't get readable coordinates: '{}'", line))
}

/// Split a leading decimal number off `s`.
fn split_number(s: &str) -> Option<(f32, &str)> {
    let s = s.trim_start();
    let end = s
        .char_indices()
        .find(|&(i, c)| {
            !(c.is_ascii_digit() || c == '.' || ((c == '-' || c == '+') && i == 0))
        })
        .map_or(s.len(), |(i, _)| i);
    let value = s[..end].parse().ok()?;
    Some((value, &s[end..]))
}
