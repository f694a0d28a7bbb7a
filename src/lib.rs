//! # Jog Bridge Library
//!
//! Jog a G-code driven CNC machine or 3D printer with a joystick.
//!
//! This library provides the jog engine and its collaborators: joystick
//! input and calibration, the G-code command channel, stored positions and
//! rumble feedback.

pub mod config;
pub mod controller;
pub mod error;
pub mod gcode;
pub mod jog;
pub mod serial;
