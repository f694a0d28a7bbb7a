//! # Controller Module
//!
//! Joystick input handling.
//!
//! This module handles:
//! - Joystick detection and connection via evdev
//! - Reading axis and button events with a bounded wait
//! - Mapping axis deflection to quantized jog velocities
//! - Routing buttons to HOME and memory slots
//! - Calibration storage and the interactive calibration wizard
//! - Rumble feedback

pub mod calibration;
pub mod event;
pub mod joystick;
pub mod mapper;
pub mod rumble;
pub mod wizard;
