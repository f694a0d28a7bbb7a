//! # Jog Module
//!
//! The jog engine and its parts.
//!
//! This module handles:
//! - Position and velocity vectors keyed by machine axis
//! - Integrating velocity into clamped absolute moves
//! - Memory buttons: long press stores, short press recalls
//! - Persisting stored points between sessions
//! - The control loop tying joystick input to machine commands

pub mod buttons;
pub mod engine;
pub mod memory;
pub mod motion;
pub mod vector;
