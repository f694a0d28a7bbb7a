//! # G-code Module
//!
//! Everything on the machine side of the bridge.
//!
//! This module handles:
//! - Formatting commands and parsing acknowledgements and position reports
//! - The line-oriented command channel (serial port, stdio, simulation)
//! - Request/acknowledge sequencing and motor state tracking

pub mod channel;
pub mod command;
pub mod machine;
pub mod simulated;
