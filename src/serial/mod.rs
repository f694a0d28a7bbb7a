//! # Serial Communication Module
//!
//! Connects the G-code command channel to the machine.
//!
//! This module handles:
//! - Opening the machine's USB serial port (8N1, configurable baud rate)
//! - Auto-detecting the port when none is configured
//! - Using stdin/stdout as the channel when the output is piped elsewhere

use crate::error::{JogError, Result};
use crate::gcode::channel::LineChannel;
use tokio::io::{ReadHalf, Stdin, Stdout, WriteHalf};
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

/// Default baud rate of Marlin and Prusa firmware.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Baud rates accepted in the configuration.
pub const STANDARD_BAUD_RATES: &[u32] = &[9_600, 19_200, 38_400, 57_600, 115_200, 230_400, 250_000];

/// Device paths to try when no port is configured (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/ttyACM0", // USB CDC (most 3D printer boards)
    "/dev/ttyUSB0", // USB-to-serial adapters (CH340, FTDI)
];

/// Command channel over a serial port.
pub type SerialChannel = LineChannel<ReadHalf<SerialStream>, WriteHalf<SerialStream>>;

/// Command channel over the process' own stdin/stdout.
pub type StdioChannel = LineChannel<Stdin, Stdout>;

/// Serial connection to a G-code machine.
pub struct MachineSerial {
    port: SerialStream,
    device_path: String,
}

impl std::fmt::Debug for MachineSerial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineSerial")
            .field("device_path", &self.device_path)
            .finish_non_exhaustive()
    }
}

impl MachineSerial {
    /// Open the machine's serial port.
    ///
    /// # Arguments
    ///
    /// * `path` - Device path; empty to try the common USB serial paths
    /// * `baud_rate` - Line speed
    ///
    /// # Errors
    ///
    /// Returns `SerialPortNotFound` if none of the candidate paths can be opened
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use jog_bridge::serial::MachineSerial;
    ///
    /// let serial = MachineSerial::open("/dev/ttyACM0", 115_200)?;
    /// println!("Connected to: {}", serial.device_path());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(path: &str, baud_rate: u32) -> Result<Self> {
        if path.is_empty() {
            Self::open_with_paths(DEFAULT_DEVICE_PATHS, baud_rate)
        } else {
            Self::open_with_paths(&[path], baud_rate)
        }
    }

    /// Open the first of `paths` that works.
    pub fn open_with_paths(paths: &[&str], baud_rate: u32) -> Result<Self> {
        for path in paths {
            debug!("Trying to open serial port: {}", path);

            match Self::open_port(path, baud_rate) {
                Ok(port) => {
                    info!("Opened machine serial port {} at {} baud", path, baud_rate);
                    return Ok(Self {
                        port,
                        device_path: path.to_string(),
                    });
                }
                Err(e) => {
                    warn!("{}", e);
                    continue;
                }
            }
        }

        Err(JogError::SerialPortNotFound(paths.join(", ")))
    }

    fn open_port(path: &str, baud_rate: u32) -> Result<SerialStream> {
        tokio_serial::new(path, baud_rate)
            .data_bits(tokio_serial::DataBits::Eight)
            .parity(tokio_serial::Parity::None)
            .stop_bits(tokio_serial::StopBits::One)
            .flow_control(tokio_serial::FlowControl::None)
            .open_native_async()
            .map_err(|e| JogError::Serial(format!("Failed to open {}: {}", path, e)))
    }

    /// Path of the opened device.
    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Turn the port into a line-oriented command channel.
    pub fn into_channel(self) -> SerialChannel {
        let (reader, writer) = tokio::io::split(self.port);
        LineChannel::new(reader, writer)
    }
}

/// Command channel on stdin/stdout, e.g. for `socat` or a pipe to a
/// G-code sender.
#[must_use]
pub fn stdio_channel() -> StdioChannel {
    LineChannel::new(tokio::io::stdin(), tokio::io::stdout())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths_order() {
        assert_eq!(DEFAULT_DEVICE_PATHS, &["/dev/ttyACM0", "/dev/ttyUSB0"]);
    }

    #[test]
    fn test_default_baud_is_standard() {
        assert!(STANDARD_BAUD_RATES.contains(&DEFAULT_BAUD_RATE));
    }

    #[test]
    fn test_open_with_invalid_paths_returns_error() {
        let result = MachineSerial::open_with_paths(&["/dev/nonexistent0", "/dev/nonexistent1"], DEFAULT_BAUD_RATE);

        match result {
            Err(JogError::SerialPortNotFound(msg)) => {
                assert!(msg.contains("/dev/nonexistent0"));
                assert!(msg.contains("/dev/nonexistent1"));
            }
            other => panic!("Expected SerialPortNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_open_with_empty_paths_returns_error() {
        let result = MachineSerial::open_with_paths(&[], DEFAULT_BAUD_RATE);
        assert!(matches!(result, Err(JogError::SerialPortNotFound(_))));
    }

    #[test]
    fn test_open_port_error_names_path() {
        match MachineSerial::open_port("/dev/nonexistent_serial_device_12345", DEFAULT_BAUD_RATE) {
            Err(JogError::Serial(msg)) => {
                assert!(msg.contains("/dev/nonexistent_serial_device_12345"));
                assert!(msg.contains("Failed to open"));
            }
            other => panic!("Expected Serial error, got: {:?}", other.map(|_| ())),
        }
    }

    // Integration test - only runs if a machine is connected
    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_position_query_with_real_machine() {
        use crate::gcode::command::GCode;
        use crate::gcode::machine::Machine;
        use std::time::Duration;

        let Ok(serial) = MachineSerial::open("", DEFAULT_BAUD_RATE) else {
            println!("No machine detected (skipping)");
            return;
        };
        println!("Connected to: {}", serial.device_path());
        let mut machine = Machine::new(serial.into_channel(), "G28 W0", Duration::from_millis(100));
        machine.wait_for_startup(Duration::from_secs(5)).await.unwrap();
        machine.command(&GCode::Metric).await.unwrap();
        let position = machine.query_position().await.unwrap();
        println!("Machine at {}", position);
    }
}
