//! # Simulated Machine
//!
//! A [`CommandChannel`] that needs no hardware: every command is
//! acknowledged immediately, moves and homing update an internal position,
//! and `M114` reports it. Used by `--simulate` to try out a joystick
//! calibration without a machine attached.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::time::Duration;
use tracing::info;

use super::channel::CommandChannel;
use crate::error::{JogError, Result};
use crate::jog::vector::{Axis, AxisVector};

/// In-memory stand-in for a G-code machine.
#[derive(Debug)]
pub struct SimulatedChannel {
    position: AxisVector,
    homing_command: String,
    replies: VecDeque<String>,
}

impl SimulatedChannel {
    #[must_use]
    pub fn new(homing_command: &str) -> Self {
        Self {
            position: AxisVector::ZERO,
            homing_command: homing_command.to_string(),
            replies: VecDeque::new(),
        }
    }

    fn apply(&mut self, line: &str) {
        let line = line.trim();
        if line == self.homing_command || line.starts_with("G28") || line == "$H" {
            self.position = AxisVector::ZERO;
        } else if line == "M114" {
            self.replies.push_back(format!(
                "X:{:.2} Y:{:.2} Z:{:.2} E:0.00",
                self.position[Axis::X],
                self.position[Axis::Y],
                self.position[Axis::Z]
            ));
        } else if line.starts_with("G1 ") || line.starts_with("G0 ") {
            for word in line.split_whitespace().skip(1) {
                let mut chars = word.chars();
                let axis = match chars.next() {
                    Some('X') => Axis::X,
                    Some('Y') => Axis::Y,
                    Some('Z') => Axis::Z,
                    _ => continue,
                };
                if let Ok(v) = chars.as_str().parse() {
                    self.position[axis] = v;
                }
            }
        }
        self.replies.push_back("ok".to_string());
    }
}

#[async_trait]
impl CommandChannel for SimulatedChannel {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        info!("[simulate] {}", line);
        self.apply(line);
        Ok(())
    }

    async fn read_line(&mut self, _timeout: Option<Duration>) -> Result<String> {
        self.replies
            .pop_front()
            .ok_or_else(|| JogError::ChannelProtocol("simulated machine has nothing to say".to_string()))
    }

    async fn discard_pending(&mut self, _quiet_for: Duration) -> Result<usize> {
        let bytes = self.replies.iter().map(|r| r.len() + 1).sum();
        self.replies.clear();
        Ok(bytes)
    }
}
