//! # Machine Protocol
//!
//! Request/acknowledge discipline on top of a [`CommandChannel`]:
//!
//! - every command waits for its `ok` before the next one is sent, so there
//!   is never more than one command in flight
//! - commands are never retried; a duplicated move is physically unsafe
//! - pending input is drained before a position query and before homing,
//!   because the machine may chatter unprompted (resets, busy messages)
//! - motors are considered energized from the last move or homing until
//!   `M84` is sent

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::channel::CommandChannel;
use super::command::{is_ack, parse_position, GCode};
use crate::error::Result;
use crate::jog::vector::AxisVector;

/// G-code machine behind a command channel.
#[derive(Debug)]
pub struct Machine<C> {
    channel: C,
    homing_command: String,
    drain: Duration,
    motor_on_since: Option<Instant>,
}

impl<C: CommandChannel> Machine<C> {
    /// Wrap a channel.
    ///
    /// `drain` is how long the channel must stay quiet before a position
    /// query or homing command is sent.
    pub fn new(channel: C, homing_command: &str, drain: Duration) -> Self {
        Self {
            channel,
            homing_command: homing_command.to_string(),
            drain,
            motor_on_since: None,
        }
    }

    /// Whether a move or homing happened since the last motor-off.
    pub fn motors_energized(&self) -> bool {
        self.motor_on_since.is_some()
    }

    /// Wait for the initial start-up chatter of the machine to subside.
    ///
    /// Many boards reset on connect and print their configuration before
    /// they accept commands. A harmless `G21` tickles the line, then
    /// everything is discarded until the machine has been silent for
    /// `quiet_for`. Returns the number of bytes discarded.
    pub async fn wait_for_startup(&mut self, quiet_for: Duration) -> Result<usize> {
        info!("Waiting for machine initialization...");
        self.channel.send_line(&GCode::Metric.to_string()).await?;
        let discarded = self.channel.discard_pending(quiet_for).await?;
        info!("Machine initialization done (discarded {} bytes)", discarded);
        if discarded == 0 {
            warn!("Zero bytes from the machine is suspicious; is the serial line ok?");
        }
        Ok(discarded)
    }

    /// Send one command and block until it is acknowledged.
    pub async fn command(&mut self, command: &GCode<'_>) -> Result<()> {
        self.channel.send_line(&command.to_string()).await?;
        self.wait_for_ok().await
    }

    /// Query the absolute machine position with `M114`.
    ///
    /// # Errors
    ///
    /// `ChannelProtocol` if the reply is not a position report; the query
    /// is not retried.
    pub async fn query_position(&mut self) -> Result<AxisVector> {
        self.channel.discard_pending(self.drain).await?;
        self.channel.send_line(&GCode::QueryPosition.to_string()).await?;
        let reply = self.channel.read_line(None).await?;
        let position = parse_position(&reply)?;
        self.wait_for_ok().await?;
        info!("Got machine position {}", position);
        Ok(position)
    }

    /// Home all axes.
    pub async fn home(&mut self) -> Result<()> {
        self.channel.discard_pending(self.drain).await?;
        info!("Homing ({})", self.homing_command);
        let homing_command = self.homing_command.clone();
        self.command(&GCode::Home(&homing_command)).await?;
        self.motor_on_since = Some(Instant::now());
        Ok(())
    }

    /// Linear move to an absolute position; `feedrate` in mm/s.
    pub async fn move_to(&mut self, target: AxisVector, feedrate: f32) -> Result<()> {
        self.command(&GCode::MoveTo { target, feedrate }).await?;
        self.motor_on_since = Some(Instant::now());
        Ok(())
    }

    /// Disable motors if they are believed to be energized.
    ///
    /// Returns whether `M84` was sent.
    pub async fn ensure_motors_off(&mut self) -> Result<bool> {
        if self.motor_on_since.is_none() {
            return Ok(false);
        }
        self.command(&GCode::MotorsOff).await?;
        self.motor_on_since = None;
        info!("Motors off");
        Ok(true)
    }

    /// Disable motors once they have been idle for longer than `idle`.
    pub async fn check_motor_timeout(&mut self, idle: Duration) -> Result<bool> {
        match self.motor_on_since {
            Some(since) if since.elapsed() > idle => self.ensure_motors_off().await,
            _ => Ok(false),
        }
    }

    /// Read lines until one acknowledges; anything else is informational.
    async fn wait_for_ok(&mut self) -> Result<()> {
        loop {
            let line = self.channel.read_line(None).await?;
            if is_ack(&line) {
                return Ok(());
            }
            debug!("machine: {}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::JogError;
    use crate::gcode::channel::mocks::RecordingChannel;
    use crate::gcode::command::DEFAULT_HOMING_COMMAND;

    fn machine(channel: &RecordingChannel) -> Machine<RecordingChannel> {
        Machine::new(channel.clone(), DEFAULT_HOMING_COMMAND, Duration::from_millis(100))
    }

    #[tokio::test]
    async fn test_command_waits_for_ok_skipping_chatter() {
        let channel = RecordingChannel::new();
        channel.push_chatter("echo:busy: processing");
        let mut machine = machine(&channel);
        machine.command(&GCode::Metric).await.unwrap();
        assert_eq!(channel.sent(), vec!["G21"]);
        assert!(channel.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_commands_are_sequential() {
        let channel = RecordingChannel::new();
        let mut machine = machine(&channel);
        machine.command(&GCode::Metric).await.unwrap();
        machine.command(&GCode::Absolute).await.unwrap();
        assert_eq!(channel.sent(), vec!["G21", "G90"]);
        // every ok was consumed by its own command
        assert!(channel.pending.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_startup_drains_chatter() {
        let channel = RecordingChannel::new();
        channel.push_chatter("start");
        let mut machine = machine(&channel);
        let discarded = machine.wait_for_startup(Duration::from_secs(20)).await.unwrap();
        // "start\n" + the ok for G21
        assert_eq!(discarded, 6 + 3);
        assert_eq!(channel.discards.lock().unwrap().as_slice(), &[Duration::from_secs(20)]);
    }

    #[tokio::test]
    async fn test_query_position_drains_first() {
        let channel = RecordingChannel::at("X:1.00 Y:2.00 Z:3.00 E:0.00");
        channel.push_chatter("echo:SD card ok");
        let mut machine = machine(&channel);
        let pos = machine.query_position().await.unwrap();
        assert_eq!(pos, AxisVector::new(1.0, 2.0, 3.0));
        assert_eq!(channel.sent(), vec!["M114"]);
        assert_eq!(channel.discards.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_query_position_unparsable_is_protocol_error() {
        let channel = RecordingChannel::at("Unknown command: \"M114\"");
        let mut machine = machine(&channel);
        let result = machine.query_position().await;
        assert!(matches!(result, Err(JogError::ChannelProtocol(_))));
        assert_eq!(channel.count("M114"), 1, "query must not be retried");
    }

    #[tokio::test]
    async fn test_home_drains_and_energizes() {
        let channel = RecordingChannel::new();
        let mut machine = machine(&channel);
        assert!(!machine.motors_energized());
        machine.home().await.unwrap();
        assert!(machine.motors_energized());
        assert_eq!(channel.homes(), 1);
        assert_eq!(channel.discards.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_move_formats_absolute_move() {
        let channel = RecordingChannel::new();
        let mut machine = machine(&channel);
        machine.move_to(AxisVector::new(1.0, 2.0, 3.0), 10.0).await.unwrap();
        assert_eq!(channel.sent(), vec!["G1 X1.000 Y2.000 Z3.000 F600.000"]);
        assert!(machine.motors_energized());
    }

    #[tokio::test]
    async fn test_motors_off_only_when_energized() {
        let channel = RecordingChannel::new();
        let mut machine = machine(&channel);
        assert!(!machine.ensure_motors_off().await.unwrap());
        machine.move_to(AxisVector::ZERO, 10.0).await.unwrap();
        assert!(machine.ensure_motors_off().await.unwrap());
        assert!(!machine.ensure_motors_off().await.unwrap());
        assert_eq!(channel.count("M84"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_motor_timeout_fires_once() {
        let channel = RecordingChannel::new();
        let mut machine = machine(&channel);
        let idle = Duration::from_secs(5);
        machine.move_to(AxisVector::ZERO, 10.0).await.unwrap();

        tokio::time::advance(Duration::from_secs(4)).await;
        assert!(!machine.check_motor_timeout(idle).await.unwrap());

        tokio::time::advance(Duration::from_millis(1001)).await;
        assert!(machine.check_motor_timeout(idle).await.unwrap());
        assert!(!machine.check_motor_timeout(idle).await.unwrap());
        assert_eq!(channel.count("M84"), 1);
    }

    #[tokio::test]
    async fn test_closed_channel_surfaces() {
        let mut broken = Machine::new(BrokenChannel, DEFAULT_HOMING_COMMAND, Duration::ZERO);
        let result = broken.move_to(AxisVector::ZERO, 10.0).await;
        assert!(matches!(result, Err(JogError::ChannelClosed)));
        assert!(!broken.motors_energized());
    }

    /// Machine that went away: writes vanish, reads hit end of stream.
    struct BrokenChannel;

    #[async_trait::async_trait]
    impl CommandChannel for BrokenChannel {
        async fn send_line(&mut self, _line: &str) -> Result<()> {
            Ok(())
        }
        async fn read_line(&mut self, _timeout: Option<Duration>) -> Result<String> {
            Err(JogError::ChannelClosed)
        }
        async fn discard_pending(&mut self, _quiet_for: Duration) -> Result<usize> {
            Ok(0)
        }
    }
}
