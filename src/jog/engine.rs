//! # Jog Engine
//!
//! The control loop. Each iteration waits at most one poll interval for
//! joystick input:
//!
//! - axis events update the velocity vector and are coalesced; motion is
//!   only emitted on the regular tick
//! - button events are handled at once (homing, memory store/recall)
//! - the tick accounts memory button hold time, emits one jog move and,
//!   when standing still, switches idle motors off
//!
//! All machine commands run inside the loop, one at a time, so moves are
//! strictly ordered and never overlap.

use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use super::buttons::{MemorySlots, SlotAction};
use super::memory::{MemoryStore, NoStore};
use super::motion::{clamp_to_envelope, Feedrates, MotionEmitter};
use super::vector::AxisVector;
use crate::controller::calibration::Calibration;
use crate::controller::event::{EventKind, InputEventSource, JoyEvent, Wait};
use crate::controller::mapper::{AxisMapper, Button, ButtonRouter};
use crate::controller::rumble::{Haptics, NoHaptics};
use crate::error::{JogError, Result};
use crate::gcode::channel::CommandChannel;
use crate::gcode::command::GCode;
use crate::gcode::machine::Machine;

/// Immutable engine parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct JogSettings {
    /// Control loop tick.
    pub poll_interval: Duration,
    /// Memory buttons held at least this long store instead of recall.
    pub store_threshold: Duration,
    /// Longest time a single jog move may cover.
    pub max_step: Duration,
    pub feedrates: Feedrates,
    /// Machine envelope in mm; positions are kept within `[0, limit]`.
    pub limits: AxisVector,
    /// Motors are switched off after standing still this long.
    pub motor_timeout: Duration,
    /// Home before entering the loop.
    pub home_on_start: bool,
    /// Quiet time that ends the machine's start-up chatter.
    pub startup_wait: Duration,
}

impl Default for JogSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(20),
            store_threshold: Duration::from_millis(500),
            max_step: Duration::from_millis(100),
            feedrates: Feedrates { xy: 120.0, z: 10.0 },
            limits: AxisVector::splat(305.0),
            motor_timeout: Duration::from_secs(5),
            home_on_start: false,
            startup_wait: Duration::from_millis(20_000),
        }
    }
}

/// Why the engine stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    /// The joystick could not be read any more.
    DeviceError,
    /// The machine did not report a readable position.
    PositionQueryFailed,
    /// Shutdown was requested.
    Shutdown,
}

/// Joystick to G-code jog engine.
pub struct JogEngine<S, C> {
    source: S,
    machine: Machine<C>,
    axes: AxisMapper,
    buttons: ButtonRouter,
    slots: MemorySlots,
    store: Box<dyn MemoryStore>,
    haptics: Box<dyn Haptics>,
    shutdown: Option<watch::Receiver<bool>>,
    emitter: MotionEmitter,
    settings: JogSettings,
    position: AxisVector,
    velocity: AxisVector,
    homed: bool,
}

impl<S: InputEventSource, C: CommandChannel> JogEngine<S, C> {
    /// Create an engine without persistence or haptics.
    pub fn new(source: S, machine: Machine<C>, calibration: &Calibration, settings: JogSettings) -> Self {
        let buttons = ButtonRouter::new(calibration.buttons.clone());
        Self {
            source,
            machine,
            axes: AxisMapper::new(calibration.axes),
            slots: MemorySlots::new(buttons.memory_slots(), settings.store_threshold),
            buttons,
            store: Box::new(NoStore),
            haptics: Box::new(NoHaptics),
            shutdown: None,
            emitter: MotionEmitter::new(settings.feedrates, settings.limits, settings.max_step),
            settings,
            position: AxisVector::ZERO,
            velocity: AxisVector::ZERO,
            homed: false,
        }
    }

    /// Persist memory slots in `store`.
    #[must_use]
    pub fn with_store(mut self, store: Box<dyn MemoryStore>) -> Self {
        self.store = store;
        self
    }

    /// Send rumble feedback to `haptics`.
    #[must_use]
    pub fn with_haptics(mut self, haptics: Box<dyn Haptics>) -> Self {
        self.haptics = haptics;
        self
    }

    /// Stop when `shutdown` turns true.
    #[must_use]
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Position the engine believes the machine is at.
    #[must_use]
    pub fn position(&self) -> AxisVector {
        self.position
    }

    /// Bring the machine up and jog until the joystick goes away or
    /// shutdown is requested.
    ///
    /// # Errors
    ///
    /// Command channel failures other than an unreadable position report
    /// are returned as errors; the machine state is unknown afterwards.
    pub async fn run(&mut self) -> Result<ExitStatus> {
        self.restore_memory();

        if let Some(status) = self.start_machine().await? {
            return Ok(status);
        }
        info!("Ready for input");

        let status = self.control_loop().await?;
        self.machine.ensure_motors_off().await?;
        info!("Jog engine stopped: {:?}", status);
        Ok(status)
    }

    fn restore_memory(&mut self) {
        match self.store.load(self.slots.len()) {
            Ok(points) => self.slots.restore(&points),
            Err(e) => warn!("Stored points not loaded: {}", e),
        }
    }

    async fn start_machine(&mut self) -> Result<Option<ExitStatus>> {
        self.machine.wait_for_startup(self.settings.startup_wait).await?;
        self.machine.command(&GCode::Metric).await?;

        if self.settings.home_on_start {
            self.machine.home().await?;
            self.homed = true;
        }

        // Relative mode rounds away tiny increments on some firmwares;
        // the engine tracks the absolute position itself.
        self.machine.command(&GCode::Absolute).await?;

        Ok(self.refresh_position().await?.then_some(ExitStatus::PositionQueryFailed))
    }

    /// Re-read the machine position. Returns `true` if the reply was unreadable.
    async fn refresh_position(&mut self) -> Result<bool> {
        match self.machine.query_position().await {
            Ok(reported) => {
                self.position = clamp_to_envelope(reported, &self.settings.limits);
                if self.position != reported {
                    warn!("Machine reports {} outside the limits, using {}", reported, self.position);
                }
                Ok(false)
            }
            Err(JogError::ChannelProtocol(msg)) => {
                error!("{}", msg);
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    async fn control_loop(&mut self) -> Result<ExitStatus> {
        loop {
            let deadline = Instant::now() + self.settings.poll_interval;
            let next = loop {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    break Ok(Wait::Timeout);
                }
                let wait = tokio::select! {
                    biased;
                    _ = shutdown_requested(&mut self.shutdown) => return Ok(ExitStatus::Shutdown),
                    wait = self.source.wait_event(remaining) => wait,
                };
                match wait {
                    Ok(Wait::Event(event)) if event.kind == EventKind::Axis => self.on_axis(event),
                    other => break other,
                }
            };

            match next {
                Ok(Wait::Timeout) => self.on_tick().await?,
                Ok(Wait::Event(event)) => {
                    if let Some(status) = self.on_button(event).await? {
                        return Ok(status);
                    }
                }
                Err(e) => {
                    error!("Joystick read failed: {}", e);
                    return Ok(ExitStatus::DeviceError);
                }
            }
        }
    }

    fn on_axis(&mut self, event: JoyEvent) {
        if let Some((axis, velocity)) = self.axes.map(event.channel, event.value) {
            self.velocity[axis] = velocity;
        }
    }

    async fn on_tick(&mut self) -> Result<()> {
        for slot in self.slots.tick(self.settings.poll_interval, self.position) {
            debug!("Memory button {} held, stored without release", slot);
            self.on_stored();
        }

        match self
            .emitter
            .emit(&mut self.position, &self.velocity, &mut self.machine)
            .await?
        {
            Some(step) => {
                self.homed = false;
                if step.limit_reached {
                    self.haptics.rumble();
                }
            }
            None => {
                self.machine.check_motor_timeout(self.settings.motor_timeout).await?;
            }
        }
        Ok(())
    }

    async fn on_button(&mut self, event: JoyEvent) -> Result<Option<ExitStatus>> {
        let Some(transition) = self.buttons.route(event.channel, event.value) else {
            debug!("Ignoring unbound button {}", event.channel);
            return Ok(None);
        };

        match (transition.button, transition.pressed) {
            (Button::Home, true) if !self.homed => {
                self.machine.home().await?;
                if self.refresh_position().await? {
                    return Ok(Some(ExitStatus::PositionQueryFailed));
                }
                self.homed = true;
            }
            (Button::Home, _) => {}
            (Button::Memory(slot), true) => self.slots.press(slot),
            (Button::Memory(slot), false) => match self.slots.release(slot, self.position) {
                SlotAction::Stored(_) => self.on_stored(),
                SlotAction::Recall(point) => {
                    self.position = clamp_to_envelope(point, &self.settings.limits);
                    self.machine.move_to(self.position, self.settings.feedrates.xy).await?;
                }
                SlotAction::Undefined => {}
            },
        }
        Ok(None)
    }

    fn on_stored(&mut self) {
        if let Err(e) = self.store.save(&self.slots.stored()) {
            warn!("Stored points not persisted: {}", e);
        }
        self.haptics.rumble();
    }
}

/// Resolves once shutdown is requested; never if there is no sender.
async fn shutdown_requested(shutdown: &mut Option<watch::Receiver<bool>>) {
    let Some(rx) = shutdown else {
        return std::future::pending().await;
    };
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            return std::future::pending().await;
        }
    }
}
