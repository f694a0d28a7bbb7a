//! # Motion Emitter
//!
//! Integrates the jog velocity over the time since the last move, clamps the
//! result to the machine envelope and sends it as one absolute `G1` move.
//!
//! ```text
//! magnitude = |velocity|
//! feedrate  = magnitude * (feedrate_z if |vz| > 0.01 else feedrate_xy)
//! pos[a]   += v[a] * feedrate * elapsed        (elapsed capped at max_step)
//! pos[a]    = clamp(pos[a], 0, limit[a])
//! ```

use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

use super::vector::{Axis, AxisVector};
use crate::error::Result;
use crate::gcode::channel::CommandChannel;
use crate::gcode::machine::Machine;

/// Any Z component above this selects the Z feedrate cap.
const Z_VELOCITY_EPSILON: f32 = 0.01;

/// Feedrates below this (mm/s) are treated as standing still.
const MIN_FEEDRATE: f32 = 0.1;

/// Maximum feedrates in mm/s.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Feedrates {
    /// Planar (X/Y) moves and memory recalls.
    pub xy: f32,
    /// Any move with a Z component.
    pub z: f32,
}

/// One planned jog move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JogStep {
    /// New absolute position, already clamped.
    pub target: AxisVector,
    /// Feedrate in mm/s.
    pub feedrate: f32,
    /// An axis hit a limit it was not already resting on.
    pub limit_reached: bool,
}

/// Plan one jog move and update `position` in place.
///
/// Returns `None`, leaving `position` untouched, when the velocity is too
/// small to move.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use jog_bridge::jog::motion::{plan_step, Feedrates};
/// use jog_bridge::jog::vector::AxisVector;
///
/// let feedrates = Feedrates { xy: 120.0, z: 10.0 };
/// let limits = AxisVector::splat(305.0);
/// let mut pos = AxisVector::new(300.0, 0.0, 0.0);
///
/// let step = plan_step(
///     &mut pos,
///     &AxisVector::new(1.0, 0.0, 0.0),
///     &limits,
///     Duration::from_millis(100),
///     &feedrates,
/// )
/// .unwrap();
/// assert_eq!(pos, AxisVector::new(305.0, 0.0, 0.0));
/// assert!(step.limit_reached);
/// ```
pub fn plan_step(
    position: &mut AxisVector,
    velocity: &AxisVector,
    limits: &AxisVector,
    elapsed: Duration,
    feedrates: &Feedrates,
) -> Option<JogStep> {
    let cap = if velocity[Axis::Z].abs() > Z_VELOCITY_EPSILON {
        feedrates.z
    } else {
        feedrates.xy
    };
    let feedrate = velocity.magnitude() * cap;
    if feedrate.abs() < MIN_FEEDRATE {
        return None;
    }

    let seconds = elapsed.as_secs_f32();
    let mut limit_reached = false;
    for axis in Axis::ALL {
        let limit = limits[axis];
        let at_limit_before = position[axis] <= 0.0 || position[axis] >= limit;
        let moved = position[axis] + velocity[axis] * feedrate * seconds;
        let clamped = moved.clamp(0.0, limit);
        if clamped != moved && !at_limit_before {
            limit_reached = true;
        }
        position[axis] = clamped;
    }

    Some(JogStep {
        target: *position,
        feedrate,
        limit_reached,
    })
}

/// Clamp every component of `point` to `[0, limit]`.
#[must_use]
pub fn clamp_to_envelope(point: AxisVector, limits: &AxisVector) -> AxisVector {
    let mut clamped = point;
    for axis in Axis::ALL {
        clamped[axis] = point[axis].clamp(0.0, limits[axis]);
    }
    clamped
}

/// Emits jog moves at the pace of the control loop.
#[derive(Debug)]
pub struct MotionEmitter {
    feedrates: Feedrates,
    limits: AxisVector,
    max_step: Duration,
    last_emit: Option<Instant>,
}

impl MotionEmitter {
    #[must_use]
    pub fn new(feedrates: Feedrates, limits: AxisVector, max_step: Duration) -> Self {
        Self {
            feedrates,
            limits,
            max_step,
            last_emit: None,
        }
    }

    /// Move by `velocity` for the time since the last emitted move.
    ///
    /// The first move, and the first after standing still, covers
    /// `max_step`. Returns the step if a `G1` was sent.
    pub async fn emit<C: CommandChannel>(
        &mut self,
        position: &mut AxisVector,
        velocity: &AxisVector,
        machine: &mut Machine<C>,
    ) -> Result<Option<JogStep>> {
        let now = Instant::now();
        let elapsed = self
            .last_emit
            .map_or(self.max_step, |last| now.duration_since(last))
            .min(self.max_step);

        let Some(step) = plan_step(position, velocity, &self.limits, elapsed, &self.feedrates) else {
            return Ok(None);
        };

        machine.move_to(step.target, step.feedrate).await?;
        self.last_emit = Some(now);
        debug!("Goto {} at {:.1} mm/s", step.target, step.feedrate);
        Ok(Some(step))
    }
}
