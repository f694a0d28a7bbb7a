//! # Axis Vectors
//!
//! Machine axes and the fixed three-component vector used for positions,
//! velocities and machine limits.

use std::fmt;
use std::ops::{Index, IndexMut};

/// One of the machine's linear axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
    Z,
}

impl Axis {
    /// All axes in G-code order.
    pub const ALL: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

    /// Index into an [`AxisVector`].
    #[inline]
    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }

    /// G-code letter for this axis.
    pub fn letter(self) -> char {
        match self {
            Axis::X => 'X',
            Axis::Y => 'Y',
            Axis::Z => 'Z',
        }
    }
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// Three floating components keyed by [`Axis`].
///
/// Positions and limits are in millimeters, velocities are a fraction
/// (-1.0 to 1.0) of the feedrate cap.
///
/// # Examples
///
/// ```
/// use jog_bridge::jog::vector::{Axis, AxisVector};
///
/// let mut pos = AxisVector::new(1.0, 2.0, 3.0);
/// pos[Axis::Z] = 4.0;
/// assert_eq!(pos[Axis::Y], 2.0);
/// assert_eq!(pos.magnitude(), (1.0f32 + 4.0 + 16.0).sqrt());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AxisVector([f32; 3]);

impl AxisVector {
    /// All components zero.
    pub const ZERO: AxisVector = AxisVector([0.0; 3]);

    #[must_use]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self([x, y, z])
    }

    /// Same value on every axis.
    #[must_use]
    pub fn splat(value: f32) -> Self {
        Self([value; 3])
    }

    /// Euclidean length.
    #[must_use]
    pub fn magnitude(&self) -> f32 {
        self.0.iter().map(|c| c * c).sum::<f32>().sqrt()
    }

    /// Iterate `(axis, value)` pairs in X, Y, Z order.
    pub fn iter(&self) -> impl Iterator<Item = (Axis, f32)> + '_ {
        Axis::ALL.iter().map(move |&a| (a, self[a]))
    }
}

impl Index<Axis> for AxisVector {
    type Output = f32;

    fn index(&self, axis: Axis) -> &f32 {
        &self.0[axis.index()]
    }
}

impl IndexMut<Axis> for AxisVector {
    fn index_mut(&mut self, axis: Axis) -> &mut f32 {
        &mut self.0[axis.index()]
    }
}

impl fmt::Display for AxisVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.2}, {:.2}, {:.2})", self.0[0], self.0[1], self.0[2])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_axis_order() {
        let indices: Vec<usize> = Axis::ALL.iter().map(|a| a.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(Axis::Y.letter(), 'Y');
    }

    #[test]
    fn test_index_by_axis() {
        let mut v = AxisVector::ZERO;
        v[Axis::Y] = 7.5;
        assert_eq!(v, AxisVector::new(0.0, 7.5, 0.0));
    }

    #[test]
    fn test_magnitude_zero() {
        assert_eq!(AxisVector::ZERO.magnitude(), 0.0);
        assert!((AxisVector::new(3.0, 4.0, 0.0).magnitude() - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_display() {
        assert_eq!(AxisVector::new(1.0, 2.5, 3.126).to_string(), "(1.00, 2.50, 3.13)");
    }
}
