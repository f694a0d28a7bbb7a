//! # Memory Slot State Machine
//!
//! Each memory button stores the current position on a long press and
//! recalls it on a short press. Hold time is accumulated from the control
//! loop's idle ticks, not measured with a clock, so a busy loop never makes
//! a short press look long.
//!
//! A press held past the threshold stores without waiting for the release;
//! the physical release that follows has no tracked press and recalls the
//! point just stored, which is a no-op move.

use std::time::Duration;
use tracing::info;

use super::vector::AxisVector;

/// What a released memory button asks the engine to do.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotAction {
    /// The position was stored in the slot.
    Stored(AxisVector),
    /// Move to the stored position.
    Recall(AxisVector),
    /// Short press on an empty slot.
    Undefined,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Slot {
    pressed: bool,
    /// `None` while idle.
    hold: Option<Duration>,
    stored: Option<AxisVector>,
}

/// Runtime state of all memory buttons.
#[derive(Debug, Clone)]
pub struct MemorySlots {
    slots: Vec<Slot>,
    threshold: Duration,
}

impl MemorySlots {
    /// `count` empty slots; presses of at least `threshold` store.
    #[must_use]
    pub fn new(count: usize, threshold: Duration) -> Self {
        Self {
            slots: vec![Slot::default(); count],
            threshold,
        }
    }

    /// Number of slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Seed stored positions, e.g. from a points file. Extra entries are ignored.
    pub fn restore(&mut self, stored: &[Option<AxisVector>]) {
        for (slot, point) in self.slots.iter_mut().zip(stored) {
            slot.stored = *point;
        }
    }

    /// Stored positions in slot order.
    #[must_use]
    pub fn stored(&self) -> Vec<Option<AxisVector>> {
        self.slots.iter().map(|s| s.stored).collect()
    }

    /// Button went down: start tracking hold time.
    pub fn press(&mut self, slot: usize) {
        if let Some(s) = self.slots.get_mut(slot) {
            s.pressed = true;
            s.hold = Some(Duration::ZERO);
        }
    }

    /// Button went up: store or recall depending on how long it was held.
    ///
    /// A release without a tracked press counts as a short press.
    pub fn release(&mut self, slot: usize, position: AxisVector) -> SlotAction {
        let threshold = self.threshold;
        let Some(s) = self.slots.get_mut(slot) else {
            return SlotAction::Undefined;
        };
        s.pressed = false;
        let held = s.hold.take();

        if held.map_or(false, |h| h >= threshold) {
            s.stored = Some(position);
            info!("Stored in {} {}", slot, position);
            SlotAction::Stored(position)
        } else if let Some(point) = s.stored {
            info!("Goto position {} -> {}", slot, point);
            SlotAction::Recall(point)
        } else {
            info!("Button {} undefined", slot);
            SlotAction::Undefined
        }
    }

    /// Account one idle tick of `interval` to every held button.
    ///
    /// Buttons held longer than the threshold are released on the spot and
    /// store `position`. Returns the slots that did.
    pub fn tick(&mut self, interval: Duration, position: AxisVector) -> Vec<usize> {
        let threshold = self.threshold;
        let mut expired = Vec::new();
        for (i, s) in self.slots.iter_mut().enumerate() {
            if let Some(hold) = s.hold.as_mut() {
                *hold += interval;
                if *hold > threshold {
                    expired.push(i);
                }
            }
        }
        for &i in &expired {
            self.release(i, position);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TICK: Duration = Duration::from_millis(20);
    const P: AxisVector = AxisVector::ZERO;

    fn slots() -> MemorySlots {
        MemorySlots::new(3, Duration::from_millis(500))
    }

    fn hold_for(slots: &mut MemorySlots, slot: usize, held: Duration) -> Vec<usize> {
        slots.press(slot);
        slots.tick(held, P)
    }

    #[test]
    fn test_short_press_on_empty_slot_is_undefined() {
        let mut s = slots();
        s.press(0);
        s.tick(TICK, P);
        assert_eq!(s.release(0, P), SlotAction::Undefined);
    }

    #[test]
    fn test_499ms_recalls() {
        let mut s = slots();
        let stored = AxisVector::new(1.0, 2.0, 3.0);
        s.restore(&[Some(stored)]);

        assert!(hold_for(&mut s, 0, Duration::from_millis(499)).is_empty());
        assert_eq!(s.release(0, AxisVector::splat(9.0)), SlotAction::Recall(stored));
        assert_eq!(s.stored()[0], Some(stored));
    }

    #[test]
    fn test_500ms_explicit_release_stores() {
        let mut s = slots();
        let here = AxisVector::new(10.0, 20.0, 5.0);
        assert!(hold_for(&mut s, 1, Duration::from_millis(500)).is_empty());
        assert!(s.slots[1].pressed);
        assert_eq!(s.release(1, here), SlotAction::Stored(here));
        assert_eq!(s.stored(), vec![None, Some(here), None]);
    }

    #[test]
    fn test_sustained_press_stores_without_release() {
        let mut s = slots();
        let here = AxisVector::new(4.0, 5.0, 6.0);
        s.press(2);
        for _ in 0..25 {
            assert!(s.tick(TICK, here).is_empty());
        }
        // 520 ms
        assert_eq!(s.tick(TICK, here), vec![2]);
        assert!(!s.slots[2].pressed);
        assert_eq!(s.stored()[2], Some(here));

        // nothing left to track: later ticks do not store again
        assert!(s.tick(TICK, AxisVector::splat(1.0)).is_empty());
        assert_eq!(s.stored()[2], Some(here));

        // the physical release then recalls the point just stored
        assert_eq!(s.release(2, here), SlotAction::Recall(here));
    }

    #[test]
    fn test_release_without_press_recalls() {
        let mut s = slots();
        let stored = AxisVector::new(7.0, 8.0, 9.0);
        s.restore(&[None, Some(stored)]);
        assert_eq!(s.release(1, P), SlotAction::Recall(stored));
        assert_eq!(s.release(0, P), SlotAction::Undefined);
    }

    #[test]
    fn test_holds_are_tracked_per_button() {
        let mut s = slots();
        s.press(0);
        s.tick(Duration::from_millis(400), P);
        s.press(1);
        assert_eq!(s.tick(Duration::from_millis(200), P), vec![0]);
        assert_eq!(s.release(1, P), SlotAction::Undefined);
        assert_eq!(s.stored(), vec![Some(P), None, None]);
    }

    #[test]
    fn test_out_of_range_slot_is_ignored() {
        let mut s = slots();
        s.press(7);
        assert!(s.slots.iter().all(|slot| !slot.pressed));
        assert_eq!(s.release(7, P), SlotAction::Undefined);
    }

    #[test]
    fn test_restore_ignores_extra_entries() {
        let mut s = MemorySlots::new(1, Duration::from_millis(500));
        s.restore(&[Some(P), Some(AxisVector::splat(1.0))]);
        assert_eq!(s.len(), 1);
        assert_eq!(s.stored(), vec![Some(P)]);
    }
}
