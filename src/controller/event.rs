//! Trait abstraction over joystick event sources to enable testing

use async_trait::async_trait;
use std::time::Duration;

use crate::error::Result;

/// What kind of control produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Analog axis; value is the (rescaled) deflection.
    Axis,
    /// Digital button; value is 1 for pressed, 0 for released.
    Button,
}

/// A single joystick event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoyEvent {
    /// Raw channel id (evdev axis or key code).
    pub channel: u16,
    pub kind: EventKind,
    pub value: i32,
}

impl JoyEvent {
    #[must_use]
    pub fn axis(channel: u16, value: i32) -> Self {
        Self { channel, kind: EventKind::Axis, value }
    }

    #[must_use]
    pub fn button(channel: u16, pressed: bool) -> Self {
        Self {
            channel,
            kind: EventKind::Button,
            value: i32::from(pressed),
        }
    }
}

/// Outcome of a bounded wait for input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wait {
    Event(JoyEvent),
    /// Nothing arrived within the timeout. Not an error.
    Timeout,
}

/// Source of joystick events.
///
/// A read error (`Err`) means the device is gone; callers treat it as fatal.
#[async_trait]
pub trait InputEventSource: Send {
    /// Wait up to `timeout` for the next event.
    async fn wait_event(&mut self, timeout: Duration) -> Result<Wait>;
}


#[cfg(test)]
mod tests {
    use super::mocks::*;
    use super::*;

    #[test]
    fn test_button_event_values() {
        assert_eq!(JoyEvent::button(3, true).value, 1);
        assert_eq!(JoyEvent::button(3, false).value, 0);
        assert_eq!(JoyEvent::axis(1, -200).kind, EventKind::Axis);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scripted_source_replays_in_order() {
        let mut source = ScriptedEvents::new([
            Step::Event(JoyEvent::axis(0, 5)),
            Step::Idle,
        ]);
        let timeout = Duration::from_millis(20);

        assert_eq!(
            source.wait_event(timeout).await.unwrap(),
            Wait::Event(JoyEvent::axis(0, 5))
        );

        let before = tokio::time::Instant::now();
        assert_eq!(source.wait_event(timeout).await.unwrap(), Wait::Timeout);
        assert!(before.elapsed() >= timeout);

        assert!(source.wait_event(timeout).await.is_err());
        assert_eq!(source.remaining(), 0);
    }
}
