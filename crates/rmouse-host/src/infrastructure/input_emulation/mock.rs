//! Recording input sink for tests.
//!
//! Unit tests inside this crate use the `mockall`-generated `MockInputSink`
//! for strict expectations.  Integration tests under `tests/` cannot see that
//! mock (it only exists under `cfg(test)`), so they use this sink instead and
//! assert on the recorded [`SinkEvent`] sequence.
//!
//! Set `should_fail` to make every call return `EmulationError::Platform`.

use std::sync::{Mutex, PoisonError};

use rmouse_core::keymap::{Key, MouseButton};

use crate::application::translate_input::{EmulationError, InputSink};

/// One call observed by [`RecordingInputSink`].
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    Move(i32, i32),
    Click(MouseButton, Option<bool>),
    Text(String),
    Combination(Vec<Key>),
    Scroll(i32, i32),
}

/// A sink that records every call in arrival order.
#[derive(Debug, Default)]
pub struct RecordingInputSink {
    events: Mutex<Vec<SinkEvent>>,
    pub should_fail: bool,
}

impl RecordingInputSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            should_fail: true,
            ..Self::default()
        }
    }

    /// Returns a copy of everything recorded so far.
    pub fn events(&self) -> Vec<SinkEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, event: SinkEvent) -> Result<(), EmulationError> {
        if self.should_fail {
            return Err(EmulationError::Platform("mock failure".into()));
        }
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
        Ok(())
    }
}

impl InputSink for RecordingInputSink {
    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), EmulationError> {
        self.record(SinkEvent::Move(dx, dy))
    }

    fn click(&self, button: MouseButton, pressed: Option<bool>) -> Result<(), EmulationError> {
        self.record(SinkEvent::Click(button, pressed))
    }

    fn type_text(&self, text: &str) -> Result<(), EmulationError> {
        self.record(SinkEvent::Text(text.to_string()))
    }

    fn press_combination(&self, keys: &[Key]) -> Result<(), EmulationError> {
        self.record(SinkEvent::Combination(keys.to_vec()))
    }

    fn scroll(&self, dx: i32, dy: i32) -> Result<(), EmulationError> {
        self.record(SinkEvent::Scroll(dx, dy))
    }
}
