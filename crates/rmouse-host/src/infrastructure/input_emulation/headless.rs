//! Logging-only input sink.
//!
//! Used for `--dry-run`, on CI machines without a desktop session, and on
//! builds with no native sink compiled in.  Typed text is logged by length
//! only.

use std::sync::atomic::{AtomicU64, Ordering};

use rmouse_core::keymap::{Key, MouseButton};
use tracing::{debug, info};

use crate::application::translate_input::{EmulationError, InputSink};

/// An [`InputSink`] that records actions to the `tracing` log.
#[derive(Debug, Default)]
pub struct TracingInputSink {
    actions: AtomicU64,
}

impl TracingInputSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of actions accepted so far.
    pub fn action_count(&self) -> u64 {
        self.actions.load(Ordering::Relaxed)
    }

    fn count(&self) {
        self.actions.fetch_add(1, Ordering::Relaxed);
    }
}

impl InputSink for TracingInputSink {
    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), EmulationError> {
        self.count();
        debug!(dx, dy, "move");
        Ok(())
    }

    fn click(&self, button: MouseButton, pressed: Option<bool>) -> Result<(), EmulationError> {
        self.count();
        info!(?button, ?pressed, "click");
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), EmulationError> {
        self.count();
        info!(chars = text.chars().count(), "type text");
        Ok(())
    }

    fn press_combination(&self, keys: &[Key]) -> Result<(), EmulationError> {
        self.count();
        info!(?keys, "key combination");
        Ok(())
    }

    fn scroll(&self, dx: i32, dy: i32) -> Result<(), EmulationError> {
        self.count();
        debug!(dx, dy, "scroll");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_action_is_counted() {
        // Arrange
        let sink = TracingInputSink::new();

        // Act
        sink.move_relative(1, 2).unwrap();
        sink.click(MouseButton::Left, None).unwrap();
        sink.type_text("abc").unwrap();
        sink.press_combination(&[Key::Control, Key::Char('v')]).unwrap();
        sink.scroll(0, -1).unwrap();

        // Assert
        assert_eq!(sink.action_count(), 5);
    }
}
