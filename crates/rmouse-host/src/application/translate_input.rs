//! Input translation: turns authenticated [`ControlMessage`]s into OS actions.
//!
//! The translator owns no OS handles.  Every action goes through the
//! [`InputSink`] capability trait; the concrete sink (SendInput, CoreGraphics,
//! XTest, or the logging sink) is chosen once at startup in the infrastructure
//! layer and shared by all sessions.
//!
//! One [`InputTranslator`] exists per session so that the sub-pixel motion
//! remainder of one client never leaks into another's cursor deltas.  The
//! translator also remembers which buttons its client holds down, so ending
//! a session mid-drag can release them with [`InputTranslator::release_held`].

use std::sync::Arc;

use rmouse_core::{
    keymap::{Key, MouseButton, Platform},
    protocol::messages::ControlMessage,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Default multiplier applied to relative motion deltas.
pub const DEFAULT_POINTER_SPEED: f64 = 1.5;

/// Error raised by an [`InputSink`] when the OS rejects an action.
#[derive(Debug, Error, PartialEq)]
pub enum EmulationError {
    #[error("platform error: {0}")]
    Platform(String),
    #[error("no native key code for {0:?} on this platform")]
    Unmapped(Key),
    #[error("input sink unavailable: {0}")]
    Unavailable(String),
}

/// Error returned when one message cannot be translated.  The session survives.
#[derive(Debug, Error, PartialEq)]
pub enum TranslationError {
    #[error("unknown button: {0}")]
    UnknownButton(String),
    #[error("unknown key: {0}")]
    UnknownKey(String),
    #[error("empty key combination")]
    EmptyCombination,
    #[error("motion delta out of range: ({0}, {1})")]
    MotionOutOfRange(f64, f64),
    #[error("'{0}' is not an input message")]
    NotInput(&'static str),
    #[error(transparent)]
    Emulation(#[from] EmulationError),
}

/// Host-OS input capability.
///
/// Implementations must be callable from any session task.
#[cfg_attr(test, mockall::automock)]
pub trait InputSink: Send + Sync {
    /// Moves the pointer by whole pixels relative to its current position.
    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), EmulationError>;

    /// `Some(true)` presses, `Some(false)` releases, `None` presses then
    /// releases.
    fn click(&self, button: MouseButton, pressed: Option<bool>) -> Result<(), EmulationError>;

    /// Types `text` as a sequence of characters.
    fn type_text(&self, text: &str) -> Result<(), EmulationError>;

    /// Presses `keys` in order, then releases them in reverse order.
    fn press_combination(&self, keys: &[Key]) -> Result<(), EmulationError>;

    /// Scrolls by wheel ticks. Positive `dy` scrolls up, positive `dx` right.
    fn scroll(&self, dx: i32, dy: i32) -> Result<(), EmulationError>;
}

/// Expands a key combination into `(key, is_press)` steps.
///
/// Sinks that only have per-key down/up primitives use this so that every
/// platform releases modifiers in the same order.
pub fn combination_steps(keys: &[Key]) -> impl Iterator<Item = (Key, bool)> + '_ {
    keys.iter()
        .map(|&k| (k, true))
        .chain(keys.iter().rev().map(|&k| (k, false)))
}

/// Per-session translator from wire messages to [`InputSink`] calls.
pub struct InputTranslator {
    sink: Arc<dyn InputSink>,
    platform: Platform,
    pointer_speed: f64,
    remainder: (f64, f64),
    /// Buttons pressed with `down: true` and not yet released, oldest first.
    held: Vec<MouseButton>,
}

impl InputTranslator {
    pub fn new(sink: Arc<dyn InputSink>, platform: Platform, pointer_speed: f64) -> Self {
        Self {
            sink,
            platform,
            pointer_speed,
            remainder: (0.0, 0.0),
            held: Vec::new(),
        }
    }

    /// Applies one input message.
    ///
    /// # Errors
    ///
    /// Returns [`TranslationError`] for unknown button/key names, for
    /// non-input messages, and when the sink fails.
    pub fn apply(&mut self, msg: &ControlMessage) -> Result<(), TranslationError> {
        match msg {
            ControlMessage::Move { dx, dy } => self.apply_move(*dx, *dy),
            ControlMessage::Click { btn, down } => {
                let button = MouseButton::from_name(btn)
                    .ok_or_else(|| TranslationError::UnknownButton(btn.clone()))?;
                self.sink.click(button, *down)?;
                self.held.retain(|&b| b != button);
                if *down == Some(true) {
                    self.held.push(button);
                }
                Ok(())
            }
            ControlMessage::Key { text } => {
                if text.is_empty() {
                    return Ok(());
                }
                self.sink.type_text(text)?;
                Ok(())
            }
            ControlMessage::Hotkey { keys } => {
                let resolved = self.resolve_keys(keys)?;
                debug!(?resolved, "pressing combination");
                self.sink.press_combination(&resolved)?;
                Ok(())
            }
            ControlMessage::Scroll { dx, dy } => {
                if *dx == 0 && *dy == 0 {
                    return Ok(());
                }
                self.sink.scroll(*dx, *dy)?;
                Ok(())
            }
            other => Err(TranslationError::NotInput(other.tag())),
        }
    }

    /// Buttons currently held down by this session, oldest first.
    pub fn held_buttons(&self) -> &[MouseButton] {
        &self.held
    }

    /// Releases every held button, newest first.  Called when the session
    /// ends so a dropped client cannot leave a button stuck down.
    pub fn release_held(&mut self) {
        while let Some(button) = self.held.pop() {
            match self.sink.click(button, Some(false)) {
                Ok(()) => debug!(button = button.name(), "released held button"),
                Err(e) => warn!(button = button.name(), "failed to release held button: {e}"),
            }
        }
    }

    fn apply_move(&mut self, dx: f64, dy: f64) -> Result<(), TranslationError> {
        let x = dx * self.pointer_speed + self.remainder.0;
        let y = dy * self.pointer_speed + self.remainder.1;
        // The remainder is only updated from in-range values, so it stays finite.
        if !in_pixel_range(x) || !in_pixel_range(y) {
            return Err(TranslationError::MotionOutOfRange(dx, dy));
        }
        let (whole_x, whole_y) = (x.trunc(), y.trunc());
        self.remainder = (x - whole_x, y - whole_y);

        if whole_x == 0.0 && whole_y == 0.0 {
            return Ok(());
        }
        self.sink.move_relative(to_pixels(whole_x), to_pixels(whole_y))?;
        Ok(())
    }

    fn resolve_keys(&self, names: &[String]) -> Result<Vec<Key>, TranslationError> {
        if names.is_empty() {
            return Err(TranslationError::EmptyCombination);
        }
        names
            .iter()
            .map(|name| {
                Key::resolve(name, self.platform)
                    .ok_or_else(|| TranslationError::UnknownKey(name.clone()))
            })
            .collect()
    }
}

fn in_pixel_range(v: f64) -> bool {
    v.is_finite() && v.abs() <= i32::MAX as f64
}

fn to_pixels(v: f64) -> i32 {
    v.clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

// ── Tests ─────────────────────────────────────────────────────────────────────
