//! macOS input sink via CoreGraphics events.
//!
//! Events are created with an `HIDSystemState` event source and posted at the
//! HID tap, the same level as physical devices.  The process needs the
//! Accessibility permission (System Settings → Privacy & Security →
//! Accessibility); without it macOS silently drops the events.
//!
//! macOS has no relative-motion injection, so a move reads the current cursor
//! location and posts an absolute event at the offset point.  While a button
//! is held the move is posted as the matching `*MouseDragged` event, which is
//! what applications expect during a drag.

#![cfg(target_os = "macos")]

use std::sync::{Mutex, PoisonError};

use core_graphics::event::{
    CGEvent, CGEventFlags, CGEventTapLocation, CGEventType, CGMouseButton, ScrollEventUnit,
};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::CGPoint;
use rmouse_core::keymap::{macos_cg, Key, MouseButton};

use crate::application::translate_input::{combination_steps, EmulationError, InputSink};

/// CoreGraphics-backed [`InputSink`].
#[derive(Debug, Default)]
pub struct MacosInputSink {
    held: Mutex<Vec<MouseButton>>,
}

impl MacosInputSink {
    /// Verifies that an HID event source can be created.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::Unavailable`] when CoreGraphics refuses.
    pub fn new() -> Result<Self, EmulationError> {
        source()?;
        Ok(Self::default())
    }

    fn held_buttons(&self) -> Vec<MouseButton> {
        self.held
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_held(&self, button: MouseButton, down: bool) {
        let mut held = self.held.lock().unwrap_or_else(PoisonError::into_inner);
        held.retain(|b| *b != button);
        if down {
            held.push(button);
        }
    }

    fn post_button(&self, button: MouseButton, down: bool) -> Result<(), EmulationError> {
        let (event_type, cg_button) = button_event(button, down);
        let event = CGEvent::new_mouse_event(source()?, event_type, cursor()?, cg_button)
            .map_err(|_| platform("mouse button event"))?;
        event.post(CGEventTapLocation::HID);
        self.set_held(button, down);
        Ok(())
    }
}

impl InputSink for MacosInputSink {
    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), EmulationError> {
        let here = cursor()?;
        let target = CGPoint::new(here.x + f64::from(dx), here.y + f64::from(dy));
        let (event_type, cg_button) = match self.held_buttons().last() {
            Some(MouseButton::Left) => (CGEventType::LeftMouseDragged, CGMouseButton::Left),
            Some(MouseButton::Right) => (CGEventType::RightMouseDragged, CGMouseButton::Right),
            Some(MouseButton::Middle) => (CGEventType::OtherMouseDragged, CGMouseButton::Center),
            None => (CGEventType::MouseMoved, CGMouseButton::Left),
        };
        let event = CGEvent::new_mouse_event(source()?, event_type, target, cg_button)
            .map_err(|_| platform("mouse move event"))?;
        event.post(CGEventTapLocation::HID);
        Ok(())
    }

    fn click(&self, button: MouseButton, pressed: Option<bool>) -> Result<(), EmulationError> {
        match pressed {
            Some(down) => self.post_button(button, down),
            None => {
                self.post_button(button, true)?;
                self.post_button(button, false)
            }
        }
    }

    fn type_text(&self, text: &str) -> Result<(), EmulationError> {
        // The unicode-string payload is applied to a dummy key; each char
        // gets its own down/up pair so long strings are not truncated.
        let mut buf = [0u8; 4];
        for c in text.chars() {
            let s: &str = c.encode_utf8(&mut buf);
            for down in [true, false] {
                let event = CGEvent::new_keyboard_event(source()?, 0, down)
                    .map_err(|_| platform("keyboard event"))?;
                event.set_string(s);
                event.post(CGEventTapLocation::HID);
            }
        }
        Ok(())
    }

    fn press_combination(&self, keys: &[Key]) -> Result<(), EmulationError> {
        let mut flags = CGEventFlags::CGEventFlagNull;
        for (key, down) in combination_steps(keys) {
            let code = macos_cg::key_to_cgkeycode(key).ok_or(EmulationError::Unmapped(key))?;
            if let Some(flag) = modifier_flag(key) {
                if down {
                    flags |= flag;
                } else {
                    flags.remove(flag);
                }
            }
            let event = CGEvent::new_keyboard_event(source()?, code, down)
                .map_err(|_| platform("keyboard event"))?;
            event.set_flags(flags);
            event.post(CGEventTapLocation::HID);
        }
        Ok(())
    }

    fn scroll(&self, dx: i32, dy: i32) -> Result<(), EmulationError> {
        let event = CGEvent::new_scroll_event(source()?, ScrollEventUnit::LINE, 2, dy, dx, 0)
            .map_err(|_| platform("scroll event"))?;
        event.post(CGEventTapLocation::HID);
        Ok(())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn source() -> Result<CGEventSource, EmulationError> {
    CGEventSource::new(CGEventSourceStateID::HIDSystemState)
        .map_err(|_| EmulationError::Unavailable("cannot create HID event source".into()))
}

fn cursor() -> Result<CGPoint, EmulationError> {
    CGEvent::new(source()?)
        .map(|e| e.location())
        .map_err(|_| platform("cursor query"))
}

fn platform(what: &str) -> EmulationError {
    EmulationError::Platform(format!("CoreGraphics failed to create {what}"))
}

fn button_event(button: MouseButton, down: bool) -> (CGEventType, CGMouseButton) {
    match (button, down) {
        (MouseButton::Left, true) => (CGEventType::LeftMouseDown, CGMouseButton::Left),
        (MouseButton::Left, false) => (CGEventType::LeftMouseUp, CGMouseButton::Left),
        (MouseButton::Right, true) => (CGEventType::RightMouseDown, CGMouseButton::Right),
        (MouseButton::Right, false) => (CGEventType::RightMouseUp, CGMouseButton::Right),
        (MouseButton::Middle, true) => (CGEventType::OtherMouseDown, CGMouseButton::Center),
        (MouseButton::Middle, false) => (CGEventType::OtherMouseUp, CGMouseButton::Center),
    }
}

fn modifier_flag(key: Key) -> Option<CGEventFlags> {
    match key {
        Key::Meta => Some(CGEventFlags::CGEventFlagCommand),
        Key::Shift => Some(CGEventFlags::CGEventFlagShift),
        Key::Control => Some(CGEventFlags::CGEventFlagControl),
        Key::Alt => Some(CGEventFlags::CGEventFlagAlternate),
        _ => None,
    }
}
