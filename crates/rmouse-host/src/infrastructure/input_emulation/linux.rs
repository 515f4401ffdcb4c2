//! Linux X11 input sink via the XTest extension.
//!
//! Compiled only with the `xtest` cargo feature, which links libX11 and libXtst.
//!
//! XTest takes keycodes, not KeySyms, so every key goes through
//! `XKeysymToKeycode` on the live display:
//!
//! ```text
//! Key / char → X11 KeySym → XKeysymToKeycode(display, keysym) → keycode
//! ```
//!
//! Scrolling is expressed as clicks of buttons 4/5 (vertical) and 6/7
//! (horizontal), one click per wheel tick.
//!
//! The display connection is opened once and shared; Xlib is not thread-safe,
//! so every call holds the connection mutex until `XFlush` returns.

use std::os::raw::{c_int, c_uint};
use std::ptr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use rmouse_core::keymap::{linux_x11, Key, MouseButton};
use x11::{xlib, xtest};

use crate::application::translate_input::{combination_steps, EmulationError, InputSink};

/// `CurrentTime`: let the server stamp the synthetic event.
const CURRENT_TIME: xlib::Time = 0;

const XK_SHIFT_L: u32 = 0xFFE1;

struct Display(*mut xlib::Display);

// SAFETY: the pointer is only dereferenced by Xlib while the owning mutex is
// held, so at most one thread uses the connection at a time.
unsafe impl Send for Display {}

/// XTest-backed [`InputSink`].
pub struct XTestInputSink {
    display: Mutex<Display>,
}

impl XTestInputSink {
    /// Opens the display named by `$DISPLAY`.
    ///
    /// # Errors
    ///
    /// Returns [`EmulationError::Unavailable`] when no X server is reachable.
    pub fn open() -> Result<Self, EmulationError> {
        // SAFETY: a null name makes Xlib read $DISPLAY.
        let display = unsafe { xlib::XOpenDisplay(ptr::null()) };
        if display.is_null() {
            return Err(EmulationError::Unavailable(
                "cannot open X display (is $DISPLAY set?)".into(),
            ));
        }
        Ok(Self {
            display: Mutex::new(Display(display)),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Display> {
        self.display.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for XTestInputSink {
    fn drop(&mut self) {
        let display = self.lock();
        // SAFETY: the pointer came from XOpenDisplay and is closed exactly once.
        unsafe {
            xlib::XCloseDisplay(display.0);
        }
    }
}

impl InputSink for XTestInputSink {
    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), EmulationError> {
        let display = self.lock();
        // SAFETY: valid display pointer, guarded by the mutex.
        unsafe {
            xtest::XTestFakeRelativeMotionEvent(display.0, dx, dy, CURRENT_TIME);
            xlib::XFlush(display.0);
        }
        Ok(())
    }

    fn click(&self, button: MouseButton, pressed: Option<bool>) -> Result<(), EmulationError> {
        let display = self.lock();
        let number = button_number(button);
        let steps: &[bool] = match pressed {
            Some(true) => &[true],
            Some(false) => &[false],
            None => &[true, false],
        };
        for &down in steps {
            fake_button(&display, number, down);
        }
        flush(&display);
        Ok(())
    }

    fn type_text(&self, text: &str) -> Result<(), EmulationError> {
        let display = self.lock();
        let shift = keycode(&display, XK_SHIFT_L)?;
        for c in text.chars() {
            let code = keycode(&display, linux_x11::char_to_keysym(c)).map_err(|_| {
                EmulationError::Platform(format!("no keycode for {c:?} in the current keymap"))
            })?;
            let shifted = linux_x11::needs_shift(c);
            if shifted {
                fake_key(&display, shift, true);
            }
            fake_key(&display, code, true);
            fake_key(&display, code, false);
            if shifted {
                fake_key(&display, shift, false);
            }
        }
        flush(&display);
        Ok(())
    }

    fn press_combination(&self, keys: &[Key]) -> Result<(), EmulationError> {
        let display = self.lock();
        let mut codes = Vec::with_capacity(keys.len());
        for &key in keys {
            let sym = linux_x11::key_to_keysym(key).ok_or(EmulationError::Unmapped(key))?;
            codes.push((key, keycode(&display, sym)?));
        }
        for (key, down) in combination_steps(keys) {
            if let Some(&(_, code)) = codes.iter().find(|(k, _)| *k == key) {
                fake_key(&display, code, down);
            }
        }
        flush(&display);
        Ok(())
    }

    fn scroll(&self, dx: i32, dy: i32) -> Result<(), EmulationError> {
        let display = self.lock();
        for (button, clicks) in scroll_clicks(dx, dy) {
            for _ in 0..clicks {
                fake_button(&display, button, true);
                fake_button(&display, button, false);
            }
        }
        flush(&display);
        Ok(())
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn button_number(button: MouseButton) -> c_uint {
    match button {
        MouseButton::Left => 1,
        MouseButton::Middle => 2,
        MouseButton::Right => 3,
    }
}

/// Returns `(button, clicks)` pairs for a scroll of `dx`/`dy` wheel ticks.
fn scroll_clicks(dx: i32, dy: i32) -> Vec<(c_uint, u32)> {
    let mut out = Vec::with_capacity(2);
    if dy != 0 {
        out.push((if dy > 0 { 4 } else { 5 }, dy.unsigned_abs()));
    }
    if dx != 0 {
        out.push((if dx > 0 { 7 } else { 6 }, dx.unsigned_abs()));
    }
    out
}

fn keycode(display: &Display, keysym: u32) -> Result<c_uint, EmulationError> {
    // SAFETY: valid display pointer, guarded by the caller's lock.
    let code = unsafe { xlib::XKeysymToKeycode(display.0, xlib::KeySym::from(keysym)) };
    if code == 0 {
        return Err(EmulationError::Platform(format!(
            "keysym {keysym:#x} has no keycode"
        )));
    }
    Ok(c_uint::from(code))
}

fn fake_key(display: &Display, code: c_uint, down: bool) {
    // SAFETY: valid display pointer, guarded by the caller's lock.
    unsafe {
        xtest::XTestFakeKeyEvent(display.0, code, c_int::from(down), CURRENT_TIME);
    }
}

fn fake_button(display: &Display, button: c_uint, down: bool) {
    // SAFETY: valid display pointer, guarded by the caller's lock.
    unsafe {
        xtest::XTestFakeButtonEvent(display.0, button, c_int::from(down), CURRENT_TIME);
    }
}

fn flush(display: &Display) {
    // SAFETY: valid display pointer, guarded by the caller's lock.
    unsafe {
        xlib::XFlush(display.0);
    }
}
