//! Windows input sink via the SendInput API.
//!
//! Pointer motion is injected as relative `MOUSEEVENTF_MOVE` events.  Key
//! combinations go through Virtual-Key codes; free text is typed with
//! `KEYEVENTF_UNICODE` so it does not depend on the active keyboard layout.
//!
//! Every action is submitted as one `SendInput` batch, which Windows inserts
//! into the input stream without interleaving events from other sources.

#![cfg(target_os = "windows")]

use rmouse_core::keymap::{windows_vk, Key, MouseButton};
use windows::Win32::UI::Input::KeyboardAndMouse::{
    SendInput, INPUT, INPUT_0, INPUT_KEYBOARD, INPUT_MOUSE, KEYBDINPUT, KEYBD_EVENT_FLAGS,
    KEYEVENTF_EXTENDEDKEY, KEYEVENTF_KEYUP, KEYEVENTF_UNICODE, MOUSEEVENTF_HWHEEL,
    MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP, MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP,
    MOUSEEVENTF_MOVE, MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP, MOUSEEVENTF_WHEEL,
    MOUSEINPUT, MOUSE_EVENT_FLAGS, VIRTUAL_KEY,
};

use crate::application::translate_input::{combination_steps, EmulationError, InputSink};

/// One wheel notch.
const WHEEL_DELTA: i32 = 120;

const VK_RETURN: u16 = 0x0D;

/// SendInput-backed [`InputSink`].
#[derive(Debug, Default)]
pub struct WindowsInputSink;

impl WindowsInputSink {
    pub fn new() -> Self {
        Self
    }
}

impl InputSink for WindowsInputSink {
    fn move_relative(&self, dx: i32, dy: i32) -> Result<(), EmulationError> {
        send(&[mouse_input(dx, dy, 0, MOUSEEVENTF_MOVE)])
    }

    fn click(&self, button: MouseButton, pressed: Option<bool>) -> Result<(), EmulationError> {
        let (down, up) = button_flags(button);
        match pressed {
            Some(true) => send(&[mouse_input(0, 0, 0, down)]),
            Some(false) => send(&[mouse_input(0, 0, 0, up)]),
            None => send(&[mouse_input(0, 0, 0, down), mouse_input(0, 0, 0, up)]),
        }
    }

    fn type_text(&self, text: &str) -> Result<(), EmulationError> {
        let mut inputs = Vec::with_capacity(text.len() * 2);
        for unit in text.encode_utf16() {
            // Enter as a UNICODE event produces a bare CR that many editors ignore.
            if unit == u16::from(b'\n') {
                inputs.push(key_input(VK_RETURN, 0, KEYBD_EVENT_FLAGS(0)));
                inputs.push(key_input(VK_RETURN, 0, KEYEVENTF_KEYUP));
                continue;
            }
            if unit == u16::from(b'\r') {
                continue;
            }
            inputs.push(key_input(0, unit, KEYEVENTF_UNICODE));
            inputs.push(key_input(0, unit, KEYEVENTF_UNICODE | KEYEVENTF_KEYUP));
        }
        send(&inputs)
    }

    fn press_combination(&self, keys: &[Key]) -> Result<(), EmulationError> {
        let mut inputs = Vec::with_capacity(keys.len() * 2);
        for (key, press) in combination_steps(keys) {
            let vk = windows_vk::key_to_vk(key).ok_or(EmulationError::Unmapped(key))?;
            let mut flags = if press {
                KEYBD_EVENT_FLAGS(0)
            } else {
                KEYEVENTF_KEYUP
            };
            if windows_vk::is_extended(vk) {
                flags |= KEYEVENTF_EXTENDEDKEY;
            }
            inputs.push(key_input(vk, 0, flags));
        }
        send(&inputs)
    }

    fn scroll(&self, dx: i32, dy: i32) -> Result<(), EmulationError> {
        let mut inputs = Vec::with_capacity(2);
        if dy != 0 {
            inputs.push(mouse_input(0, 0, wheel_data(dy), MOUSEEVENTF_WHEEL));
        }
        if dx != 0 {
            inputs.push(mouse_input(0, 0, wheel_data(dx), MOUSEEVENTF_HWHEEL));
        }
        send(&inputs)
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn button_flags(button: MouseButton) -> (MOUSE_EVENT_FLAGS, MOUSE_EVENT_FLAGS) {
    match button {
        MouseButton::Left => (MOUSEEVENTF_LEFTDOWN, MOUSEEVENTF_LEFTUP),
        MouseButton::Right => (MOUSEEVENTF_RIGHTDOWN, MOUSEEVENTF_RIGHTUP),
        MouseButton::Middle => (MOUSEEVENTF_MIDDLEDOWN, MOUSEEVENTF_MIDDLEUP),
    }
}

/// Wheel ticks to the signed `mouseData` payload SendInput expects.
fn wheel_data(ticks: i32) -> u32 {
    ticks.saturating_mul(WHEEL_DELTA) as u32
}

fn mouse_input(dx: i32, dy: i32, data: u32, flags: MOUSE_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_MOUSE,
        Anonymous: INPUT_0 {
            mi: MOUSEINPUT {
                dx,
                dy,
                mouseData: data,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn key_input(vk: u16, scan: u16, flags: KEYBD_EVENT_FLAGS) -> INPUT {
    INPUT {
        r#type: INPUT_KEYBOARD,
        Anonymous: INPUT_0 {
            ki: KEYBDINPUT {
                wVk: VIRTUAL_KEY(vk),
                wScan: scan,
                dwFlags: flags,
                time: 0,
                dwExtraInfo: 0,
            },
        },
    }
}

fn send(inputs: &[INPUT]) -> Result<(), EmulationError> {
    if inputs.is_empty() {
        return Ok(());
    }
    // SAFETY: every element is a fully initialised INPUT and the size argument
    // matches the element type.
    let sent = unsafe { SendInput(inputs, std::mem::size_of::<INPUT>() as i32) };
    if sent as usize != inputs.len() {
        // Typically UIPI: the foreground window belongs to an elevated process.
        return Err(EmulationError::Platform(format!(
            "SendInput injected {sent} of {} events: {}",
            inputs.len(),
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}
