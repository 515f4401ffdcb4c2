//! [`Key`] and character to X11 KeySym translation for Linux hosts.
//!
//! X11 KeySym values are defined in X11/keysymdef.h.
//! Reference: https://gitlab.freedesktop.org/xorg/proto/xorgproto/-/blob/master/include/X11/keysymdef.h
//!
//! Printable Latin-1 characters use their code point as KeySym (`XK_a` is
//! 0x61), and every other Unicode scalar is `0x0100_0000 + code point`.
//! XTest needs a keycode, not a KeySym; the sink looks the keycode up on the
//! live display with `XKeysymToKeycode`.

use super::Key;

/// Translates a [`Key`] to an X11 KeySym.
pub fn key_to_keysym(key: Key) -> Option<u32> {
    let sym = match key {
        Key::Control => 0xFFE3, // XK_Control_L
        Key::Shift => 0xFFE1,   // XK_Shift_L
        Key::Alt => 0xFFE9,     // XK_Alt_L
        Key::Meta => 0xFFEB,    // XK_Super_L
        Key::Enter => 0xFF0D,   // XK_Return
        Key::Tab => 0xFF09,     // XK_Tab
        Key::Escape => 0xFF1B,  // XK_Escape
        Key::Space => 0x0020,   // XK_space
        Key::Left => 0xFF51,    // XK_Left
        Key::Up => 0xFF52,      // XK_Up
        Key::Right => 0xFF53,   // XK_Right
        Key::Down => 0xFF54,    // XK_Down
        Key::Backspace => 0xFF08,
        Key::Delete => 0xFFFF,
        Key::Insert => 0xFF63,
        Key::Home => 0xFF50,
        Key::End => 0xFF57,
        Key::PageUp => 0xFF55,
        Key::PageDown => 0xFF56,
        Key::F(n @ 1..=12) => 0xFFBE + u32::from(n - 1), // XK_F1..XK_F12
        Key::F(_) => return None,
        Key::Char(c) => return Some(char_to_keysym(c)),
    };
    Some(sym)
}

/// Translates a typed character to its KeySym.
pub fn char_to_keysym(c: char) -> u32 {
    match c {
        '\n' | '\r' => 0xFF0D,
        '\t' => 0xFF09,
        c if (c as u32) >= 0x20 && (c as u32) <= 0xFF => c as u32,
        c => 0x0100_0000 + c as u32,
    }
}

/// Returns `true` if `c` needs Shift on a US layout.
pub fn needs_shift(c: char) -> bool {
    c.is_ascii_uppercase() || "~!@#$%^&*()_+{}|:\"<>?".contains(c)
}
