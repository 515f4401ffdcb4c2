//! [`Key`] to Windows Virtual-Key code translation.
//!
//! Reference: Windows Virtual-Key Codes (winuser.h).
//!
//! VK codes are *logical*: `VK_A = 0x41` regardless of the physical layout,
//! which is what a hotkey like `["cmd","c"]` wants.  Punctuation uses the
//! `VK_OEM_*` codes of the US layout.

use super::Key;

/// Translates a [`Key`] to a Windows Virtual-Key code.
///
/// Returns `None` for characters without a US-layout VK code.
pub fn key_to_vk(key: Key) -> Option<u16> {
    let vk = match key {
        Key::Control => 0x11, // VK_CONTROL
        Key::Shift => 0x10,   // VK_SHIFT
        Key::Alt => 0x12,     // VK_MENU
        Key::Meta => 0x5B,    // VK_LWIN
        Key::Enter => 0x0D,   // VK_RETURN
        Key::Tab => 0x09,     // VK_TAB
        Key::Escape => 0x1B,  // VK_ESCAPE
        Key::Space => 0x20,   // VK_SPACE
        Key::Left => 0x25,    // VK_LEFT
        Key::Up => 0x26,      // VK_UP
        Key::Right => 0x27,   // VK_RIGHT
        Key::Down => 0x28,    // VK_DOWN
        Key::Backspace => 0x08,
        Key::Delete => 0x2E,
        Key::Insert => 0x2D,
        Key::Home => 0x24,
        Key::End => 0x23,
        Key::PageUp => 0x21,   // VK_PRIOR
        Key::PageDown => 0x22, // VK_NEXT
        Key::F(n @ 1..=12) => 0x70 + u16::from(n - 1), // VK_F1..VK_F12
        Key::F(_) => return None,
        Key::Char(c) => return char_to_vk(c),
    };
    Some(vk)
}

fn char_to_vk(c: char) -> Option<u16> {
    let vk = match c {
        'a'..='z' => 0x41 + (c as u16 - 'a' as u16),
        '0'..='9' => 0x30 + (c as u16 - '0' as u16),
        ';' => 0xBA, // VK_OEM_1
        '=' => 0xBB, // VK_OEM_PLUS
        ',' => 0xBC, // VK_OEM_COMMA
        '-' => 0xBD, // VK_OEM_MINUS
        '.' => 0xBE, // VK_OEM_PERIOD
        '/' => 0xBF, // VK_OEM_2
        '`' => 0xC0, // VK_OEM_3
        '[' => 0xDB, // VK_OEM_4
        '\\' => 0xDC, // VK_OEM_5
        ']' => 0xDD, // VK_OEM_6
        '\'' => 0xDE, // VK_OEM_7
        _ => return None,
    };
    Some(vk)
}

/// Returns `true` for VK codes that need `KEYEVENTF_EXTENDEDKEY`.
pub fn is_extended(vk: u16) -> bool {
    matches!(vk, 0x21..=0x28 | 0x2D | 0x2E | 0x5B | 0x5C)
}
