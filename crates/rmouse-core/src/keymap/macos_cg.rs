//! [`Key`] to macOS `CGKeyCode` translation table.
//!
//! CGKeyCode values are defined in Carbon Events.h (HIToolbox framework) and
//! name ANSI key *positions*, not characters.

use super::Key;

/// Translates a [`Key`] to a macOS `CGKeyCode`.
pub fn key_to_cgkeycode(key: Key) -> Option<u16> {
    let code = match key {
        Key::Control => 0x3B, // kVK_Control
        Key::Shift => 0x38,   // kVK_Shift
        Key::Alt => 0x3A,     // kVK_Option
        Key::Meta => 0x37,    // kVK_Command
        Key::Enter => 0x24,   // kVK_Return
        Key::Tab => 0x30,     // kVK_Tab
        Key::Escape => 0x35,  // kVK_Escape
        Key::Space => 0x31,   // kVK_Space
        Key::Left => 0x7B,    // kVK_LeftArrow
        Key::Right => 0x7C,   // kVK_RightArrow
        Key::Down => 0x7D,    // kVK_DownArrow
        Key::Up => 0x7E,      // kVK_UpArrow
        Key::Backspace => 0x33, // kVK_Delete
        Key::Delete => 0x75,  // kVK_ForwardDelete
        Key::Insert => 0x72,  // kVK_Help
        Key::Home => 0x73,
        Key::End => 0x77,
        Key::PageUp => 0x74,
        Key::PageDown => 0x79,
        Key::F(n) => return function_key(n),
        Key::Char(c) => return char_to_cgkeycode(c),
    };
    Some(code)
}

fn function_key(n: u8) -> Option<u16> {
    const F_KEYS: [u16; 12] = [
        0x7A, 0x78, 0x63, 0x76, 0x60, 0x61, 0x62, 0x64, 0x65, 0x6D, 0x67, 0x6F,
    ];
    F_KEYS.get(usize::from(n).checked_sub(1)?).copied()
}

fn char_to_cgkeycode(c: char) -> Option<u16> {
    let code = match c {
        'a' => 0x00,
        's' => 0x01,
        'd' => 0x02,
        'f' => 0x03,
        'h' => 0x04,
        'g' => 0x05,
        'z' => 0x06,
        'x' => 0x07,
        'c' => 0x08,
        'v' => 0x09,
        'b' => 0x0B,
        'q' => 0x0C,
        'w' => 0x0D,
        'e' => 0x0E,
        'r' => 0x0F,
        'y' => 0x10,
        't' => 0x11,
        '1' => 0x12,
        '2' => 0x13,
        '3' => 0x14,
        '4' => 0x15,
        '6' => 0x16,
        '5' => 0x17,
        '=' => 0x18,
        '9' => 0x19,
        '7' => 0x1A,
        '-' => 0x1B,
        '8' => 0x1C,
        '0' => 0x1D,
        ']' => 0x1E,
        'o' => 0x1F,
        'u' => 0x20,
        '[' => 0x21,
        'i' => 0x22,
        'p' => 0x23,
        'l' => 0x25,
        'j' => 0x26,
        '\'' => 0x27,
        'k' => 0x28,
        ';' => 0x29,
        '\\' => 0x2A,
        ',' => 0x2B,
        '/' => 0x2C,
        'n' => 0x2D,
        'm' => 0x2E,
        '.' => 0x2F,
        '`' => 0x32,
        _ => return None,
    };
    Some(code)
}
