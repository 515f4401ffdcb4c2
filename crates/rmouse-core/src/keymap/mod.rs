//! Symbolic key and button vocabulary plus per-OS native key tables.
//!
//! The wire protocol carries *logical* names only (`"cmd"`, `"enter"`, `"c"`).
//! The host resolves each name to a concrete [`Key`] for the OS it is running
//! on via [`Key::resolve`], and the input sink then maps that [`Key`] to the
//! native code through one of the tables below:
//!
//! - [`windows_vk`] - Windows Virtual-Key codes
//! - [`linux_x11`]  - X11 KeySyms
//! - [`macos_cg`]   - macOS `CGKeyCode`s (ANSI layout)
//!
//! # The primary modifier
//!
//! `"cmd"` names the platform's *primary* modifier: Command on macOS and
//! Control everywhere else, so a client can send `["cmd","c"]` for "copy"
//! without knowing what it is talking to.  `"ctrl"` resolves to Command on
//! macOS as well; `"win"`, `"meta"` and `"super"` always name the OS key.

pub mod linux_x11;
pub mod macos_cg;
pub mod windows_vk;

use std::fmt;

/// Operating system family of the host, selected once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    Windows,
    Linux,
    MacOs,
}

impl Platform {
    /// Returns the platform this binary was compiled for.
    ///
    /// Anything that is neither Windows nor macOS is treated as Linux/X11.
    pub fn current() -> Self {
        if cfg!(target_os = "windows") {
            Platform::Windows
        } else if cfg!(target_os = "macos") {
            Platform::MacOs
        } else {
            Platform::Linux
        }
    }

    /// The concrete key behind the logical `"cmd"` modifier.
    pub fn primary_modifier(self) -> Key {
        match self {
            Platform::MacOs => Key::Meta,
            Platform::Windows | Platform::Linux => Key::Control,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Windows => f.write_str("windows"),
            Platform::Linux => f.write_str("linux"),
            Platform::MacOs => f.write_str("macos"),
        }
    }
}

/// A concrete key, already resolved for the running platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Control,
    Shift,
    Alt,
    /// Windows key / Command / Super.
    Meta,
    Enter,
    Tab,
    Escape,
    Space,
    Up,
    Down,
    Left,
    Right,
    Backspace,
    Delete,
    Insert,
    Home,
    End,
    PageUp,
    PageDown,
    /// Function key `F1`..=`F12`.
    F(u8),
    /// A printable ASCII character key, stored lowercase.
    Char(char),
}

impl Key {
    /// Resolves a logical key name for `platform`.
    ///
    /// Matching is case-insensitive.  Returns `None` for names that do not
    /// denote a key (the caller turns that into a per-message error).
    pub fn resolve(name: &str, platform: Platform) -> Option<Key> {
        let lower = name.trim().to_ascii_lowercase();
        let key = match lower.as_str() {
            "cmd" | "command" | "primary" => platform.primary_modifier(),
            "ctrl" | "control" => match platform {
                Platform::MacOs => Key::Meta,
                Platform::Windows | Platform::Linux => Key::Control,
            },
            "shift" => Key::Shift,
            "alt" | "option" | "opt" => Key::Alt,
            "win" | "meta" | "super" => Key::Meta,
            "enter" | "return" => Key::Enter,
            "tab" => Key::Tab,
            "esc" | "escape" => Key::Escape,
            "space" => Key::Space,
            "up" => Key::Up,
            "down" => Key::Down,
            "left" => Key::Left,
            "right" => Key::Right,
            "backspace" => Key::Backspace,
            "delete" | "del" => Key::Delete,
            "insert" | "ins" => Key::Insert,
            "home" => Key::Home,
            "end" => Key::End,
            "pageup" | "pgup" => Key::PageUp,
            "pagedown" | "pgdn" => Key::PageDown,
            _ => return Self::resolve_function_or_char(&lower),
        };
        Some(key)
    }

    fn resolve_function_or_char(lower: &str) -> Option<Key> {
        if let Some(n) = lower.strip_prefix('f').and_then(|d| d.parse::<u8>().ok()) {
            return (1..=12).contains(&n).then_some(Key::F(n));
        }
        let mut chars = lower.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_graphic() => Some(Key::Char(c)),
            (Some(' '), None) => Some(Key::Space),
            _ => None,
        }
    }

    /// Returns `true` for Control, Shift, Alt and Meta.
    pub fn is_modifier(self) -> bool {
        matches!(self, Key::Control | Key::Shift | Key::Alt | Key::Meta)
    }
}

/// Mouse buttons the protocol can name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    /// Parses a wire button name (`left`, `right`, `middle`), case-insensitively.
    pub fn from_name(name: &str) -> Option<MouseButton> {
        match name.trim().to_ascii_lowercase().as_str() {
            "left" => Some(MouseButton::Left),
            "right" => Some(MouseButton::Right),
            "middle" => Some(MouseButton::Middle),
            _ => None,
        }
    }

    /// Wire name of the button.
    pub fn name(self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmd_resolves_to_control_on_windows_and_linux() {
        assert_eq!(Key::resolve("cmd", Platform::Windows), Some(Key::Control));
        assert_eq!(Key::resolve("cmd", Platform::Linux), Some(Key::Control));
    }

    #[test]
    fn test_cmd_resolves_to_meta_on_macos() {
        assert_eq!(Key::resolve("cmd", Platform::MacOs), Some(Key::Meta));
    }

    #[test]
    fn test_ctrl_follows_primary_modifier_on_macos() {
        assert_eq!(Key::resolve("ctrl", Platform::MacOs), Some(Key::Meta));
        assert_eq!(Key::resolve("ctrl", Platform::Linux), Some(Key::Control));
    }

    #[test]
    fn test_win_is_always_meta() {
        for p in [Platform::Windows, Platform::Linux, Platform::MacOs] {
            assert_eq!(Key::resolve("win", p), Some(Key::Meta));
        }
    }

    #[test]
    fn test_resolution_is_case_insensitive() {
        assert_eq!(Key::resolve("Enter", Platform::Linux), Some(Key::Enter));
        assert_eq!(Key::resolve("PAGEDOWN", Platform::Linux), Some(Key::PageDown));
        assert_eq!(Key::resolve("C", Platform::Linux), Some(Key::Char('c')));
    }

    #[test]
    fn test_function_keys_resolve_within_range() {
        assert_eq!(Key::resolve("f1", Platform::Linux), Some(Key::F(1)));
        assert_eq!(Key::resolve("F12", Platform::Linux), Some(Key::F(12)));
        assert_eq!(Key::resolve("f13", Platform::Linux), None);
        assert_eq!(Key::resolve("f0", Platform::Linux), None);
    }

    #[test]
    fn test_single_printable_characters_resolve() {
        assert_eq!(Key::resolve("1", Platform::Windows), Some(Key::Char('1')));
        assert_eq!(Key::resolve("/", Platform::Windows), Some(Key::Char('/')));
        assert_eq!(Key::resolve(" ", Platform::Windows), Some(Key::Space));
    }

    #[test]
    fn test_unknown_names_do_not_resolve() {
        assert_eq!(Key::resolve("hyper", Platform::Linux), None);
        assert_eq!(Key::resolve("", Platform::Linux), None);
        assert_eq!(Key::resolve("é", Platform::Linux), None);
    }

    #[test]
    fn test_is_modifier() {
        assert!(Key::Control.is_modifier());
        assert!(Key::Meta.is_modifier());
        assert!(!Key::Char('c').is_modifier());
        assert!(!Key::Enter.is_modifier());
    }

    #[test]
    fn test_mouse_button_names() {
        assert_eq!(MouseButton::from_name("left"), Some(MouseButton::Left));
        assert_eq!(MouseButton::from_name("Right"), Some(MouseButton::Right));
        assert_eq!(MouseButton::from_name("middle"), Some(MouseButton::Middle));
        assert_eq!(MouseButton::from_name("back"), None);
        for b in [MouseButton::Left, MouseButton::Right, MouseButton::Middle] {
            assert_eq!(MouseButton::from_name(b.name()), Some(b));
        }
    }

    #[test]
    fn test_platform_current_matches_target() {
        let p = Platform::current();
        if cfg!(target_os = "macos") {
            assert_eq!(p, Platform::MacOs);
        } else if cfg!(target_os = "windows") {
            assert_eq!(p, Platform::Windows);
        } else {
            assert_eq!(p, Platform::Linux);
        }
    }
}
