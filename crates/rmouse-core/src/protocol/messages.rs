//! All RemoteMouse control-channel message types.
//!
//! Every message is one JSON object carrying a mandatory `"t"` tag that names
//! the variant, with the variant's fields flattened into the same object:
//!
//! ```json
//! {"t":"hello","pin":"123456"}
//! {"t":"move","dx":10.5,"dy":-5.2}
//! {"t":"click","btn":"left","down":true}
//! {"t":"hotkey","keys":["cmd","c"]}
//! ```
//!
//! Serde's `#[serde(tag = "t")]` attribute produces exactly this layout.
//!
//! Button and key names travel as plain strings.  The protocol only carries
//! *logical* names; resolving them to concrete OS keys happens on the host at
//! the translator boundary (see [`crate::keymap`]).

use serde::{Deserialize, Serialize};

// ── Protocol constants ────────────────────────────────────────────────────────

/// Protocol version advertised in discovery replies.
pub const PROTOCOL_VERSION: &str = "2.0";

/// Default TCP port of the WebSocket control channel.
pub const DEFAULT_CONTROL_PORT: u16 = 8765;

/// Upper bound on a single inbound frame, in bytes (1 MiB).
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Every tag value the codec accepts, in declaration order.
pub const KNOWN_TAGS: &[&str] = &[
    "hello", "ok", "error", "move", "click", "key", "hotkey", "scroll", "ping", "pong",
];

/// Error text sent when the PIN in a `Hello` does not match.
pub const ERR_INVALID_PIN: &str = "invalid pin";

/// Error text sent when the first message of a session is not a `Hello`.
pub const ERR_EXPECTED_HELLO: &str = "expected hello";

/// Error text sent when no `Hello` arrives within the authentication window.
pub const ERR_AUTH_TIMEOUT: &str = "authentication timeout";

/// Error text sent when an authenticated session repeats `Hello`.
pub const ERR_ALREADY_AUTHENTICATED: &str = "already authenticated";

// ── Control messages ──────────────────────────────────────────────────────────

/// One typed unit of the wire protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Client → host.  Must be the first message on every session.
    Hello {
        /// Shared secret configured on the host.
        pin: String,
    },

    /// Host → client.  Authentication succeeded.
    Ok {
        /// Host display name (informational).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        server: Option<String>,
        /// Host capability list (informational).
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        capabilities: Vec<String>,
    },

    /// Host → client.  A message failed; `msg` says why.
    Error {
        #[serde(rename = "msg")]
        message: String,
    },

    /// Relative pointer motion in (sub-)pixels.
    Move { dx: f64, dy: f64 },

    /// Mouse button action.
    ///
    /// `down` absent means a full press-and-release; `true` is press-only and
    /// `false` is release-only, which lets a client build drags out of
    /// separate down/up messages with `Move`s in between.
    Click {
        #[serde(default = "default_button")]
        btn: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        down: Option<bool>,
    },

    /// Literal text to type.
    Key { text: String },

    /// Ordered key combination, e.g. `["cmd", "c"]`.
    Hotkey { keys: Vec<String> },

    /// Wheel ticks; positive `dy` scrolls up.
    Scroll { dx: i32, dy: i32 },

    /// Application-level keepalive request.
    Ping,

    /// Reply to [`ControlMessage::Ping`].
    Pong,
}

fn default_button() -> String {
    "left".to_string()
}

impl ControlMessage {
    /// Builds an `Ok` reply without the informational fields.
    pub fn ok() -> Self {
        ControlMessage::Ok {
            server: None,
            capabilities: Vec::new(),
        }
    }

    /// Builds an `Error` reply.
    pub fn error(message: impl Into<String>) -> Self {
        ControlMessage::Error {
            message: message.into(),
        }
    }

    /// Returns the wire tag of this message.
    ///
    /// Used in log lines instead of `Debug` so a PIN never reaches the log.
    pub fn tag(&self) -> &'static str {
        match self {
            ControlMessage::Hello { .. } => "hello",
            ControlMessage::Ok { .. } => "ok",
            ControlMessage::Error { .. } => "error",
            ControlMessage::Move { .. } => "move",
            ControlMessage::Click { .. } => "click",
            ControlMessage::Key { .. } => "key",
            ControlMessage::Hotkey { .. } => "hotkey",
            ControlMessage::Scroll { .. } => "scroll",
            ControlMessage::Ping => "ping",
            ControlMessage::Pong => "pong",
        }
    }

    /// Returns `true` for the variants that drive the host's input devices.
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            ControlMessage::Move { .. }
                | ControlMessage::Click { .. }
                | ControlMessage::Key { .. }
                | ControlMessage::Hotkey { .. }
                | ControlMessage::Scroll { .. }
        )
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
