//! Textual JSON codec for [`ControlMessage`]s.
//!
//! Wire format: one JSON object per WebSocket text frame.
//!
//! ```text
//! {"t":"<tag>", <fields of that variant>}
//! ```
//!
//! Encoding is deterministic: fields are written in declaration order and
//! optional fields are omitted when absent.  Decoding goes through a
//! [`serde_json::Value`] first so that the four failure classes (bad JSON,
//! missing tag, unknown tag, bad payload for a known tag) produce distinct
//! errors; the caller turns any of them into an `Error` reply.

use serde_json::Value;
use thiserror::Error;

use crate::protocol::messages::{ControlMessage, KNOWN_TAGS, MAX_MESSAGE_SIZE};

/// Errors that can occur during message encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The frame is not valid JSON, or not a JSON object.
    #[error("malformed message: {0}")]
    Malformed(String),

    /// The object has no string `t` field.
    #[error("missing message type")]
    MissingTag,

    /// The `t` field names a message type this protocol does not define.
    #[error("unknown message type: {0}")]
    UnknownTag(String),

    /// The tag is known but the fields do not match its payload.
    #[error("invalid {tag} message: {reason}")]
    InvalidPayload { tag: String, reason: String },

    /// The frame exceeds [`MAX_MESSAGE_SIZE`].
    #[error("message too large: {size} bytes (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    /// Serialization failed (never expected for well-formed values).
    #[error("encode failed: {0}")]
    Encode(String),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a [`ControlMessage`] as a single-line JSON string.
///
/// # Errors
///
/// Returns [`ProtocolError::Encode`] if serialization fails, which only
/// happens for non-finite motion deltas.
///
/// # Examples
///
/// ```rust
/// use rmouse_core::protocol::{decode_message, encode_message, ControlMessage};
///
/// let msg = ControlMessage::Scroll { dx: 0, dy: 1 };
/// let text = encode_message(&msg).unwrap();
/// assert_eq!(text, r#"{"t":"scroll","dx":0,"dy":1}"#);
/// assert_eq!(decode_message(&text).unwrap(), msg);
/// ```
pub fn encode_message(msg: &ControlMessage) -> Result<String, ProtocolError> {
    if let ControlMessage::Move { dx, dy } = msg {
        if !dx.is_finite() || !dy.is_finite() {
            return Err(ProtocolError::Encode("motion deltas must be finite".into()));
        }
    }
    serde_json::to_string(msg).map_err(|e| ProtocolError::Encode(e.to_string()))
}

/// Decodes one [`ControlMessage`] from a text frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] describing why the frame was rejected.
pub fn decode_message(text: &str) -> Result<ControlMessage, ProtocolError> {
    decode_message_bounded(text, MAX_MESSAGE_SIZE)
}

/// Like [`decode_message`] but with an explicit size limit.
///
/// # Errors
///
/// Returns [`ProtocolError::TooLarge`] before parsing when `text` exceeds
/// `limit`, otherwise the same errors as [`decode_message`].
pub fn decode_message_bounded(text: &str, limit: usize) -> Result<ControlMessage, ProtocolError> {
    if text.len() > limit {
        return Err(ProtocolError::TooLarge {
            size: text.len(),
            limit,
        });
    }

    let value: Value =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;

    let tag = match &value {
        Value::Object(map) => match map.get("t") {
            Some(Value::String(tag)) => tag.clone(),
            _ => return Err(ProtocolError::MissingTag),
        },
        _ => return Err(ProtocolError::Malformed("expected a JSON object".into())),
    };

    if !KNOWN_TAGS.contains(&tag.as_str()) {
        tracing::trace!(%tag, "rejecting frame with unknown tag");
        return Err(ProtocolError::UnknownTag(tag));
    }

    serde_json::from_value(value).map_err(|e| ProtocolError::InvalidPayload {
        tag,
        reason: e.to_string(),
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────
